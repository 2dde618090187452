//! The policy module contract: the seam between the dispatch engine and the
//! replaceable admission logic.

use std::sync::Arc;

use crate::error::Result;

/// Admission decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allow(self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// A replaceable admission policy.
///
/// Implementations may mutate only their own private state (such as an
/// [`crate::allowlist::AllowList`]); that state lives and dies with one load
/// generation and is not carried across hot-reloads.
pub trait PolicyModule: Send + Sync + std::fmt::Debug {
    /// Decide one raw frame. Invoked once per arriving frame on an
    /// arbitrary worker; must not block indefinitely. A panic here is
    /// caught at the worker boundary and turned into `Deny` for this frame
    /// only.
    fn decide(&self, frame: &[u8]) -> Verdict;

    /// One-time initializer, run synchronously after a successful load and
    /// before any `decide` call reaches this instance.
    fn on_load(&self) -> Result<()> {
        Ok(())
    }
}

/// One loaded policy instance, identified by its load order.
///
/// At most one generation is active at a time; the loader swaps the active
/// pointer atomically, so workers either see the whole old generation or the
/// whole new one.
pub struct PolicyGeneration {
    /// Monotonic load counter, starting at 1 for the initial load.
    pub seq: u64,
    /// Registry name the generation was built from.
    pub name: String,
    pub module: Arc<dyn PolicyModule>,
}
