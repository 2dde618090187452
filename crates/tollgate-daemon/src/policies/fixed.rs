//! Fixed-verdict policies: `allow-all` and `deny-all`.
//!
//! Operational escape hatches — swap one in via the manifest to open or
//! close the gate without touching the interface.

use std::sync::Arc;

use tollgate_core::error::Result;
use tollgate_core::policy::{PolicyModule, Verdict};

use crate::config::PolicyParams;

#[derive(Debug)]
pub struct FixedVerdict {
    verdict: Verdict,
}

impl PolicyModule for FixedVerdict {
    fn decide(&self, _frame: &[u8]) -> Verdict {
        self.verdict
    }

    fn on_load(&self) -> Result<()> {
        tracing::info!(verdict = ?self.verdict, "fixed-verdict policy loaded");
        Ok(())
    }
}

pub fn build_allow_all(_params: &PolicyParams) -> Result<Arc<dyn PolicyModule>> {
    Ok(Arc::new(FixedVerdict {
        verdict: Verdict::Allow,
    }))
}

pub fn build_deny_all(_params: &PolicyParams) -> Result<Arc<dyn PolicyModule>> {
    Ok(Arc::new(FixedVerdict {
        verdict: Verdict::Deny,
    }))
}
