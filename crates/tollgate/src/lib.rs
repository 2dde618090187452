//! Top-level facade crate for tollgate.
//!
//! Re-exports the core types and the daemon library so users can depend on a
//! single crate.

pub mod core {
    pub use tollgate_core::*;
}

pub mod daemon {
    pub use tollgate_daemon::*;
}
