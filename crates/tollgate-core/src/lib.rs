//! Tollgate core: frame classification, the trust cache, and the policy
//! module contract shared by the daemon and its built-in policies.
//!
//! This crate carries no runtime or I/O dependencies so policy decisions can
//! be unit-tested without a device handle or a tokio runtime.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! A malformed frame must never crash the process; every fallible path
//! surfaces as `TollgateError`/`Result` or fails a single classification.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod allowlist;
pub mod classify;
pub mod error;
pub mod policy;

/// Shared result type.
pub use error::{Result, TollgateError};
