//! Shared error type across tollgate crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, TollgateError>;

/// Unified error type used by core and daemon.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Startup configuration problem (missing interface, bad manifest,
    /// invalid environment). Fatal: the process does not proceed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A frame failed classification. Local to one frame; callers treat the
    /// frame as denied.
    #[error("frame decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// A policy module could not be built or initialized. Fatal at startup,
    /// non-fatal during a reload (the previous generation stays active).
    #[error("policy load failed: {0}")]
    PolicyLoad(String),
    /// Interface or filesystem I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything that escaped the per-frame isolation boundaries. Escalates
    /// to a full process restart.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Why one frame failed classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    /// Leading nibble is neither 4 (IPv4) nor 6 (IPv6).
    #[error("unsupported ip version nibble: {0}")]
    UnsupportedVersion(u8),
    #[error("malformed packet: {0}")]
    Malformed(String),
}
