//! Time-windowed allow-list cache.
//!
//! Maps a source address to its last grant timestamp. An address is trusted
//! while `now - grant < window`; entries are never deleted, they just go
//! stale and get superseded by later grants. Staleness is computed lazily at
//! query time, so there is no sweeper task.
//!
//! The cache is private to one policy generation and shared across that
//! generation's concurrently running workers; `DashMap` gives per-key
//! exclusion, so a `grant` is visible to any later `is_trusted` for the same
//! address.

use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;

/// Reference trust window: 100 seconds after the last grant.
pub const DEFAULT_TRUST_WINDOW: Duration = Duration::from_secs(100);

#[derive(Debug)]
pub struct AllowList {
    entries: DashMap<IpAddr, u64>,
    window_secs: u64,
}

impl AllowList {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_TRUST_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window_secs: window.as_secs(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Record a grant for `addr` at unix time `now`, overwriting any prior
    /// timestamp (last grant wins, no history).
    pub fn grant(&self, addr: IpAddr, now: u64) {
        self.entries.insert(addr, now);
        tracing::debug!(%addr, now, window_secs = self.window_secs, "trust granted");
    }

    /// Whether `addr` holds an unexpired grant at unix time `now`.
    ///
    /// Strict window: an address granted at `t` is no longer trusted at
    /// exactly `t + window`. Unknown addresses are never trusted.
    pub fn is_trusted(&self, addr: IpAddr, now: u64) -> bool {
        match self.entries.get(&addr) {
            Some(granted) => now.saturating_sub(*granted) < self.window_secs,
            None => false,
        }
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new()
    }
}
