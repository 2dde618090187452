//! Runtime counters shared across tasks.
//!
//! Counters feed structured log lines (on reload and at shutdown); logs are
//! the daemon's only reporting channel.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub frames_read: AtomicU64,
    pub allowed: AtomicU64,
    pub denied: AtomicU64,
    pub policy_faults: AtomicU64,
    pub write_errors: AtomicU64,
    pub reloads: AtomicU64,
    pub reload_failures: AtomicU64,
}

impl Stats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self, context: &str) {
        tracing::info!(
            context,
            frames_read = Self::get(&self.frames_read),
            allowed = Self::get(&self.allowed),
            denied = Self::get(&self.denied),
            policy_faults = Self::get(&self.policy_faults),
            write_errors = Self::get(&self.write_errors),
            reloads = Self::get(&self.reloads),
            reload_failures = Self::get(&self.reload_failures),
            "runtime counters"
        );
    }
}
