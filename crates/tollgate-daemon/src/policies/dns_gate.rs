//! The `dns-gate` sample policy.
//!
//! Admission rules, evaluated in this order:
//! - frames that fail classification are denied;
//! - ICMP is always denied;
//! - TCP to the SSH port and UDP to the WireGuard port are always allowed;
//! - a DNS query whose first question equals the configured secret grants
//!   the querying source address into the allow-list — and the query frame
//!   itself is denied;
//! - everything else is allowed iff the source address holds an unexpired
//!   grant.
//!
//! The allow-list is this instance's private state: a hot-reload builds a
//! fresh instance and trust starts over.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tollgate_core::allowlist::AllowList;
use tollgate_core::classify::{classify, Transport};
use tollgate_core::error::{Result, TollgateError};
use tollgate_core::policy::{PolicyModule, Verdict};

use crate::config::PolicyParams;

#[derive(Debug)]
pub struct DnsGate {
    secret_query: String,
    allowlist: AllowList,
    ssh_port: u16,
    wireguard_port: u16,
}

impl DnsGate {
    /// Decision with an injected clock; `decide` feeds it wall time.
    fn decide_at(&self, frame: &[u8], now: u64) -> Verdict {
        let fp = match classify(frame) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::debug!(error = %e, "frame denied: classification failed");
                return Verdict::Deny;
            }
        };

        match fp.transport {
            Transport::Icmp => {
                tracing::debug!(src = %fp.src, "icmp denied");
                return Verdict::Deny;
            }
            Transport::Tcp if fp.dst_port == Some(self.ssh_port) => {
                tracing::debug!(src = %fp.src, "ssh allowed");
                return Verdict::Allow;
            }
            Transport::Udp if fp.dst_port == Some(self.wireguard_port) => {
                tracing::debug!(src = %fp.src, "wireguard allowed");
                return Verdict::Allow;
            }
            _ => {}
        }

        if let Some(name) = &fp.dns_query {
            if *name == self.secret_query {
                // Grant first, then deny the trigger frame itself: the
                // query never reaches the far side.
                self.allowlist.grant(fp.src, now);
                tracing::info!(src = %fp.src, window = ?self.allowlist.window(), "secret query observed; source granted");
                return Verdict::Deny;
            }
        }

        if self.allowlist.is_trusted(fp.src, now) {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

impl PolicyModule for DnsGate {
    fn decide(&self, frame: &[u8]) -> Verdict {
        self.decide_at(frame, unix_now())
    }

    fn on_load(&self) -> Result<()> {
        tracing::info!(
            ssh_port = self.ssh_port,
            wireguard_port = self.wireguard_port,
            window = ?self.allowlist.window(),
            "dns-gate policy loaded"
        );
        Ok(())
    }
}

pub fn build(params: &PolicyParams) -> Result<Arc<dyn PolicyModule>> {
    let secret = params
        .secret_query
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            TollgateError::PolicyLoad("dns-gate requires params.secret_query".into())
        })?;

    Ok(Arc::new(DnsGate {
        secret_query: secret.to_ascii_lowercase(),
        allowlist: AllowList::with_window(Duration::from_secs(params.trust_window_secs)),
        ssh_port: params.ssh_port,
        wireguard_port: params.wireguard_port,
    }))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
