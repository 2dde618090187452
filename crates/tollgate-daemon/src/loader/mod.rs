//! Policy module loading and the hot-reload protocol.
//!
//! "Loading a module" means strict-parsing the manifest, looking the policy
//! up in the registry, constructing a fresh instance (a new generation with
//! fresh private state), and running its one-time initializer. The reload
//! coordinator serializes swaps: pause dispatch, build, swap, resume; a
//! failed build leaves the previous generation active.

pub mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};

use tollgate_core::error::{Result, TollgateError};
use tollgate_core::policy::{PolicyGeneration, PolicyModule};

use crate::config::{self, PolicyManifest, PolicyParams};
use crate::dispatch::Control;
use crate::policies;
use crate::stats::Stats;

/// Builds one policy instance from manifest parameters.
pub type PolicyFactory = fn(&PolicyParams) -> Result<Arc<dyn PolicyModule>>;

/// Name → factory table the manifest's `policy` field resolves against.
pub struct PolicyRegistry {
    factories: HashMap<&'static str, PolicyFactory>,
}

impl PolicyRegistry {
    /// Registry preloaded with the built-in policies.
    pub fn builtin() -> Self {
        let mut reg = Self {
            factories: HashMap::new(),
        };
        reg.register(policies::DNS_GATE, policies::dns_gate::build);
        reg.register(policies::ALLOW_ALL, policies::fixed::build_allow_all);
        reg.register(policies::DENY_ALL, policies::fixed::build_deny_all);
        reg
    }

    pub fn register(&mut self, name: &'static str, factory: PolicyFactory) {
        self.factories.insert(name, factory);
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn build(&self, manifest: &PolicyManifest) -> Result<Arc<dyn PolicyModule>> {
        let factory = self
            .factories
            .get(manifest.policy.as_str())
            .ok_or_else(|| {
                TollgateError::PolicyLoad(format!("unknown policy: {}", manifest.policy))
            })?;
        factory(&manifest.params)
    }
}

pub struct PolicyLoader {
    registry: PolicyRegistry,
    manifest_path: PathBuf,
    active: Arc<ArcSwap<PolicyGeneration>>,
    generation: u64,
}

impl PolicyLoader {
    /// Initial load. Any failure here — missing manifest, unknown policy,
    /// invalid parameters, `on_load` error — is a configuration error and
    /// aborts startup.
    pub fn initial_load(registry: PolicyRegistry, manifest_path: PathBuf) -> Result<Self> {
        let manifest = config::load_manifest_from_file(&manifest_path)?;
        let module = registry.build(&manifest)?;
        module.on_load()?;
        tracing::info!(policy = %manifest.policy, generation = 1u64, "policy loaded");

        let active = Arc::new(ArcSwap::from_pointee(PolicyGeneration {
            seq: 1,
            name: manifest.policy,
            module,
        }));
        Ok(Self {
            registry,
            manifest_path,
            active,
            generation: 1,
        })
    }

    /// Shared active-generation pointer, handed to the dispatch engine.
    pub fn active(&self) -> Arc<ArcSwap<PolicyGeneration>> {
        Arc::clone(&self.active)
    }

    /// Build the next generation and swap it in atomically. On failure the
    /// previous generation stays active and keeps deciding; the generation
    /// counter only advances on success.
    pub fn reload(&mut self) -> Result<u64> {
        let manifest = config::load_manifest_from_file(&self.manifest_path)?;
        let module = self.registry.build(&manifest)?;
        module.on_load()?;

        self.generation += 1;
        self.active.store(Arc::new(PolicyGeneration {
            seq: self.generation,
            name: manifest.policy.clone(),
            module,
        }));
        tracing::info!(policy = %manifest.policy, generation = self.generation, "policy reloaded");
        Ok(self.generation)
    }
}

/// Serialize reload requests from the watcher: at most one reload in
/// flight, and rapid duplicate filesystem events coalesce instead of each
/// triggering its own swap.
pub async fn run_reload_coordinator(
    mut loader: PolicyLoader,
    mut reload_rx: mpsc::Receiver<()>,
    ctrl_tx: mpsc::Sender<Control>,
    stats: Arc<Stats>,
) {
    while reload_rx.recv().await.is_some() {
        coalesce(&mut reload_rx);

        let (ack_tx, ack_rx) = oneshot::channel();
        if ctrl_tx.send(Control::Pause(ack_tx)).await.is_err() {
            return; // engine gone
        }
        if ack_rx.await.is_err() {
            return;
        }

        match loader.reload() {
            Ok(_) => {
                Stats::bump(&stats.reloads);
                stats.log_summary("reload");
            }
            Err(e) => {
                Stats::bump(&stats.reload_failures);
                tracing::error!(error = %e, "reload failed; previous generation stays active");
            }
        }

        if ctrl_tx.send(Control::Resume).await.is_err() {
            return;
        }
        // Events that fired during the swap stay queued: a manifest write we
        // raced with gets its own (serialized) reload on the next pass.
    }
}

fn coalesce(rx: &mut mpsc::Receiver<()>) {
    while rx.try_recv().is_ok() {}
}
