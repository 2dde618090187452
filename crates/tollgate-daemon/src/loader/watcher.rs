//! Filesystem watch on the policy manifest.
//!
//! Watches the manifest's directory (not the file itself, so replace-by-
//! rename is seen) and forwards one reload request per event whose basename
//! matches the manifest verbatim.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use tollgate_core::error::{Result, TollgateError};

use crate::config::MANIFEST_BASENAME;

const RAW_EVENT_DEPTH: usize = 100;

/// Whether a filesystem event targets the manifest basename.
pub fn is_manifest_event(event: &Event, manifest_name: &OsStr) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(manifest_name))
}

pub struct ManifestWatcher {
    // Held for its side effect; dropping it stops event delivery.
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    reload_tx: mpsc::Sender<()>,
}

impl ManifestWatcher {
    /// Install the watch. Failing to install is a configuration error and
    /// aborts startup.
    pub fn start(dir: &Path, reload_tx: mpsc::Sender<()>) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>(RAW_EVENT_DEPTH);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| TollgateError::Config(format!("watcher init failed: {e}")))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                TollgateError::Config(format!("watch {} failed: {e}", dir.display()))
            })?;
        tracing::info!(dir = %dir.display(), manifest = MANIFEST_BASENAME, "watching policy manifest");

        Ok(Self {
            _watcher: watcher,
            raw_rx,
            reload_tx,
        })
    }

    /// Forward matching events until either side closes.
    pub async fn run(mut self) {
        let manifest_name: OsString = MANIFEST_BASENAME.into();
        while let Some(res) = self.raw_rx.recv().await {
            match res {
                Ok(event) if is_manifest_event(&event, &manifest_name) => {
                    tracing::info!("policy manifest change detected");
                    if self.reload_tx.send(()).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "manifest watcher error"),
            }
        }
        tracing::debug!("manifest watcher exiting");
    }
}
