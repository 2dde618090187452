//! Tollgate daemon binary.
//!
//! Startup order: logging, config, interface, policy, dispatch, watcher,
//! signals. Configuration failures abort with a non-zero status; an
//! unrecoverable runtime fault ends in a full process re-exec instead.

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use tollgate_core::error::{Result, TollgateError};

use tollgate_daemon::config::DaemonConfig;
use tollgate_daemon::dispatch::{self, Control, DispatchEngine, EngineExit};
use tollgate_daemon::iface::{self, FrameIo, TunDevice};
use tollgate_daemon::loader::{self, watcher::ManifestWatcher, PolicyLoader, PolicyRegistry};
use tollgate_daemon::stats::Stats;
use tollgate_daemon::supervisor;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    tracing::info!("tollgate starting");

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal error; exiting");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = DaemonConfig::from_env()?;

    let tun = TunDevice::open(&cfg.iface)?;
    iface::configure_link(tun.name())?;
    let io: Arc<dyn FrameIo> = Arc::new(tun);

    let loader = PolicyLoader::initial_load(PolicyRegistry::builtin(), cfg.manifest_path())?;
    let active = loader.active();

    let stats = Arc::new(Stats::default());
    let (engine, channels) = DispatchEngine::new(Arc::clone(&io), active, Arc::clone(&stats));
    dispatch::spawn_reader(
        Arc::clone(&io),
        channels.frame_tx,
        channels.err_tx,
        Arc::clone(&stats),
    )
    .map_err(|e| TollgateError::Config(format!("reader thread spawn failed: {e}")))?;

    let (reload_tx, reload_rx) = tokio::sync::mpsc::channel(8);
    let watcher = ManifestWatcher::start(&cfg.policy_dir, reload_tx)?;
    tokio::spawn(watcher.run());
    tokio::spawn(loader::run_reload_coordinator(
        loader,
        reload_rx,
        channels.ctrl_tx.clone(),
        Arc::clone(&stats),
    ));

    let mut engine_task = tokio::spawn(engine.run());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| TollgateError::Config(format!("signal handler failed: {e}")))?;

    tokio::select! {
        exit = &mut engine_task => {
            // The engine only returns on its own for a fault; graceful
            // shutdown always goes through the signal arms below.
            let fault = match exit {
                Ok(EngineExit::Fatal(e)) => e,
                Ok(EngineExit::Shutdown) => {
                    TollgateError::Fatal("dispatch stopped unexpectedly".into())
                }
                Err(e) => TollgateError::Fatal(format!("dispatch task failed: {e}")),
            };
            return Err(supervisor::recover(io.as_ref(), &fault).await);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; shutting down");
            let _ = channels.ctrl_tx.send(Control::Shutdown).await;
            let _ = engine_task.await;
        }
        _ = sigterm.recv() => {
            tracing::info!("termination signal received; shutting down");
            let _ = channels.ctrl_tx.send(Control::Shutdown).await;
            let _ = engine_task.await;
        }
    }

    io.close();
    stats.log_summary("shutdown");
    tracing::info!("tollgate stopped");
    Ok(())
}
