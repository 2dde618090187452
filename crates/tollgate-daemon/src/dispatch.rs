//! The dispatch engine: one ingress reader, a fan-out worker per frame, and
//! a control channel that pauses dispatch for a policy reload.
//!
//! Each frame is evaluated in its own ephemeral worker task so a fault or a
//! slow decision cannot block or corrupt any other frame. Workers carry no
//! return value; their only observable effect is the interface write.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};

use tollgate_core::error::TollgateError;
use tollgate_core::policy::{PolicyGeneration, Verdict};

use crate::iface::{FrameIo, MAX_FRAME};
use crate::stats::Stats;

const FRAME_CHANNEL_DEPTH: usize = 256;
const ERR_CHANNEL_DEPTH: usize = 16;
const CTRL_CHANNEL_DEPTH: usize = 8;

/// Control signals accepted by the dispatch loop.
pub enum Control {
    /// Stop delivering frames to workers; ack after in-flight decisions
    /// drain. Frames keep queuing on the dispatch channel meanwhile.
    Pause(oneshot::Sender<()>),
    /// Leave the paused state and deliver again.
    Resume,
    /// Graceful stop: drain in-flight decisions and exit the loop.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    Draining,
    Stopped,
}

/// Why the dispatch loop returned.
#[derive(Debug)]
pub enum EngineExit {
    /// Graceful stop (shutdown control or all inputs closed).
    Shutdown,
    /// A fault escaped per-frame isolation; the supervisor takes over.
    Fatal(TollgateError),
}

/// Sender halves handed to the reader thread and the control plane.
pub struct EngineChannels {
    pub frame_tx: mpsc::Sender<Bytes>,
    pub err_tx: mpsc::Sender<io::Error>,
    pub ctrl_tx: mpsc::Sender<Control>,
}

pub struct DispatchEngine {
    io: Arc<dyn FrameIo>,
    active: Arc<ArcSwap<PolicyGeneration>>,
    stats: Arc<Stats>,
    frame_rx: mpsc::Receiver<Bytes>,
    err_rx: mpsc::Receiver<io::Error>,
    ctrl_rx: mpsc::Receiver<Control>,
    state: DispatchState,
}

impl DispatchEngine {
    pub fn new(
        io: Arc<dyn FrameIo>,
        active: Arc<ArcSwap<PolicyGeneration>>,
        stats: Arc<Stats>,
    ) -> (Self, EngineChannels) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let (err_tx, err_rx) = mpsc::channel(ERR_CHANNEL_DEPTH);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(CTRL_CHANNEL_DEPTH);
        (
            Self {
                io,
                active,
                stats,
                frame_rx,
                err_rx,
                ctrl_rx,
                state: DispatchState::Running,
            },
            EngineChannels {
                frame_tx,
                err_tx,
                ctrl_tx,
            },
        )
    }

    /// Run until shutdown or a fatal fault. Consumes the engine; a resumed
    /// instance after reload is the same loop leaving its paused state.
    pub async fn run(mut self) -> EngineExit {
        let mut workers = JoinSet::new();
        tracing::info!("dispatch running");

        loop {
            tokio::select! {
                maybe_ctrl = self.ctrl_rx.recv() => {
                    match maybe_ctrl {
                        Some(Control::Pause(ack)) => {
                            if let Some(exit) = self.pause(&mut workers, ack).await {
                                return exit;
                            }
                        }
                        Some(Control::Resume) => {} // already running
                        Some(Control::Shutdown) | None => {
                            drain_workers(&mut workers).await;
                            self.state = DispatchState::Stopped;
                            tracing::info!(state = ?self.state, "dispatch stopped");
                            return EngineExit::Shutdown;
                        }
                    }
                }

                maybe_frame = self.frame_rx.recv() => {
                    let Some(frame) = maybe_frame else {
                        // Reader gone without reporting a fatal error.
                        drain_workers(&mut workers).await;
                        return EngineExit::Shutdown;
                    };
                    self.spawn_worker(&mut workers, frame);
                    while let Some(res) = workers.try_join_next() {
                        log_worker_result(res);
                    }
                }

                maybe_err = self.err_rx.recv() => {
                    if let Some(err) = maybe_err {
                        tracing::error!(error = %err, "unrecoverable interface read error");
                        drain_workers(&mut workers).await;
                        return EngineExit::Fatal(TollgateError::Io(err));
                    }
                }
            }
        }
    }

    /// Drain in-flight decisions, ack the pause, then park until resumed.
    /// Returns an exit if shutdown arrives while paused.
    async fn pause(
        &mut self,
        workers: &mut JoinSet<()>,
        ack: oneshot::Sender<()>,
    ) -> Option<EngineExit> {
        self.state = DispatchState::Draining;
        tracing::info!(state = ?self.state, in_flight = workers.len(), "dispatch pausing");
        drain_workers(workers).await;
        self.state = DispatchState::Stopped;
        tracing::info!(state = ?self.state, "in-flight decisions drained");
        let _ = ack.send(());

        loop {
            match self.ctrl_rx.recv().await {
                Some(Control::Resume) => {
                    self.state = DispatchState::Running;
                    tracing::info!("dispatch resumed");
                    return None;
                }
                Some(Control::Pause(ack)) => {
                    // Already stopped; ack immediately.
                    let _ = ack.send(());
                }
                Some(Control::Shutdown) | None => {
                    tracing::info!("dispatch stopped while paused");
                    return Some(EngineExit::Shutdown);
                }
            }
        }
    }

    fn spawn_worker(&self, workers: &mut JoinSet<()>, frame: Bytes) {
        let generation = self.active.load_full();
        let io = Arc::clone(&self.io);
        let stats = Arc::clone(&self.stats);
        workers.spawn(async move {
            evaluate(generation.as_ref(), io.as_ref(), stats.as_ref(), &frame);
        });
    }
}

/// Decide one frame under a local recovery boundary and write it back iff
/// allowed. A policy fault is logged and becomes `Deny` for this frame only.
fn evaluate(generation: &PolicyGeneration, io: &dyn FrameIo, stats: &Stats, frame: &Bytes) {
    let verdict = match catch_unwind(AssertUnwindSafe(|| generation.module.decide(frame))) {
        Ok(v) => v,
        Err(_) => {
            Stats::bump(&stats.policy_faults);
            tracing::error!(
                generation = generation.seq,
                policy = %generation.name,
                "policy fault isolated; frame denied"
            );
            Verdict::Deny
        }
    };

    match verdict {
        Verdict::Allow => {
            Stats::bump(&stats.allowed);
            if let Err(e) = io.write(frame) {
                Stats::bump(&stats.write_errors);
                tracing::warn!(error = %e, "interface write failed");
            }
        }
        Verdict::Deny => Stats::bump(&stats.denied),
    }
}

async fn drain_workers(workers: &mut JoinSet<()>) {
    while let Some(res) = workers.join_next().await {
        log_worker_result(res);
    }
}

fn log_worker_result(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            // Backstop: decide panics are caught in evaluate; anything
            // reaching here came from the worker plumbing itself.
            tracing::error!("worker task panicked outside the decide boundary");
        }
    }
}

/// Spawn the dedicated ingress reader thread. Reading is the only blocking
/// boundary: every successful read publishes one owned frame copy, transient
/// errors are logged past, and the first unrecoverable error is published to
/// the error channel before the thread exits.
pub fn spawn_reader(
    io: Arc<dyn FrameIo>,
    frame_tx: mpsc::Sender<Bytes>,
    err_tx: mpsc::Sender<io::Error>,
    stats: Arc<Stats>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tollgate-reader".into())
        .spawn(move || {
            let mut buf = [0u8; MAX_FRAME];
            loop {
                match io.read(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => {
                        Stats::bump(&stats.frames_read);
                        let frame = Bytes::copy_from_slice(&buf[..n]);
                        if frame_tx.blocking_send(frame).is_err() {
                            break; // dispatch side is gone
                        }
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::warn!(error = %e, "transient interface read error");
                    }
                    Err(e) => {
                        let _ = err_tx.blocking_send(e);
                        break;
                    }
                }
            }
            tracing::debug!("reader thread exiting");
        })
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
