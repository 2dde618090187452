//! Dispatch engine behavior against a scripted interface: decision flow,
//! per-frame fault isolation, drain-on-pause, and fatal escalation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::io;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::oneshot;

use tollgate_core::policy::{PolicyGeneration, PolicyModule, Verdict};
use tollgate_daemon::dispatch::{self, Control, DispatchEngine, EngineExit};
use tollgate_daemon::iface::FrameIo;
use tollgate_daemon::stats::Stats;

/// Marker byte that makes [`FaultyAllow`] panic.
const POISON: u8 = 0xEE;

/// Allows everything, but panics on poison-marked frames.
#[derive(Debug)]
struct FaultyAllow;

impl PolicyModule for FaultyAllow {
    fn decide(&self, frame: &[u8]) -> Verdict {
        if frame.first() == Some(&POISON) {
            panic!("injected policy fault");
        }
        Verdict::Allow
    }
}

/// Signals when a decision starts, then holds it open for a while.
#[derive(Debug)]
struct SlowAllow {
    started: Sender<()>,
}

impl PolicyModule for SlowAllow {
    fn decide(&self, _frame: &[u8]) -> Verdict {
        let _ = self.started.send(());
        std::thread::sleep(Duration::from_millis(200));
        Verdict::Allow
    }
}

fn generation(module: Arc<dyn PolicyModule>) -> Arc<ArcSwap<PolicyGeneration>> {
    Arc::new(ArcSwap::from_pointee(PolicyGeneration {
        seq: 1,
        name: "test".into(),
        module,
    }))
}

struct Rig {
    io: Arc<common::MockIo>,
    handles: common::MockHandles,
    stats: Arc<Stats>,
    ctrl_tx: tokio::sync::mpsc::Sender<Control>,
    engine_task: tokio::task::JoinHandle<EngineExit>,
}

fn start_engine(module: Arc<dyn PolicyModule>) -> Rig {
    let (io, handles) = common::mock_io();
    let stats = Arc::new(Stats::default());
    let active = generation(module);

    let io_dyn: Arc<dyn FrameIo> = io.clone();
    let (engine, channels) =
        DispatchEngine::new(Arc::clone(&io_dyn), active, Arc::clone(&stats));
    dispatch::spawn_reader(io_dyn, channels.frame_tx, channels.err_tx, Arc::clone(&stats))
        .unwrap();
    let engine_task = tokio::spawn(engine.run());

    Rig {
        io,
        handles,
        stats,
        ctrl_tx: channels.ctrl_tx,
        engine_task,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn allowed_frames_are_written_back() {
    let rig = start_engine(Arc::new(FaultyAllow));

    rig.handles.inject.send(Ok(vec![0x45, 1, 2, 3])).unwrap();
    let written = rig
        .handles
        .written
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(written, vec![0x45, 1, 2, 3]);

    let _ = rig.ctrl_tx.send(Control::Shutdown).await;
    assert!(matches!(rig.engine_task.await.unwrap(), EngineExit::Shutdown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn policy_fault_is_isolated_to_its_frame() {
    let rig = start_engine(Arc::new(FaultyAllow));

    // A faulting frame and a healthy frame, back to back.
    rig.handles.inject.send(Ok(vec![POISON, 0xFF])).unwrap();
    rig.handles.inject.send(Ok(vec![0x45, 9])).unwrap();

    // Only the healthy frame comes out.
    let written = rig
        .handles
        .written
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(written, vec![0x45, 9]);
    assert!(rig
        .handles
        .written
        .recv_timeout(Duration::from_millis(200))
        .is_err());

    // The loop survived the fault: further traffic still flows.
    rig.handles.inject.send(Ok(vec![0x45, 10])).unwrap();
    let written = rig
        .handles
        .written
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(written, vec![0x45, 10]);
    assert_eq!(Stats::get(&rig.stats.policy_faults), 1);

    let _ = rig.ctrl_tx.send(Control::Shutdown).await;
    assert!(matches!(rig.engine_task.await.unwrap(), EngineExit::Shutdown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_read_errors_are_looped_past() {
    let rig = start_engine(Arc::new(FaultyAllow));

    rig.handles
        .inject
        .send(Err(io::Error::new(io::ErrorKind::Interrupted, "eintr")))
        .unwrap();
    rig.handles.inject.send(Ok(vec![0x45, 7])).unwrap();

    let written = rig
        .handles
        .written
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(written, vec![0x45, 7]);

    let _ = rig.ctrl_tx.send(Control::Shutdown).await;
    assert!(matches!(rig.engine_task.await.unwrap(), EngineExit::Shutdown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrecoverable_read_error_escalates() {
    let rig = start_engine(Arc::new(FaultyAllow));

    rig.handles
        .inject
        .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone")))
        .unwrap();

    assert!(matches!(rig.engine_task.await.unwrap(), EngineExit::Fatal(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_acks_only_after_in_flight_decisions_drain() {
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let rig = start_engine(Arc::new(SlowAllow {
        started: started_tx,
    }));

    rig.handles.inject.send(Ok(vec![0x45, 1])).unwrap();
    // The decision is provably in flight once the policy says so.
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (ack_tx, ack_rx) = oneshot::channel();
    rig.ctrl_tx.send(Control::Pause(ack_tx)).await.unwrap();
    ack_rx.await.unwrap();

    // The ack means the in-flight decision completed — its write must have
    // happened already, not been cancelled, not been re-run.
    let written = rig.handles.written.try_recv().unwrap();
    assert_eq!(written, vec![0x45, 1]);
    assert!(rig.handles.written.try_recv().is_err());

    // Frames read while paused stay queued until resume.
    rig.handles.inject.send(Ok(vec![0x45, 2])).unwrap();
    assert!(rig
        .handles
        .written
        .recv_timeout(Duration::from_millis(300))
        .is_err());

    rig.ctrl_tx.send(Control::Resume).await.unwrap();
    let written = rig
        .handles
        .written
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(written, vec![0x45, 2]);

    let _ = rig.ctrl_tx.send(Control::Shutdown).await;
    assert!(matches!(rig.engine_task.await.unwrap(), EngineExit::Shutdown));
    drop(rig.io);
}
