//! Shared test scaffolding: a scripted interface double and frame helpers.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use tollgate_daemon::iface::FrameIo;

/// Interface double: inbound frames (and read errors) are scripted through
/// `inject`; everything the engine writes back lands on `written`.
pub struct MockIo {
    inbound: Mutex<Receiver<io::Result<Vec<u8>>>>,
    written: Sender<Vec<u8>>,
    closed: AtomicBool,
}

pub struct MockHandles {
    pub inject: Sender<io::Result<Vec<u8>>>,
    pub written: Receiver<Vec<u8>>,
}

pub fn mock_io() -> (Arc<MockIo>, MockHandles) {
    let (inject_tx, inject_rx) = channel();
    let (written_tx, written_rx) = channel();
    (
        Arc::new(MockIo {
            inbound: Mutex::new(inject_rx),
            written: written_tx,
            closed: AtomicBool::new(false),
        }),
        MockHandles {
            inject: inject_tx,
            written: written_rx,
        },
    )
}

impl FrameIo for MockIo {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let rx = self.inbound.lock().unwrap();
        match rx.recv() {
            Ok(Ok(frame)) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock feed closed")),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.written.send(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MockIo {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
