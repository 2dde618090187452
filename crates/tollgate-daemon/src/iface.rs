//! Virtual interface I/O.
//!
//! The dispatch engine only ever sees the [`FrameIo`] trait; the Linux TUN
//! backend and the test doubles both implement it. Reads block, so the
//! reader runs on its own OS thread.

use std::io;
use std::os::fd::RawFd;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use tollgate_core::error::{Result, TollgateError};

use crate::config::{IFACE_ADDR_V4, IFACE_ADDR_V6};

/// Maximum transmission size of one frame.
pub const MAX_FRAME: usize = 1500;

/// Blocking read/write access to the virtual interface.
pub trait FrameIo: Send + Sync {
    /// Read one frame into `buf`, blocking until traffic arrives.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one frame back onto the interface.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Release the interface handle. Subsequent reads fail, which unblocks
    /// the reader thread.
    fn close(&self);
}

/// A Linux TUN device (`IFF_TUN | IFF_NO_PI`): frames are raw IP packets
/// with no link-layer header.
pub struct TunDevice {
    name: String,
    fd: RawFd,
    closed: AtomicBool,
}

impl TunDevice {
    pub fn open(name: &str) -> Result<Self> {
        let fd = unsafe { libc::open(c"/dev/net/tun".as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(TollgateError::Config(format!(
                "open /dev/net/tun failed: {}",
                io::Error::last_os_error()
            )));
        }

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        unsafe {
            ifr.ifr_ifru.ifru_flags = (libc::IFF_TUN | libc::IFF_NO_PI) as libc::c_short;
        }

        let rc = unsafe { libc::ioctl(fd, libc::TUNSETIFF, &mut ifr) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(TollgateError::Config(format!(
                "TUNSETIFF {name} failed: {err}"
            )));
        }

        tracing::info!(iface = %name, "tun device created");
        Ok(Self {
            name: name.to_string(),
            fd,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FrameIo for TunDevice {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            unsafe { libc::close(self.fd) };
            tracing::info!(iface = %self.name, "tun device closed");
        }
    }
}

impl Drop for TunDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// One-shot interface bring-up: fixed local address plan, link up, and the
/// reverse-path filter disabled so return traffic is not dropped.
///
/// Address assignment tolerates failure (the address may survive a fast
/// restart); link state and the sysctl do not.
pub fn configure_link(name: &str) -> Result<()> {
    for addr in [IFACE_ADDR_V4, IFACE_ADDR_V6] {
        if let Err(e) = run_ip(&["addr", "add", addr, "dev", name]) {
            tracing::warn!(%addr, error = %e, "address assignment failed");
        }
    }
    run_ip(&["link", "set", name, "up"])?;
    disable_rp_filter(name)
}

fn run_ip(args: &[&str]) -> Result<()> {
    let status = Command::new("ip").args(args).status().map_err(|e| {
        TollgateError::Config(format!("ip {} failed to spawn: {e}", args.join(" ")))
    })?;
    if !status.success() {
        return Err(TollgateError::Config(format!(
            "ip {} exited with {status}",
            args.join(" ")
        )));
    }
    Ok(())
}

fn disable_rp_filter(name: &str) -> Result<()> {
    let path = format!("/proc/sys/net/ipv4/conf/{name}/rp_filter");
    std::fs::write(&path, "0")
        .map_err(|e| TollgateError::Config(format!("write {path} failed: {e}")))
}
