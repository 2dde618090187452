//! Tollgate daemon library entry.
//!
//! Wires the virtual interface, dispatch engine, policy loader, and process
//! supervisor into a cohesive firewall daemon. It is intended to be consumed
//! by the binary (`main.rs`) and by integration tests.

pub mod config;
pub mod dispatch;
pub mod iface;
pub mod loader;
pub mod policies;
pub mod stats;
pub mod supervisor;
