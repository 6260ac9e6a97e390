//! Control loop for the netchar engine.
//!
//! The heavy lifting lives in [`netchar_core`]: deriving per-flow
//! network characteristics from a topology and fairly redistributing
//! segment capacity over the flows crossing it. This crate wraps that
//! engine in a [`NetCharManager`] that recalculates periodically on a
//! background thread, reacts to topology and control events, and hands
//! the resulting updates to an enforcement callback.
//!
//! ```
//! use netchar::NetCharManager;
//! use netchar_core::{HostConfig, InMemoryMetrics, NodeNetChar, StaticTopology};
//! use std::sync::Arc;
//!
//! let mut topo = StaticTopology::new("demo", NodeNetChar::default());
//! topo.add_host(HostConfig::new("server", NodeNetChar::default()));
//! topo.add_host(HostConfig::new("client", NodeNetChar::default()));
//! topo.add_process("server-app", "server", NodeNetChar::default());
//! topo.add_process("client-app", "client", NodeNetChar::default());
//!
//! let manager = NetCharManager::new(Arc::new(topo), InMemoryMetrics::new());
//! manager
//!     .register(
//!         |dst, src, throughput, latency, _jitter, _loss| {
//!             println!("{src} -> {dst}: {throughput} Mbps, {latency} ms");
//!         },
//!         || println!("batch applied"),
//!     )
//!     .unwrap();
//! manager.start().unwrap();
//! manager.shutdown().unwrap();
//! ```

mod bus;
mod manager;

pub use self::{
    bus::{ControlEvent, ControlSender},
    manager::{ApplyCallback, NetCharManager, UpdateCallback},
};

/// The underlying engine, re-exported for embedders.
pub use netchar_core as core;
