#![warn(missing_docs)]

//! Compute runtime executing SIMT kernels on the host CPU.
//!
//! Kernels are dispatched over a grid of cubes, each cube being a block of units that can
//! synchronize through [`CubeScope::sync_cube`](scope::CubeScope::sync_cube). The client talks to
//! a server running on its own thread, so launches are asynchronous until the host synchronizes
//! through [events](event::Event) or [`sync`](client::ComputeClient::sync).

#[macro_use]
extern crate derive_new;

/// Memory access analysis.
pub mod analysis;
/// Typed host and device buffers.
pub mod buffer;
/// Compute channel module.
pub mod channel;
/// Compute client module.
pub mod client;
/// CPU compute server.
pub mod compute;
/// Runtime configuration.
pub mod config;
/// Timing events.
pub mod event;
/// Kernel definitions.
pub mod kernel;
/// Server side logging.
pub mod logging;
/// Runtime entry points.
pub mod runtime;
/// Per-cube execution scope handed to kernel bodies.
pub mod scope;
/// Compute server module.
pub mod server;
/// Device memory storage.
pub mod storage;

mod feature_set;

pub use feature_set::*;

/// Re-exported for blocking on the futures returned by the client.
pub use futures_lite::future;

/// Commonly used types for writing and launching kernels.
pub mod prelude {
    pub use crate::analysis::AccessStats;
    pub use crate::buffer::{DeviceBuffer, HostBuffer};
    pub use crate::client::ComputeClient;
    pub use crate::kernel::{CubeKernel, UnitPos};
    pub use crate::runtime::{CpuDevice, CpuRuntime, Runtime, RuntimeOptions};
    pub use crate::scope::{CubeScope, Unit};
    pub use crate::server::{CubeCount, CubeDim, ExecutionMode, Handle, ServerError};
}
