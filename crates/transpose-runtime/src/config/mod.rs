/// Profiling config module.
pub mod profiling;
/// Runtime config module.
pub mod runtime;

mod base;
mod logger;

pub use base::*;
pub use logger::*;
pub use profiling::ProfilingLogLevel;
