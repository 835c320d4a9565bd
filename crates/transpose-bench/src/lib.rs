#![warn(missing_docs)]

//! Effective memory bandwidth of matrix copy and transpose kernels.
//!
//! Every [kernel variant](transpose_kernels::KernelVariant) is launched repeatedly on the same
//! matrices, timed, and its output is checked against a host reference before its bandwidth is
//! reported.

/// Benchmark configuration.
pub mod config;
/// Fatal errors.
pub mod error;
/// Benchmark harness.
pub mod harness;
/// Host reference computation.
pub mod reference;
/// Console report.
pub mod report;

pub use config::{BenchConfig, NUM_REPS, TimingMethod};
pub use error::BenchError;
pub use harness::{BenchVariant, BenchmarkHarness, Outcome, VariantResult};
pub use report::BenchReport;
