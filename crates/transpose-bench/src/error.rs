use thiserror::Error;
use transpose_kernels::ConfigurationError;
use transpose_runtime::{config::ConfigError, prelude::ServerError};

/// A fatal error, aborting the whole run.
#[derive(Error, Debug)]
pub enum BenchError {
    /// The geometry is invalid, detected before any device work.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A device operation failed or a kernel faulted.
    #[error("Device error: {0}")]
    Device(#[from] ServerError),

    /// The configuration file can't be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
