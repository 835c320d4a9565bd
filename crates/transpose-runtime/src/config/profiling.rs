use super::logger::{LogLevel, LoggerConfig};

/// Configuration for profiling settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProfilingConfig {
    /// Logger configuration for profiling logs, using profiling-specific log levels.
    #[serde(default)]
    pub logger: LoggerConfig<ProfilingLogLevel>,
}

/// Log levels for profiling.
#[derive(
    Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum ProfilingLogLevel {
    /// Profiling logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// A summary table of the launched kernels, logged on every sync.
    #[serde(rename = "basic")]
    Basic,

    /// Every launch is logged with its duration, plus the summary table.
    #[serde(rename = "medium")]
    Medium,

    /// Every launch is logged with its duration, cube count and cube dim.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for ProfilingLogLevel {}
