use super::{GlobalConfig, profiling::ProfilingLogLevel};
use core::fmt::Display;
use hashbrown::HashSet;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Configuration for logging, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Profiling logger, writing to every output configured in the global configuration.
#[derive(Debug)]
pub struct Logger {
    loggers: Vec<LoggerKind>,

    /// Global configuration for logging settings.
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new `Logger` instance based on the global configuration.
    ///
    /// Note that creating a logger opens its files, so it should be created once per server.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Creates a logger for the given configuration.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut loggers = Vec::new();

        #[derive(Hash, PartialEq, Eq)]
        enum LoggerId {
            File(PathBuf),
            Stdout,
            Stderr,
            LogCrate(LogCrateLevel),
        }

        let mut registered = HashSet::<LoggerId>::new();
        let settings = &config.profiling.logger;

        if settings.level != ProfilingLogLevel::Disabled {
            let mut register = |id: LoggerId, logger: &dyn Fn() -> Option<LoggerKind>| {
                if registered.contains(&id) {
                    return;
                }
                if let Some(logger) = logger() {
                    registered.insert(id);
                    loggers.push(logger);
                }
            };

            if let Some(file) = &settings.file {
                register(LoggerId::File(file.clone()), &|| {
                    FileLogger::new(file, settings.append).map(LoggerKind::File)
                });
            }
            if settings.stdout {
                register(LoggerId::Stdout, &|| Some(LoggerKind::Stdout));
            }
            if settings.stderr {
                register(LoggerId::Stderr, &|| Some(LoggerKind::Stderr));
            }
            if let Some(level) = settings.log {
                register(LoggerId::LogCrate(level), &|| Some(LoggerKind::Log(level)));
            }
        }

        Self { loggers, config }
    }

    /// Logs a message for profiling, directing it to all configured profiling loggers.
    pub fn log_profiling<S: Display>(&mut self, msg: &S) {
        if self.loggers.len() > 1 {
            let msg = msg.to_string();
            for logger in self.loggers.iter_mut() {
                logger.log(&msg);
            }
        } else if let Some(logger) = self.loggers.first_mut() {
            logger.log(msg);
        }
    }

    /// Returns the current profiling log level from the global configuration.
    pub fn log_level_profiling(&self) -> ProfilingLogLevel {
        self.config.profiling.logger.level
    }

    /// Whether at least one output is configured.
    pub fn is_active(&self) -> bool {
        !self.loggers.is_empty()
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    File(FileLogger),

    /// Logs to standard output.
    Stdout,

    /// Logs to standard error.
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            LoggerKind::File(file_logger) => file_logger.log(msg),
            LoggerKind::Stdout => println!("{msg}"),
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    // Opens the file, `None` when it can't be opened.
    fn new(path: &PathBuf, append: bool) -> Option<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path);

        match file {
            Ok(file) => Some(Self {
                writer: BufWriter::new(file),
            }),
            Err(err) => {
                log::warn!("Can't open the profiling log file {path:?}: {err}");
                None
            }
        }
    }

    // Logs a message to the file, flushing the buffer to ensure immediate write.
    fn log<S: Display>(&mut self, msg: &S) {
        let written = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush());
        if let Err(err) = written {
            log::warn!("Can't write to the profiling log file: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: ProfilingLogLevel, file: Option<PathBuf>) -> Arc<GlobalConfig> {
        let mut config = GlobalConfig::default();
        config.profiling.logger.level = level;
        config.profiling.logger.file = file;
        config.profiling.logger.append = false;
        Arc::new(config)
    }

    #[test_log::test]
    fn disabled_profiling_has_no_output() {
        let mut config = (*config(ProfilingLogLevel::Disabled, None)).clone();
        config.profiling.logger.stdout = true;

        let logger = Logger::from_config(Arc::new(config));

        assert!(!logger.is_active());
    }

    #[test_log::test]
    fn file_logger_writes_messages() {
        let path = std::env::temp_dir().join(format!("transpose-logger-{}.log", std::process::id()));
        let mut logger = Logger::from_config(config(ProfilingLogLevel::Basic, Some(path.clone())));

        logger.log_profiling(&"copy launched");
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(content, "copy launched\n");
    }

    #[test_log::test]
    fn unwritable_file_is_skipped() {
        let path = PathBuf::from("/does/not/exist/transpose.log");
        let logger = Logger::from_config(config(ProfilingLogLevel::Basic, Some(path)));

        assert!(!logger.is_active());
    }
}
