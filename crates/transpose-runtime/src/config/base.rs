use super::{profiling::ProfilingConfig, runtime::RuntimeConfig};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

/// Static mutex holding the global configuration, initialized as `None`.
static GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// File names searched for in the current directory and its parents.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["transpose.toml", "Transpose.toml"];

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file can't be read.
    #[error("Can't read the configuration file {path:?}: {source}")]
    Io {
        /// The file path.
        path: PathBuf,
        /// The io error.
        source: std::io::Error,
    },
    /// The file doesn't have the right format.
    #[error("The configuration file {path:?} doesn't have the right format: {source}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The parsing error.
        source: toml::de::Error,
    },
}

/// Global configuration of the runtime, combining the execution and profiling settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration of the compute runtime.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Configuration for profiling kernel launches.
    #[serde(default)]
    pub profiling: ProfilingConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `transpose.toml` or
    /// `Transpose.toml` in the current directory or its parents. If no file is found, a default
    /// configuration is used. Environment variables override the loaded values.
    pub fn get() -> Arc<Self> {
        let mut state = GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`.
    pub fn set(config: Self) {
        let mut state = GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(mut self) -> Self {
        use super::profiling::ProfilingLogLevel;

        if let Ok(val) = std::env::var("TRANSPOSE_DEBUG_LOG") {
            self.profiling.logger.level = ProfilingLogLevel::Medium;

            match val.as_str() {
                "stdout" => {
                    self.profiling.logger.stdout = true;
                }
                "stderr" => {
                    self.profiling.logger.stderr = true;
                }
                "1" | "true" => {
                    self.profiling.logger.file = Some("/tmp/transpose.log".into());
                }
                "0" | "false" => {
                    self.profiling.logger.level = ProfilingLogLevel::Disabled;
                }
                file_path => {
                    self.profiling.logger.file = Some(file_path.into());
                }
            }
        };

        if let Ok(val) = std::env::var("TRANSPOSE_DEBUG_OPTION") {
            match val.as_str() {
                "debug" | "profile-medium" => {
                    self.profiling.logger.level = ProfilingLogLevel::Medium;
                }
                "debug-full" | "profile-full" => {
                    self.profiling.logger.level = ProfilingLogLevel::Full;
                }
                "profile" => {
                    self.profiling.logger.level = ProfilingLogLevel::Basic;
                }
                _ => {}
            }
        };

        if let Ok(val) = std::env::var("TRANSPOSE_NUM_WORKERS") {
            match val.parse::<usize>() {
                Ok(0) | Err(_) => {
                    log::warn!("Ignoring TRANSPOSE_NUM_WORKERS={val}, expected a positive integer")
                }
                Ok(num_workers) => self.runtime.num_workers = Some(num_workers),
            }
        }

        self
    }

    /// Finds `transpose.toml` or `Transpose.toml` in the current directory or its parents.
    pub fn locate() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.is_file() {
                    return Some(path);
                }
            }

            if !dir.pop() {
                return None;
            }
        }
    }

    // Loads the configuration found by `locate`, falling back to the default one.
    fn from_current_dir() -> Self {
        let Some(path) = Self::locate() else {
            return Self::default();
        };

        match Self::from_file_path(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("{err}, using the default configuration");
                Self::default()
            }
        }
    }

    /// Loads the configuration from a specified file path.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Clone, Copy, Debug)]
/// How to format type names.
pub enum TypeNameFormatLevel {
    /// No formatting apply, full information is included.
    Full,
    /// Most information is removed for a small formatted name.
    Short,
}

/// Format a type name with different options.
pub fn type_name_format(name: &str, level: TypeNameFormatLevel) -> String {
    match level {
        TypeNameFormatLevel::Full => name.to_string(),
        TypeNameFormatLevel::Short => match name.split('<').next() {
            Some(val) => val.split("::").last().unwrap_or(name).to_string(),
            None => name.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfilingLogLevel;
    use serial_test::serial;

    #[test]
    fn test_format_name() {
        let full_name = "transpose_kernels::transpose::TiledTranspose<transpose_runtime::CpuRuntime>";

        assert_eq!(
            type_name_format(full_name, TypeNameFormatLevel::Short),
            "TiledTranspose"
        );
        assert_eq!(
            type_name_format(full_name, TypeNameFormatLevel::Full),
            full_name
        );
    }

    #[test]
    fn parse_sections() {
        let config: GlobalConfig = toml::from_str(
            r#"
            [runtime]
            num_workers = 3

            [profiling.logger]
            level = "basic"
            stdout = true

            [bench]
            nx = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime.num_workers, Some(3));
        assert_eq!(config.profiling.logger.level, ProfilingLogLevel::Basic);
        assert!(config.profiling.logger.stdout);
    }

    #[test]
    #[serial]
    fn env_overrides_file_values() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            std::env::set_var("TRANSPOSE_NUM_WORKERS", "5");
            std::env::set_var("TRANSPOSE_DEBUG_OPTION", "profile");
        }

        let config = GlobalConfig::default().override_from_env();

        unsafe {
            std::env::remove_var("TRANSPOSE_NUM_WORKERS");
            std::env::remove_var("TRANSPOSE_DEBUG_OPTION");
        }

        assert_eq!(config.runtime.num_workers, Some(5));
        assert_eq!(config.profiling.logger.level, ProfilingLogLevel::Basic);
    }

    #[test]
    #[serial]
    fn invalid_worker_count_is_ignored() {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::set_var("TRANSPOSE_NUM_WORKERS", "zero") };

        let config = GlobalConfig::default().override_from_env();

        unsafe { std::env::remove_var("TRANSPOSE_NUM_WORKERS") };

        assert_eq!(config.runtime.num_workers, None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = GlobalConfig::from_file_path("/does/not/exist/transpose.toml").unwrap_err();

        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
