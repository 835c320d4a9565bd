use super::{ProfileLevel, Profiled};
use crate::{
    config::{Logger, ProfilingLogLevel},
    server::{CubeCount, CubeDim},
};
use core::time::Duration;

/// Server logger, profiling the kernels executed by a server.
#[derive(Debug)]
pub struct ServerLogger {
    kind: DebugLoggerKind,
    profiled: Profiled,
}

/// Debugging logger.
#[derive(Debug)]
enum DebugLoggerKind {
    /// Activated logger.
    Activated(Logger, ProfileLevel),
    /// Don't log information.
    None,
}

impl Default for ServerLogger {
    fn default() -> Self {
        Self::new(Logger::new())
    }
}

impl ServerLogger {
    /// Creates a server logger writing to the given logger.
    pub fn new(logger: Logger) -> Self {
        let level = match logger.log_level_profiling() {
            ProfilingLogLevel::Disabled => None,
            ProfilingLogLevel::Basic => Some(ProfileLevel::Basic),
            ProfilingLogLevel::Medium => Some(ProfileLevel::Medium),
            ProfilingLogLevel::Full => Some(ProfileLevel::Full),
        };

        let kind = match level {
            Some(level) if logger.is_active() => DebugLoggerKind::Activated(logger, level),
            _ => DebugLoggerKind::None,
        };

        Self {
            kind,
            profiled: Profiled::default(),
        }
    }

    /// Returns the profile level, none if profiling is deactivated.
    pub fn profile_level(&self) -> Option<ProfileLevel> {
        match &self.kind {
            DebugLoggerKind::Activated(_, level) => Some(*level),
            DebugLoggerKind::None => None,
        }
    }

    /// Register a profiled launch.
    pub fn register_launch(
        &mut self,
        name: &str,
        duration: Duration,
        count: CubeCount,
        dim: CubeDim,
    ) {
        let DebugLoggerKind::Activated(logger, level) = &mut self.kind else {
            return;
        };

        self.profiled.update(name, duration);

        match level {
            ProfileLevel::Basic => {}
            ProfileLevel::Medium => logger.log_profiling(&format!("| {duration:<10?} | {name}")),
            ProfileLevel::Full => logger.log_profiling(&format!(
                "| {duration:<10?} | {name} | cube count ({}, {}, {}) | cube dim ({}, {}, {})",
                count.x, count.y, count.z, dim.x, dim.y, dim.z
            )),
        }
    }

    /// Show the profiling summary if activated and reset its state.
    pub fn profile_summary(&mut self) {
        if let DebugLoggerKind::Activated(logger, _) = &mut self.kind {
            let profiled = core::mem::take(&mut self.profiled);

            if !profiled.is_empty() {
                logger.log_profiling(&profiled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use std::sync::Arc;

    fn logger(level: ProfilingLogLevel, file: &std::path::Path) -> Logger {
        let mut config = GlobalConfig::default();
        config.profiling.logger.level = level;
        config.profiling.logger.file = Some(file.to_path_buf());
        config.profiling.logger.append = false;
        Logger::from_config(Arc::new(config))
    }

    #[test_log::test]
    fn full_level_logs_launch_geometry_and_summary() {
        let path = std::env::temp_dir().join(format!("transpose-server-{}.log", std::process::id()));
        let mut server_logger = ServerLogger::new(logger(ProfilingLogLevel::Full, &path));

        server_logger.register_launch(
            "copy",
            Duration::from_micros(10),
            CubeCount::new_2d(32, 32),
            CubeDim::new_2d(32, 8),
        );
        server_logger.profile_summary();
        drop(server_logger);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(content.contains("cube count (32, 32, 1) | cube dim (32, 8, 1)"));
        assert!(content.contains("Num Computed"));
    }

    #[test_log::test]
    fn disabled_logger_is_inactive() {
        let path = std::env::temp_dir().join("transpose-server-disabled.log");
        let server_logger = ServerLogger::new(logger(ProfilingLogLevel::Disabled, &path));

        assert_eq!(server_logger.profile_level(), None);
        assert!(!path.exists());
    }
}
