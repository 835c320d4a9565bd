use serde::{Deserialize, Serialize};
use std::path::Path;
use transpose_kernels::{BLOCK_ROWS, ConfigurationError, NX, NY, TILE_DIM, TileGeometry};
use transpose_runtime::config::{ConfigError, GlobalConfig};

/// Number of timed launches per variant.
pub const NUM_REPS: u32 = 100;

/// How the timed launches are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMethod {
    /// Events recorded in the device queue around the launches.
    #[default]
    Device,
    /// Host clock around the launches and a full synchronization.
    System,
}

/// Configuration of a benchmark run, read from the `[bench]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of matrix columns.
    pub nx: u32,
    /// Number of matrix rows.
    pub ny: u32,
    /// Edge of a tile.
    pub tile_dim: u32,
    /// Rows of a tile handled per iteration.
    pub block_rows: u32,
    /// Number of timed launches per variant.
    pub num_reps: u32,
    /// How the timed launches are measured.
    pub timing: TimingMethod,
    /// Whether an analysed launch records the memory access pattern of every variant.
    pub analyse_access: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            nx: NX,
            ny: NY,
            tile_dim: TILE_DIM,
            block_rows: BLOCK_ROWS,
            num_reps: NUM_REPS,
            timing: TimingMethod::Device,
            analyse_access: true,
        }
    }
}

#[derive(Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    bench: BenchConfig,
}

impl BenchConfig {
    /// Loads the `[bench]` table of the given file, or of the file found next to the runtime
    /// configuration, then applies the environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file_path(path)?,
            None => match GlobalConfig::locate() {
                Some(path) => Self::from_file_path(path)?,
                None => Self::default(),
            },
        };

        Ok(config.override_from_env())
    }

    /// Loads the `[bench]` table of a configuration file, missing fields keeping their default.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded bench configuration from {path:?}");

        Ok(file.bench)
    }

    /// Overrides the dimensions based on environment variables.
    pub fn override_from_env(mut self) -> Self {
        for (name, field) in [
            ("TRANSPOSE_NX", &mut self.nx),
            ("TRANSPOSE_NY", &mut self.ny),
            ("TRANSPOSE_TILE_DIM", &mut self.tile_dim),
            ("TRANSPOSE_BLOCK_ROWS", &mut self.block_rows),
            ("TRANSPOSE_NUM_REPS", &mut self.num_reps),
        ] {
            if let Ok(val) = std::env::var(name) {
                match val.parse::<u32>() {
                    Ok(value) => *field = value,
                    Err(_) => log::warn!("Ignoring {name}={val}, expected an unsigned integer"),
                }
            }
        }

        self
    }

    /// The validated geometry of the run.
    pub fn geometry(&self) -> Result<TileGeometry, ConfigurationError> {
        TileGeometry::new(self.nx, self.ny, self.tile_dim, self.block_rows)
    }

    /// Validates the whole configuration and returns the geometry of the run.
    pub fn validate(&self) -> Result<TileGeometry, ConfigurationError> {
        let geometry = self.geometry()?;
        if self.num_reps == 0 {
            return Err(ConfigurationError::ZeroDimension { name: "num_reps" });
        }

        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test_log::test]
    fn missing_fields_keep_their_default() {
        let file: ConfigFile = toml::from_str(
            r#"
            [runtime]
            num_workers = 4

            [bench]
            nx = 64
            timing = "system"
            "#,
        )
        .unwrap();

        assert_eq!(
            file.bench,
            BenchConfig {
                nx: 64,
                timing: TimingMethod::System,
                ..Default::default()
            }
        );
    }

    #[test_log::test]
    fn file_without_bench_table() {
        let file: ConfigFile = toml::from_str("[profiling.logger]\nlevel = \"basic\"\n").unwrap();

        assert_eq!(file.bench, BenchConfig::default());
    }

    #[test_log::test]
    fn invalid_file_is_an_error() {
        let path = std::env::temp_dir().join("transpose-bench-invalid.toml");
        std::fs::write(&path, "[bench]\nnx = \"wide\"\n").unwrap();

        let result = BenchConfig::from_file_path(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test_log::test]
    #[serial]
    fn env_overrides_dimensions() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            std::env::set_var("TRANSPOSE_NX", "64");
            std::env::set_var("TRANSPOSE_BLOCK_ROWS", "seven");
        }

        let config = BenchConfig::default().override_from_env();

        unsafe {
            std::env::remove_var("TRANSPOSE_NX");
            std::env::remove_var("TRANSPOSE_BLOCK_ROWS");
        }

        assert_eq!(config.nx, 64);
        assert_eq!(config.block_rows, BLOCK_ROWS);
    }

    #[test_log::test]
    fn geometry_is_validated() {
        let config = BenchConfig {
            block_rows: 7,
            ..Default::default()
        };

        assert_eq!(
            config.geometry(),
            Err(ConfigurationError::BlockRowsMismatch {
                tile_dim: 32,
                block_rows: 7,
            })
        );
    }

    #[test_log::test]
    fn zero_reps_are_rejected() {
        let config = BenchConfig {
            num_reps: 0,
            ..Default::default()
        };

        assert_eq!(config.geometry().map(|geometry| geometry.nx()), Ok(NX));
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroDimension { name: "num_reps" })
        );
    }
}
