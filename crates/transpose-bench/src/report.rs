use crate::{
    config::TimingMethod,
    harness::{Outcome, VariantResult},
};
use core::fmt::Display;
use transpose_kernels::TileGeometry;

/// Marker replacing the bandwidth of a variant whose output is wrong.
pub const FAILED: &str = "*** FAILED ***";

/// Results of a benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    /// Name of the device.
    pub device: String,
    /// Geometry of the run.
    pub geometry: TileGeometry,
    /// Number of timed launches per variant.
    pub num_reps: u32,
    /// How the launches were timed.
    pub timing: TimingMethod,
    /// One result per variant, in run order.
    pub results: Vec<VariantResult>,
}

impl BenchReport {
    /// Number of variants whose output is wrong.
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|result| !result.passed()).count()
    }

    /// The result of the variant with the given name.
    pub fn result(&self, name: &str) -> Option<&VariantResult> {
        self.results.iter().find(|result| result.name == name)
    }
}

impl Display for BenchReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let geometry = &self.geometry;
        let count = geometry.cube_count();
        let dim = geometry.cube_dim();

        writeln!(f, "Device : {}", self.device)?;
        writeln!(
            f,
            "Matrix size: {} {}, Block size: {} {}, Tile size: {} {}",
            geometry.nx(),
            geometry.ny(),
            geometry.tile_dim(),
            geometry.block_rows(),
            geometry.tile_dim(),
            geometry.tile_dim()
        )?;
        writeln!(
            f,
            "dimGrid: {} {} {}. dimBlock: {} {} {}",
            count.x, count.y, count.z, dim.x, dim.y, dim.z
        )?;
        writeln!(
            f,
            "Timing: {:?}, {} launches per variant",
            self.timing, self.num_reps
        )?;
        writeln!(f, "{:>25}{:>20}", "Routine", "Bandwidth (GB/s)")?;

        for result in &self.results {
            match &result.outcome {
                Outcome::Passed { bandwidth_gbs, .. } => {
                    writeln!(f, "{:>25}{:>20.2}", result.name, bandwidth_gbs)?
                }
                Outcome::Failed(failure) => {
                    writeln!(f, "{:>25}{:>20}", result.name, FAILED)?;
                    writeln!(f, "{:>25}{failure}", "")?;
                }
            }

            if let Some(stats) = &result.stats {
                writeln!(f, "{:>25}{stats}", "")?;
            }
        }

        Ok(())
    }
}
