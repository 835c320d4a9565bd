use crate::{
    config::{BenchConfig, TimingMethod},
    error::BenchError,
    reference::{self, CorrectnessFailure},
    report::BenchReport,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use transpose_kernels::{ConfigurationError, Expected, KernelVariant, TileGeometry};
use transpose_runtime::{
    future,
    prelude::{AccessStats, ComputeClient, CubeKernel, DeviceBuffer, HostBuffer, ServerError},
    server::ComputeServer,
};

/// Value the output buffers are reset to before every run of a kernel.
pub const SENTINEL: f32 = -1.0;

/// A kernel to benchmark, with the reference its output is checked against.
#[derive(Clone)]
pub struct BenchVariant {
    /// Name shown in reports.
    pub name: String,
    /// The kernel, launched with the input and output matrices as bindings.
    pub kernel: Arc<dyn CubeKernel>,
    /// What the output must equal.
    pub expected: Expected,
}

impl BenchVariant {
    /// The benchmark of a kernel variant.
    pub fn from_variant(variant: KernelVariant, geometry: TileGeometry) -> Self {
        Self {
            name: variant.name().to_string(),
            kernel: variant.kernel(geometry),
            expected: variant.expected(),
        }
    }
}

impl core::fmt::Debug for BenchVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BenchVariant")
            .field("name", &self.name)
            .field("kernel", &self.kernel.name())
            .field("expected", &self.expected)
            .finish()
    }
}

/// Outcome of the benchmark of a single variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The output matched the reference.
    Passed {
        /// Time spent by all the timed launches.
        elapsed: Duration,
        /// Effective bandwidth in GB/s, counting one read and one write per element.
        bandwidth_gbs: f64,
    },
    /// The output differs from the reference, no bandwidth is reported.
    Failed(CorrectnessFailure),
}

/// Result of the benchmark of a single variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantResult {
    /// Name of the variant.
    pub name: String,
    /// Correctness and bandwidth.
    pub outcome: Outcome,
    /// Memory access pattern of a single launch, when analysed.
    pub stats: Option<AccessStats>,
}

impl VariantResult {
    /// Whether the output matched the reference.
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed { .. })
    }
}

/// Device and host buffers of a run, released when the run ends.
struct Buffers {
    host_input: HostBuffer,
    reference: HostBuffer,
    input: DeviceBuffer,
    copy_result: DeviceBuffer,
    transpose_result: DeviceBuffer,
}

/// Effective bandwidth of `num_reps` launches each reading and writing `size_bytes`.
pub fn bandwidth_gbs(size_bytes: usize, num_reps: u32, elapsed: Duration) -> f64 {
    let elapsed = elapsed.max(Duration::from_nanos(1)).as_secs_f64();
    2.0 * size_bytes as f64 / 1e9 / (elapsed / num_reps as f64)
}

/// Times repeated launches of every variant and checks their output against the host reference.
#[derive(Debug)]
pub struct BenchmarkHarness<S: ComputeServer> {
    client: ComputeClient<S>,
    config: BenchConfig,
    geometry: TileGeometry,
}

impl<S: ComputeServer> BenchmarkHarness<S> {
    /// Validates the configuration, nothing is allocated on the device yet.
    pub fn new(client: ComputeClient<S>, config: BenchConfig) -> Result<Self, ConfigurationError> {
        let geometry = config.validate()?;

        Ok(Self {
            client,
            config,
            geometry,
        })
    }

    /// The validated geometry.
    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    /// Benchmarks every kernel variant in order.
    pub fn run(&self) -> Result<BenchReport, BenchError> {
        let variants: Vec<BenchVariant> = KernelVariant::ALL
            .into_iter()
            .map(|variant| BenchVariant::from_variant(variant, self.geometry))
            .collect();

        self.run_variants(&variants)
    }

    /// Benchmarks the given variants in order.
    ///
    /// A correctness failure is recorded and the next variants still run, device errors abort
    /// the run.
    pub fn run_variants(&self, variants: &[BenchVariant]) -> Result<BenchReport, BenchError> {
        let buffers = self.prepare()?;
        let mut results = Vec::with_capacity(variants.len());

        for variant in variants {
            let result = self.run_variant(&buffers, variant)?;
            match &result.outcome {
                Outcome::Passed { bandwidth_gbs, .. } => {
                    log::info!("{}: {bandwidth_gbs:.2} GB/s", result.name)
                }
                Outcome::Failed(failure) => log::warn!("{}: {failure}", result.name),
            }
            results.push(result);
        }

        core::mem::drop(buffers);
        self.client.memory_cleanup()?;

        Ok(BenchReport {
            device: self.client.properties().name.clone(),
            geometry: self.geometry,
            num_reps: self.config.num_reps,
            timing: self.config.timing,
            results,
        })
    }

    fn prepare(&self) -> Result<Buffers, ServerError> {
        let geometry = &self.geometry;
        let (nx, ny) = (geometry.nx() as usize, geometry.ny() as usize);

        let host_input = reference::initial_matrix(geometry);
        let reference = reference::transpose(&host_input);
        log::debug!("Host matrices ready for {geometry}");

        let input = host_input.upload(&self.client)?;
        let copy_result = DeviceBuffer::empty(&self.client, nx, ny)?;
        let transpose_result = DeviceBuffer::empty(&self.client, ny, nx)?;

        Ok(Buffers {
            host_input,
            reference,
            input,
            copy_result,
            transpose_result,
        })
    }

    fn run_variant(
        &self,
        buffers: &Buffers,
        variant: &BenchVariant,
    ) -> Result<VariantResult, ServerError> {
        let (output, expected) = match variant.expected {
            Expected::Identity => (&buffers.copy_result, &buffers.host_input),
            Expected::Transpose => (&buffers.transpose_result, &buffers.reference),
        };
        let bindings = || vec![buffers.input.binding(), output.binding()];
        let count = self.geometry.cube_count();
        let dim = self.geometry.cube_dim();

        log::debug!("{}: warmup", variant.name);
        output.fill(&self.client, SENTINEL)?;
        self.client.launch(variant.kernel.clone(), count, dim, bindings())?;
        future::block_on(self.client.sync())?;

        log::debug!("{}: {} timed launches", variant.name, self.config.num_reps);
        output.fill(&self.client, SENTINEL)?;
        let elapsed = self.timed_launches(|| {
            self.client
                .launch_unchecked(variant.kernel.clone(), count, dim, bindings())
        })?;

        let actual = output.download(&self.client)?;
        let outcome = match reference::verify(&actual, expected) {
            Ok(()) => Outcome::Passed {
                elapsed,
                bandwidth_gbs: bandwidth_gbs(
                    self.geometry.size_bytes(),
                    self.config.num_reps,
                    elapsed,
                ),
            },
            Err(failure) => Outcome::Failed(failure),
        };

        let stats = if self.config.analyse_access {
            log::debug!("{}: analysed launch", variant.name);
            Some(
                self.client
                    .analyse(variant.kernel.clone(), count, dim, bindings())?,
            )
        } else {
            None
        };

        Ok(VariantResult {
            name: variant.name.clone(),
            outcome,
            stats,
        })
    }

    fn timed_launches<F>(&self, launch: F) -> Result<Duration, ServerError>
    where
        F: Fn() -> Result<(), ServerError>,
    {
        match self.config.timing {
            TimingMethod::Device => {
                let start = self.client.record_event()?;
                for _ in 0..self.config.num_reps {
                    launch()?;
                }
                let stop = self.client.record_event()?;

                stop.elapsed_since(&start)
            }
            TimingMethod::System => {
                future::block_on(self.client.sync())?;
                let start = Instant::now();
                for _ in 0..self.config.num_reps {
                    launch()?;
                }
                future::block_on(self.client.sync())?;

                Ok(start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn bandwidth_counts_read_and_write() {
        // 4 MB read and written 100 times in 0.1 s.
        let bandwidth = bandwidth_gbs(4_000_000, 100, Duration::from_millis(100));

        assert!((bandwidth - 8.0).abs() < 1e-9);
    }

    #[test_log::test]
    fn bandwidth_is_finite_for_instant_runs() {
        let bandwidth = bandwidth_gbs(4096, 1, Duration::ZERO);

        assert!(bandwidth.is_finite());
        assert!(bandwidth > 0.0);
    }
}
