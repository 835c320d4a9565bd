use super::{
    scheduler::{LaunchOutcome, Scheduler},
    task::LaunchTask,
};
use crate::{
    DeviceProperties,
    analysis::AccessStats,
    logging::ServerLogger,
    scope::ScopeOptions,
    server::{
        ComputeServer, Handle, IoError, KernelLaunch, LaunchError, ResourceLimitError,
        ServerError,
    },
    storage::{MemoryUsage, WORD_SIZE, WordResource, WordStorage},
};
use std::{sync::Arc, time::Instant};

/// Compute server executing kernels on CPU worker threads.
#[derive(Debug)]
pub struct CpuServer {
    storage: WordStorage,
    scheduler: Scheduler,
    logger: ServerLogger,
    properties: Arc<DeviceProperties>,
    errors: Vec<ServerError>,
}

impl CpuServer {
    /// Creates a server with its own worker threads.
    pub fn new(properties: DeviceProperties, logger: ServerLogger) -> Self {
        let scheduler = Scheduler::new(properties.hardware.num_workers);
        log::debug!(
            "Compute server on {} with {} workers",
            properties.name,
            scheduler.num_workers()
        );

        Self {
            storage: WordStorage::new(properties.hardware.max_memory_size),
            scheduler,
            logger,
            properties: Arc::new(properties),
            errors: Vec::new(),
        }
    }

    /// Returns the first error raised since the last blocking operation, clearing them all.
    fn flush_errors(&mut self) -> Result<(), ServerError> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let mut errors = core::mem::take(&mut self.errors).into_iter();
        let first = errors.next();
        for dropped in errors {
            log::debug!("Discarding error following an earlier one: {dropped}");
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn prepare(&self, launch: &KernelLaunch, analyse: bool) -> Result<LaunchTask, LaunchError> {
        let hardware = &self.properties.hardware;
        let count = launch.count;
        let dim = launch.dim;

        if count.num_cubes() == 0 || dim.num_elems() == 0 {
            return Err(LaunchError::EmptyLaunch {
                kernel: launch.kernel.name(),
                count,
                dim,
            });
        }

        let units = dim.x as u64 * dim.y as u64 * dim.z as u64;
        if units > hardware.max_units_per_cube as u64 {
            return Err(ResourceLimitError::Units {
                requested: units.min(u32::MAX as u64) as u32,
                max: hardware.max_units_per_cube,
            }
            .into());
        }

        let max_count = hardware.max_cube_count;
        if count.x > max_count.0 || count.y > max_count.1 || count.z > max_count.2 {
            return Err(ResourceLimitError::CubeCount {
                requested: count.into(),
                max: max_count,
            }
            .into());
        }

        let shared_memory_len = launch.kernel.shared_memory_len();
        let shared_memory_size = shared_memory_len * WORD_SIZE;
        if shared_memory_size > hardware.max_shared_memory_size {
            return Err(ResourceLimitError::SharedMemory {
                requested: shared_memory_size,
                max: hardware.max_shared_memory_size,
            }
            .into());
        }

        let resources = launch
            .bindings
            .iter()
            .map(|handle| self.storage.get(handle))
            .collect::<Result<Vec<_>, IoError>>()?;

        Ok(LaunchTask {
            kernel: launch.kernel.clone(),
            count,
            dim,
            resources,
            shared_memory_len,
            options: ScopeOptions::new(
                launch.mode,
                analyse,
                hardware.plane_size,
                hardware.shared_memory_banks,
            ),
        })
    }

    fn execute(&mut self, launch: KernelLaunch, analyse: bool) -> Result<LaunchOutcome, ServerError> {
        let task = self.prepare(&launch, analyse)?;
        let name = launch.kernel.name();

        let start = Instant::now();
        let outcome = self.scheduler.dispatch(task);
        self.logger
            .register_launch(&name, start.elapsed(), launch.count, launch.dim);

        match outcome.fault {
            Some(fault) => Err(ServerError::Execution { kernel: name, fault }),
            None => Ok(outcome),
        }
    }
}

impl ComputeServer for CpuServer {
    fn create(&mut self, data: &[u8]) -> Result<Handle, ServerError> {
        let resource = WordResource::from_bytes(data)?;
        Ok(self.storage.register(resource)?)
    }

    fn empty(&mut self, size: usize) -> Result<Handle, ServerError> {
        Ok(self.storage.alloc(size)?)
    }

    fn fill(&mut self, handle: Handle, value: f32) {
        match self.storage.get(&handle) {
            Ok(resource) => resource.fill(value),
            Err(err) => self.errors.push(err.into()),
        }
    }

    fn read(&mut self, handles: Vec<Handle>) -> Result<Vec<Vec<u8>>, ServerError> {
        self.flush_errors()?;

        handles
            .iter()
            .map(|handle| {
                self.storage
                    .get(handle)
                    .map(|resource| resource.to_bytes())
                    .map_err(ServerError::from)
            })
            .collect()
    }

    fn launch(&mut self, launch: KernelLaunch) {
        if let Err(err) = self.execute(launch, false) {
            log::debug!("Launch failed: {err}");
            self.errors.push(err);
        }
    }

    fn analyse(&mut self, launch: KernelLaunch) -> Result<AccessStats, ServerError> {
        self.flush_errors()?;

        let outcome = self.execute(launch, true)?;
        Ok(outcome.stats.unwrap_or_default())
    }

    fn sync(&mut self) -> Result<(), ServerError> {
        self.logger.profile_summary();
        self.flush_errors()
    }

    fn timestamp(&mut self) -> Result<Instant, ServerError> {
        self.flush_errors()?;
        Ok(Instant::now())
    }

    fn memory_usage(&mut self) -> MemoryUsage {
        self.storage.usage()
    }

    fn memory_cleanup(&mut self) {
        let released = self.storage.cleanup();
        log::debug!("Released {released} buffer(s), {}", self.storage.usage());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        HardwareProperties,
        config::Logger,
        kernel::CubeKernel,
        scope::{CubeScope, KernelFault},
        server::{CubeCount, CubeDim, ExecutionMode},
    };
    use pretty_assertions::assert_eq;

    struct Scale;

    impl CubeKernel for Scale {
        fn name(&self) -> String {
            "scale".into()
        }

        fn execute(&self, cube: &mut CubeScope<'_>) {
            cube.for_each_unit(|unit| {
                let x = unit.pos().absolute_x() as usize;
                let value = unit.load(0, x);
                unit.store(1, x, value * 2.0);
            });
        }
    }

    struct SharedHog;

    impl CubeKernel for SharedHog {
        fn shared_memory_len(&self) -> usize {
            48 * 1024
        }

        fn execute(&self, _cube: &mut CubeScope<'_>) {}
    }

    fn server() -> CpuServer {
        let properties = DeviceProperties::new(
            "test",
            HardwareProperties {
                num_workers: 2,
                ..Default::default()
            },
        );
        let logger = ServerLogger::new(Logger::from_config(Default::default()));
        CpuServer::new(properties, logger)
    }

    fn launch(
        kernel: Arc<dyn CubeKernel>,
        count: CubeCount,
        bindings: Vec<Handle>,
    ) -> KernelLaunch {
        KernelLaunch::new(
            kernel,
            count,
            CubeDim::new_1d(4),
            bindings,
            ExecutionMode::Checked,
        )
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(bytes)
    }

    #[test_log::test]
    fn launch_then_read() {
        let mut server = server();
        let input = server
            .create(bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]))
            .unwrap();
        let output = server.empty(32).unwrap();

        server.launch(launch(
            Arc::new(Scale),
            CubeCount::new_1d(2),
            vec![input, output.clone()],
        ));
        let data = server.read(vec![output]).unwrap();

        assert_eq!(
            floats(&data[0]),
            vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0]
        );
    }

    #[test_log::test]
    fn execution_errors_surface_on_next_blocking_call_once() {
        let mut server = server();
        let input = server.empty(16).unwrap();
        let output = server.empty(16).unwrap();

        // Two cubes of four units on buffers of four words.
        server.launch(launch(
            Arc::new(Scale),
            CubeCount::new_1d(2),
            vec![input, output],
        ));

        match server.sync() {
            Err(ServerError::Execution {
                kernel,
                fault: KernelFault::OutOfBounds { index: 4, len: 4, .. },
            }) => assert_eq!(kernel, "scale"),
            result => panic!("Unexpected result {result:?}"),
        }
        assert_eq!(server.sync(), Ok(()));
    }

    #[test_log::test]
    fn too_much_shared_memory_is_rejected() {
        let mut server = server();

        server.launch(launch(Arc::new(SharedHog), CubeCount::new_single(), vec![]));

        assert_eq!(
            server.sync(),
            Err(ServerError::Launch(LaunchError::TooManyResources(
                ResourceLimitError::SharedMemory {
                    requested: 4 * 48 * 1024,
                    max: 48 * 1024,
                }
            )))
        );
    }

    #[test_log::test]
    fn empty_launch_is_rejected() {
        let mut server = server();

        let result = server.analyse(launch(
            Arc::new(Scale),
            CubeCount::new_2d(0, 4),
            vec![],
        ));

        assert!(matches!(
            result,
            Err(ServerError::Launch(LaunchError::EmptyLaunch { .. }))
        ));
    }

    #[test_log::test]
    fn dropped_buffers_are_released_on_cleanup() {
        let mut server = server();
        let kept = server.empty(64).unwrap();
        let dropped = server.empty(64).unwrap();

        drop(dropped);
        server.memory_cleanup();

        assert_eq!(
            server.memory_usage(),
            MemoryUsage {
                number_allocs: 1,
                bytes_in_use: 64
            }
        );
        assert!(server.read(vec![kept]).is_ok());
    }
}
