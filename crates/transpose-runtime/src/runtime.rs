use crate::{
    DeviceProperties, HardwareProperties,
    channel::MpscComputeChannel,
    client::ComputeClient,
    compute::CpuServer,
    config::{GlobalConfig, Logger},
    logging::ServerLogger,
    server::ComputeServer,
};
use core::{fmt::Debug, hash::Hash};
use hashbrown::HashMap;
use sysinfo::System;

/// Runtime giving access to the compute clients of its devices.
pub trait Runtime: Sized + Send + Sync + 'static + Debug {
    /// The compute server used to run kernels.
    type Server: ComputeServer;
    /// The device used to retrieve the compute client.
    type Device: Default + Clone + Hash + Eq + Debug + Send + Sync;

    /// Retrieve the compute client from the runtime device.
    fn client(device: &Self::Device) -> ComputeClient<Self::Server>;

    /// The runtime name on the given device.
    fn name(client: &ComputeClient<Self::Server>) -> &'static str;
}

/// The compute type has the responsibility to retrieve the correct compute client based on the
/// given device.
pub struct ComputeRuntime<Device, Server: ComputeServer> {
    clients: spin::Mutex<Option<HashMap<Device, ComputeClient<Server>>>>,
}

impl<Device, Server> Default for ComputeRuntime<Device, Server>
where
    Device: Hash + PartialEq + Eq + Clone + Debug,
    Server: ComputeServer,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Device, Server> ComputeRuntime<Device, Server>
where
    Device: Hash + PartialEq + Eq + Clone + Debug,
    Server: ComputeServer,
{
    /// Create a new compute.
    pub const fn new() -> Self {
        Self {
            clients: spin::Mutex::new(None),
        }
    }

    /// Get the compute client for the given device.
    ///
    /// Provide the init function to create a new client if it isn't already initialized.
    pub fn client<Init>(&self, device: &Device, init: Init) -> ComputeClient<Server>
    where
        Init: Fn() -> ComputeClient<Server>,
    {
        let mut clients = self.clients.lock();
        let clients = clients.get_or_insert_with(HashMap::new);

        clients
            .entry(device.clone())
            .or_insert_with(init)
            .clone()
    }
}

/// The host CPU, the only device of the [CPU runtime](CpuRuntime).
#[derive(Default, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct CpuDevice;

/// Options of a new CPU client.
#[derive(Default, Clone, Debug)]
pub struct RuntimeOptions {
    /// Number of worker threads, the configured value when `None`.
    pub num_workers: Option<usize>,
    /// Maximum amount of device memory in bytes, the system memory when `None`.
    pub max_memory_size: Option<u64>,
}

/// Runtime executing kernels on the host CPU.
#[derive(Debug)]
pub struct CpuRuntime;

static RUNTIME: ComputeRuntime<CpuDevice, CpuServer> = ComputeRuntime::new();

impl CpuRuntime {
    /// Creates a client with its own server, not shared with [`Runtime::client`].
    pub fn create_client(options: RuntimeOptions) -> ComputeClient<CpuServer> {
        let config = GlobalConfig::get();

        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_all();

        let system_memory = system
            .cgroup_limits()
            .map(|limits| limits.total_memory)
            .unwrap_or(system.total_memory());
        let brand = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "cpu".to_string());

        let hardware = HardwareProperties {
            num_workers: options
                .num_workers
                .unwrap_or_else(|| config.runtime.num_workers())
                .max(1),
            max_memory_size: options.max_memory_size.unwrap_or(match system_memory {
                0 => u64::MAX,
                memory => memory,
            }),
            ..Default::default()
        };

        let properties = DeviceProperties::new(brand, hardware);
        let logger = ServerLogger::new(Logger::from_config(config));
        let server = CpuServer::new(properties.clone(), logger);

        ComputeClient::new(MpscComputeChannel::new(server), properties)
    }
}

impl Runtime for CpuRuntime {
    type Server = CpuServer;
    type Device = CpuDevice;

    fn client(device: &Self::Device) -> ComputeClient<Self::Server> {
        RUNTIME.client(device, || Self::create_client(RuntimeOptions::default()))
    }

    fn name(_client: &ComputeClient<Self::Server>) -> &'static str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernel::CubeKernel,
        scope::CubeScope,
        server::{CubeCount, CubeDim, ServerError},
    };
    use std::sync::Arc;

    struct AddOne;

    impl CubeKernel for AddOne {
        fn execute(&self, cube: &mut CubeScope<'_>) {
            cube.for_each_unit(|unit| {
                let x = unit.pos().absolute_x() as usize;
                let value = unit.load(0, x);
                unit.store(0, x, value + 1.0);
            });
        }
    }

    fn client() -> ComputeClient<CpuServer> {
        CpuRuntime::create_client(RuntimeOptions {
            num_workers: Some(2),
            max_memory_size: Some(1 << 20),
        })
    }

    #[test_log::test]
    fn shared_client_is_reused() {
        let a = CpuRuntime::client(&CpuDevice);
        let b = CpuRuntime::client(&CpuDevice);

        assert_eq!(a.properties(), b.properties());
        assert_eq!(CpuRuntime::name(&a), "cpu");
    }

    #[test_log::test]
    fn fill_launch_and_read_are_ordered() {
        let client = client();
        let handle = client.empty(64 * 4).unwrap();

        client.fill(&handle, -1.0).unwrap();
        for _ in 0..3 {
            client
                .launch(
                    Arc::new(AddOne),
                    CubeCount::new_1d(2),
                    CubeDim::new_1d(32),
                    vec![handle.clone()],
                )
                .unwrap();
        }

        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&client.read_one(handle).unwrap());
        assert!(data.iter().all(|value| *value == 2.0));
    }

    #[test_log::test]
    fn events_measure_enqueued_work() {
        let client = client();
        let handle = client.empty(64 * 4).unwrap();

        let start = client.record_event().unwrap();
        client
            .launch_unchecked(
                Arc::new(AddOne),
                CubeCount::new_1d(2),
                CubeDim::new_1d(32),
                vec![handle],
            )
            .unwrap();
        let end = client.record_event().unwrap();

        let elapsed = end.elapsed_since(&start).unwrap();
        assert!(end.is_complete());
        assert!(elapsed.as_secs() < 60);
    }

    #[test_log::test]
    fn out_of_memory_is_reported() {
        let client = client();

        assert!(matches!(
            client.empty(2 << 20),
            Err(ServerError::Io(crate::server::IoError::OutOfMemory { .. }))
        ));
    }

    #[test_log::test]
    fn memory_is_released_after_handles_drop() {
        let client = client();
        let before = client.memory_usage().unwrap();

        let handle = client.empty(1024).unwrap();
        assert_eq!(client.memory_usage().unwrap().bytes_in_use, before.bytes_in_use + 1024);

        drop(handle);
        client.memory_cleanup().unwrap();
        assert_eq!(client.memory_usage().unwrap(), before);
    }
}
