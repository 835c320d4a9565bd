use crate::{
    DeviceProperties,
    analysis::AccessStats,
    channel::{DynFut, MpscComputeChannel},
    event::Event,
    kernel::CubeKernel,
    server::{
        Bindings, ComputeServer, CubeCount, CubeDim, ExecutionMode, Handle, KernelLaunch,
        ServerError,
    },
    storage::MemoryUsage,
};
use futures_lite::future;
use std::sync::Arc;

/// The ComputeClient is the entry point to require tasks from the ComputeServer.
/// It should be obtained for a specific device via the [runtime](crate::runtime::Runtime).
#[derive(Debug)]
pub struct ComputeClient<Server: ComputeServer> {
    channel: MpscComputeChannel<Server>,
    properties: Arc<DeviceProperties>,
}

impl<Server: ComputeServer> Clone for ComputeClient<Server> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<Server: ComputeServer> ComputeClient<Server> {
    /// Create a new client.
    pub fn new(channel: MpscComputeChannel<Server>, properties: DeviceProperties) -> Self {
        Self {
            channel,
            properties: Arc::new(properties),
        }
    }

    /// Given bindings, returns owned resources as bytes.
    pub fn read_async(&self, handles: Vec<Handle>) -> DynFut<Result<Vec<Vec<u8>>, ServerError>> {
        self.channel.read(handles)
    }

    /// Given bindings, returns owned resources as bytes.
    ///
    /// Blocks until every task enqueued before completed.
    pub fn read(&self, handles: Vec<Handle>) -> Result<Vec<Vec<u8>>, ServerError> {
        future::block_on(self.read_async(handles))
    }

    /// Given a binding, returns owned resource as bytes.
    pub fn read_one(&self, handle: Handle) -> Result<Vec<u8>, ServerError> {
        let mut data = self.read(vec![handle])?;
        Ok(data.remove(0))
    }

    /// Given a resource, stores it and returns the resource handle.
    pub fn create(&self, data: &[u8]) -> Result<Handle, ServerError> {
        self.channel.create(data)
    }

    /// Reserves `size` bytes in the storage, and returns a handle over them.
    pub fn empty(&self, size: usize) -> Result<Handle, ServerError> {
        self.channel.empty(size)
    }

    /// Enqueues a fill of every word of the buffer with `value`.
    pub fn fill(&self, handle: &Handle, value: f32) -> Result<(), ServerError> {
        self.channel.fill(handle.clone(), value)
    }

    /// Launches the `kernel` with the given `bindings`, checking shared memory accesses for races.
    pub fn launch(
        &self,
        kernel: Arc<dyn CubeKernel>,
        count: CubeCount,
        dim: CubeDim,
        bindings: Bindings,
    ) -> Result<(), ServerError> {
        self.launch_with_mode(kernel, count, dim, bindings, ExecutionMode::Checked)
    }

    /// Launches the `kernel` with the given `bindings` without race detection.
    ///
    /// Out-of-bounds accesses are still reported.
    pub fn launch_unchecked(
        &self,
        kernel: Arc<dyn CubeKernel>,
        count: CubeCount,
        dim: CubeDim,
        bindings: Bindings,
    ) -> Result<(), ServerError> {
        self.launch_with_mode(kernel, count, dim, bindings, ExecutionMode::Unchecked)
    }

    /// Launches the `kernel` with the given execution mode.
    ///
    /// The launch is asynchronous: launch and execution errors are reported by the next blocking
    /// operation.
    pub fn launch_with_mode(
        &self,
        kernel: Arc<dyn CubeKernel>,
        count: CubeCount,
        dim: CubeDim,
        bindings: Bindings,
        mode: ExecutionMode,
    ) -> Result<(), ServerError> {
        self.channel
            .launch(KernelLaunch::new(kernel, count, dim, bindings, mode))
    }

    /// Executes the `kernel` once in checked mode, recording its memory access pattern.
    ///
    /// Blocks until the execution completed, and reports pending errors first.
    pub fn analyse(
        &self,
        kernel: Arc<dyn CubeKernel>,
        count: CubeCount,
        dim: CubeDim,
        bindings: Bindings,
    ) -> Result<AccessStats, ServerError> {
        self.channel.analyse(KernelLaunch::new(
            kernel,
            count,
            dim,
            bindings,
            ExecutionMode::Checked,
        ))
    }

    /// Wait for the completion of every task in the server.
    pub fn sync(&self) -> DynFut<Result<(), ServerError>> {
        self.channel.sync()
    }

    /// Records an event in the server queue.
    pub fn record_event(&self) -> Result<Event, ServerError> {
        self.channel.timestamp().map(Event::new)
    }

    /// Get the features supported by the compute server.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Get the current memory usage of this client.
    pub fn memory_usage(&self) -> Result<MemoryUsage, ServerError> {
        self.channel.memory_usage()
    }

    /// Ask the server to release the buffers no handle points to anymore.
    pub fn memory_cleanup(&self) -> Result<(), ServerError> {
        self.channel.memory_cleanup()
    }
}
