use crate::{
    analysis::AccessStats,
    kernel::CubeKernel,
    scope::KernelFault,
    storage::MemoryUsage,
};
use core::fmt::Debug;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use thiserror::Error;

mod handle;

pub use handle::*;

/// Errors raised while moving data in or out of device memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// The handle doesn't point to live device memory.
    #[error("The handle {0} doesn't point to live device memory")]
    InvalidHandle(HandleId),

    /// The buffer size isn't a whole number of words.
    #[error("Buffer of {size} bytes isn't a multiple of the {word_size} bytes word size")]
    UnalignedSize {
        /// The provided size in bytes.
        size: usize,
        /// The word size in bytes.
        word_size: usize,
    },

    /// The device is out of memory.
    #[error("Can't allocate {requested} bytes, {available} bytes are available")]
    OutOfMemory {
        /// The requested size in bytes.
        requested: u64,
        /// The remaining device memory in bytes.
        available: u64,
    },

    /// The host data doesn't match the requested matrix shape.
    #[error("Expected {expected} elements, got {actual}")]
    ShapeMismatch {
        /// The number of elements of the shape.
        expected: usize,
        /// The number of elements provided.
        actual: usize,
    },
}

/// Resource limit errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    /// Shared memory exceeds maximum
    #[error(
        "Too much shared memory requested.\nRequested {requested} bytes, maximum {max} bytes available."
    )]
    SharedMemory {
        /// Value requested
        requested: usize,
        /// Maximum value
        max: usize,
    },
    /// Total units exceeds maximum
    #[error("Total unit count exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    Units {
        /// Requested value
        requested: u32,
        /// Maximum value
        max: u32,
    },
    /// `CubeCount` exceeds maximum
    #[error("Cube count exceeds maximum bounds.\nRequested {requested:?}, max is {max:?}.")]
    CubeCount {
        /// Requested value
        requested: (u32, u32, u32),
        /// Maximum value
        max: (u32, u32, u32),
    },
}

/// Kernel launch errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The launch doesn't contain any unit.
    #[error("Can't launch `{kernel}` with an empty grid: cube count {count:?}, cube dim {dim:?}")]
    EmptyLaunch {
        /// The kernel name.
        kernel: String,
        /// The requested cube count.
        count: CubeCount,
        /// The requested cube dim.
        dim: CubeDim,
    },

    /// Too many resources were requested
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// A binding can't be resolved.
    #[error("An io error happened during launch\nCaused by:\n  {0}")]
    Io(#[from] IoError),
}

/// Errors reported by the compute server.
///
/// Launches are asynchronous, so errors happening while executing them are reported by the next
/// blocking operation: a read, a sync, an event synchronization or an analysed launch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// A launch error.
    #[error("A launch error happened\nCaused by:\n  {0}")]
    Launch(#[from] LaunchError),

    /// An io error.
    #[error("An io error happened\nCaused by:\n  {0}")]
    Io(#[from] IoError),

    /// A kernel faulted while executing.
    #[error("Kernel `{kernel}` faulted during execution\nCaused by:\n  {fault}")]
    Execution {
        /// The kernel name.
        kernel: String,
        /// The first fault raised by the kernel.
        fault: KernelFault,
    },

    /// The server thread is gone.
    #[error("The compute server is disconnected")]
    Disconnected,
}

/// The bindings of a launch, in the order the kernel addresses them.
pub type Bindings = Vec<Handle>;

/// A kernel launch request.
#[derive(new, Clone)]
pub struct KernelLaunch {
    /// The kernel to execute.
    pub kernel: Arc<dyn CubeKernel>,
    /// The number of cubes on each axis.
    pub count: CubeCount,
    /// The number of units per cube on each axis.
    pub dim: CubeDim,
    /// The global memory bindings.
    pub bindings: Bindings,
    /// Whether the execution is checked for shared memory hazards.
    pub mode: ExecutionMode,
}

impl Debug for KernelLaunch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KernelLaunch")
            .field("kernel", &self.kernel.name())
            .field("count", &self.count)
            .field("dim", &self.dim)
            .field("bindings", &self.bindings)
            .field("mode", &self.mode)
            .finish()
    }
}

/// The compute server is responsible for handling resources and computations over resources.
///
/// Everything in the server is mutable, therefore it should be solely accessed through the
/// [compute client](crate::client::ComputeClient) for thread safety.
pub trait ComputeServer: Send + Debug + 'static
where
    Self: Sized,
{
    /// Given bytes, allocates device memory holding them.
    fn create(&mut self, data: &[u8]) -> Result<Handle, ServerError>;

    /// Reserves `size` bytes of device memory, zero initialized.
    fn empty(&mut self, size: usize) -> Result<Handle, ServerError>;

    /// Sets every word of the buffer to `value`.
    fn fill(&mut self, handle: Handle, value: f32);

    /// Given handles, returns the owned resources as bytes.
    fn read(&mut self, handles: Vec<Handle>) -> Result<Vec<Vec<u8>>, ServerError>;

    /// Executes the kernel over the given bindings.
    ///
    /// Kernels have mutable access to every resource they are given and are responsible of
    /// determining which should be read or written.
    fn launch(&mut self, launch: KernelLaunch);

    /// Executes the kernel once while recording its memory access pattern.
    fn analyse(&mut self, launch: KernelLaunch) -> Result<AccessStats, ServerError>;

    /// Wait for the completion of every task in the server, reporting pending errors.
    fn sync(&mut self) -> Result<(), ServerError>;

    /// Stamps the point the server reached in its queue.
    fn timestamp(&mut self) -> Result<Instant, ServerError>;

    /// The current memory usage of the server.
    fn memory_usage(&mut self) -> MemoryUsage;

    /// Ask the server to release memory that it can release.
    fn memory_cleanup(&mut self);
}

/// Specifies the number of cubes to be dispatched for a kernel.
///
/// This translates to eg. a grid for CUDA, or to `num_workgroups` for wgsl.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct CubeCount {
    /// The number of cubes in the x axis.
    pub x: u32,
    /// The number of cubes in the y axis.
    pub y: u32,
    /// The number of cubes in the z axis.
    pub z: u32,
}

impl CubeCount {
    /// Create a new cube count with x = y = z = 1.
    pub const fn new_single() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }

    /// Create a new cube count with the given x, and y = z = 1.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Create a new cube count with the given x and y, and z = 1.
    pub const fn new_2d(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Create a new cube count with the given x, y and z.
    pub const fn new_3d(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of cubes.
    pub const fn num_cubes(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl From<(u32, u32, u32)> for CubeCount {
    fn from(value: (u32, u32, u32)) -> Self {
        CubeCount::new_3d(value.0, value.1, value.2)
    }
}

impl From<CubeCount> for (u32, u32, u32) {
    fn from(val: CubeCount) -> Self {
        (val.x, val.y, val.z)
    }
}

/// The number of units across all 3 axis totalling to the number of working units in a cube.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct CubeDim {
    /// The number of units in the x axis.
    pub x: u32,
    /// The number of units in the y axis.
    pub y: u32,
    /// The number of units in the z axis.
    pub z: u32,
}

impl CubeDim {
    /// Create a new cube dim with x = y = z = 1.
    pub const fn new_single() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }

    /// Create a new cube dim with the given x, and y = z = 1.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Create a new cube dim with the given x and y, and z = 1.
    pub const fn new_2d(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Create a new cube dim with the given x, y and z.
    pub const fn new_3d(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total numbers of units per cube
    pub const fn num_elems(&self) -> u32 {
        self.x * self.y * self.z
    }
}

impl From<(u32, u32, u32)> for CubeDim {
    fn from(value: (u32, u32, u32)) -> Self {
        CubeDim::new_3d(value.0, value.1, value.2)
    }
}

impl From<CubeDim> for (u32, u32, u32) {
    fn from(val: CubeDim) -> Self {
        (val.x, val.y, val.z)
    }
}

/// The kind of execution to be performed.
#[derive(Default, Hash, PartialEq, Eq, Clone, Debug, Copy, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Shared memory accesses are checked for races between units of a cube.
    #[default]
    Checked,
    /// Only out-of-bounds accesses are detected.
    Unchecked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn cube_count_num_cubes() {
        assert_eq!(CubeCount::new_2d(32, 32).num_cubes(), 1024);
        assert_eq!(CubeCount::new_3d(u32::MAX, 2, 1).num_cubes(), u32::MAX as u64 * 2);
    }

    #[test_log::test]
    fn cube_dim_num_elems() {
        assert_eq!(CubeDim::new_2d(32, 8).num_elems(), 256);
        assert_eq!(CubeDim::from((4, 2, 3)), CubeDim::new_3d(4, 2, 3));
    }
}
