use core::fmt::Display;

/// Limits and layout of the hardware a client executes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareProperties {
    /// Number of units executing in lockstep, grouped for memory access analysis.
    pub plane_size: u32,
    /// Number of shared memory banks, each one word wide.
    pub shared_memory_banks: u32,
    /// Maximum number of units in a single cube.
    pub max_units_per_cube: u32,
    /// Maximum amount of shared memory a cube can allocate, in bytes.
    pub max_shared_memory_size: usize,
    /// Maximum number of cubes on each axis of a launch.
    pub max_cube_count: (u32, u32, u32),
    /// Maximum amount of device memory, in bytes.
    pub max_memory_size: u64,
    /// Number of worker threads cubes are distributed over.
    pub num_workers: usize,
}

impl Default for HardwareProperties {
    fn default() -> Self {
        Self {
            plane_size: 32,
            shared_memory_banks: 32,
            max_units_per_cube: 1024,
            max_shared_memory_size: 48 * 1024,
            max_cube_count: (i32::MAX as u32, u16::MAX as u32, u16::MAX as u32),
            max_memory_size: u64::MAX,
            num_workers: 1,
        }
    }
}

/// Properties of the device a client is bound to, as returned by the device-capability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Human readable device name.
    pub name: String,
    /// Hardware limits.
    pub hardware: HardwareProperties,
}

impl DeviceProperties {
    /// Create new device properties.
    pub fn new(name: impl Into<String>, hardware: HardwareProperties) -> Self {
        Self {
            name: name.into(),
            hardware,
        }
    }
}

impl Display for DeviceProperties {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let hw = &self.hardware;
        write!(
            f,
            "{} ({} workers, plane size {}, {} banks, {} bytes shared memory per cube)",
            self.name,
            hw.num_workers,
            hw.plane_size,
            hw.shared_memory_banks,
            hw.max_shared_memory_size
        )
    }
}
