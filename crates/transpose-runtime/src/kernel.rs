use crate::{
    config::{GlobalConfig, TypeNameFormatLevel, type_name_format},
    scope::CubeScope,
    server::{CubeCount, CubeDim},
};
use core::fmt::Display;

/// A kernel executed by every unit of every cube of a launch.
///
/// The body receives the whole cube at once: it runs the units of each stage through
/// [`CubeScope::for_each_unit`] and separates stages with [`CubeScope::sync_cube`], the same way
/// a cube barrier separates the phases of a SIMT kernel.
pub trait CubeKernel: Send + Sync + 'static {
    /// Name of the kernel, used for logging and profiling.
    fn name(&self) -> String {
        let level = match GlobalConfig::get().profiling.logger.level {
            crate::config::ProfilingLogLevel::Full => TypeNameFormatLevel::Full,
            _ => TypeNameFormatLevel::Short,
        };
        type_name_format(core::any::type_name::<Self>(), level)
    }

    /// Number of shared memory words each cube allocates.
    fn shared_memory_len(&self) -> usize {
        0
    }

    /// Executes a single cube.
    fn execute(&self, cube: &mut CubeScope<'_>);
}

/// Position of a unit within the launch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitPos {
    /// Position of the unit in its cube on the x axis.
    pub unit_x: u32,
    /// Position of the unit in its cube on the y axis.
    pub unit_y: u32,
    /// Position of the unit in its cube on the z axis.
    pub unit_z: u32,
    /// Position of the cube in the grid on the x axis.
    pub cube_x: u32,
    /// Position of the cube in the grid on the y axis.
    pub cube_y: u32,
    /// Position of the cube in the grid on the z axis.
    pub cube_z: u32,
    /// Units per cube.
    pub cube_dim: CubeDim,
    /// Cubes per launch.
    pub cube_count: CubeCount,
}

impl UnitPos {
    /// Linear index of the unit in its cube, x varying fastest.
    pub fn unit_linear(&self) -> u32 {
        self.unit_x + self.unit_y * self.cube_dim.x + self.unit_z * self.cube_dim.x * self.cube_dim.y
    }

    /// Linear index of the cube in the grid, x varying fastest.
    pub fn cube_linear(&self) -> u64 {
        self.cube_x as u64
            + self.cube_y as u64 * self.cube_count.x as u64
            + self.cube_z as u64 * self.cube_count.x as u64 * self.cube_count.y as u64
    }

    /// Position of the unit in the whole grid on the x axis.
    pub fn absolute_x(&self) -> u32 {
        self.cube_x * self.cube_dim.x + self.unit_x
    }

    /// Position of the unit in the whole grid on the y axis.
    pub fn absolute_y(&self) -> u32 {
        self.cube_y * self.cube_dim.y + self.unit_y
    }
}

impl Display for UnitPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "unit ({}, {}, {}) of cube ({}, {}, {})",
            self.unit_x, self.unit_y, self.unit_z, self.cube_x, self.cube_y, self.cube_z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(unit: (u32, u32), cube: (u32, u32)) -> UnitPos {
        UnitPos {
            unit_x: unit.0,
            unit_y: unit.1,
            unit_z: 0,
            cube_x: cube.0,
            cube_y: cube.1,
            cube_z: 0,
            cube_dim: CubeDim::new_2d(32, 8),
            cube_count: CubeCount::new_2d(4, 2),
        }
    }

    #[test]
    fn linear_indices_vary_x_fastest() {
        let pos = pos((3, 2), (1, 1));

        assert_eq!(pos.unit_linear(), 67);
        assert_eq!(pos.cube_linear(), 5);
        assert_eq!(pos.absolute_x(), 35);
        assert_eq!(pos.absolute_y(), 10);
    }

    #[test]
    fn display_names_unit_and_cube() {
        assert_eq!(pos((1, 2), (3, 4)).to_string(), "unit (1, 2, 0) of cube (3, 4, 0)");
    }
}
