use core::{fmt::Display, iter::StepBy, ops::Range};
use thiserror::Error;
use transpose_runtime::prelude::{CubeCount, CubeDim, UnitPos};

/// Edge of the square tile handled by a cube.
pub const TILE_DIM: u32 = 32;
/// Rows of the tile handled by a unit per iteration.
pub const BLOCK_ROWS: u32 = 8;
/// Default number of matrix columns.
pub const NX: u32 = 1024;
/// Default number of matrix rows.
pub const NY: u32 = 1024;

/// An invalid matrix or tile geometry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A dimension is zero.
    #[error("{name} must be greater than zero")]
    ZeroDimension {
        /// Name of the dimension.
        name: &'static str,
    },

    /// A matrix dimension is not a multiple of the tile edge.
    #[error("{name} = {value} is not a multiple of the tile dimension {tile_dim}")]
    NotTileAligned {
        /// Name of the dimension.
        name: &'static str,
        /// Value of the dimension.
        value: u32,
        /// Edge of the tile.
        tile_dim: u32,
    },

    /// The tile edge is not a multiple of the rows per iteration.
    #[error("The tile dimension {tile_dim} is not a multiple of the block rows {block_rows}")]
    BlockRowsMismatch {
        /// Edge of the tile.
        tile_dim: u32,
        /// Rows per iteration.
        block_rows: u32,
    },
}

/// Validated matrix and tile dimensions.
///
/// The matrix holds `ny` rows of `nx` columns, every cube handles one `tile_dim` x `tile_dim`
/// tile with `tile_dim` x `block_rows` units, each unit covering `tile_dim / block_rows` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileGeometry {
    nx: u32,
    ny: u32,
    tile_dim: u32,
    block_rows: u32,
}

impl Default for TileGeometry {
    fn default() -> Self {
        Self {
            nx: NX,
            ny: NY,
            tile_dim: TILE_DIM,
            block_rows: BLOCK_ROWS,
        }
    }
}

impl TileGeometry {
    /// Validates the geometry.
    pub fn new(nx: u32, ny: u32, tile_dim: u32, block_rows: u32) -> Result<Self, ConfigurationError> {
        for (name, value) in [
            ("nx", nx),
            ("ny", ny),
            ("tile_dim", tile_dim),
            ("block_rows", block_rows),
        ] {
            if value == 0 {
                return Err(ConfigurationError::ZeroDimension { name });
            }
        }

        for (name, value) in [("nx", nx), ("ny", ny)] {
            if value % tile_dim != 0 {
                return Err(ConfigurationError::NotTileAligned {
                    name,
                    value,
                    tile_dim,
                });
            }
        }

        if tile_dim % block_rows != 0 {
            return Err(ConfigurationError::BlockRowsMismatch {
                tile_dim,
                block_rows,
            });
        }

        Ok(Self {
            nx,
            ny,
            tile_dim,
            block_rows,
        })
    }

    /// A matrix of the given size with the default tile.
    pub fn with_size(nx: u32, ny: u32) -> Result<Self, ConfigurationError> {
        Self::new(nx, ny, TILE_DIM, BLOCK_ROWS)
    }

    /// Number of columns.
    pub fn nx(&self) -> u32 {
        self.nx
    }

    /// Number of rows.
    pub fn ny(&self) -> u32 {
        self.ny
    }

    /// Edge of a tile.
    pub fn tile_dim(&self) -> u32 {
        self.tile_dim
    }

    /// Rows of a tile handled per iteration.
    pub fn block_rows(&self) -> u32 {
        self.block_rows
    }

    /// One cube per tile.
    pub fn cube_count(&self) -> CubeCount {
        CubeCount::new_2d(self.nx / self.tile_dim, self.ny / self.tile_dim)
    }

    /// One unit per tile column and per row of an iteration.
    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_2d(self.tile_dim, self.block_rows)
    }

    /// Number of matrix elements.
    pub fn num_elems(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Size of the matrix in bytes.
    pub fn size_bytes(&self) -> usize {
        self.num_elems() * size_of::<f32>()
    }

    /// Column and first row of the matrix covered by the unit.
    pub fn unit_origin(&self, pos: &UnitPos) -> (usize, usize) {
        let x = pos.cube_x * self.tile_dim + pos.unit_x;
        let y = pos.cube_y * self.tile_dim + pos.unit_y;
        (x as usize, y as usize)
    }

    /// Same as [unit_origin](Self::unit_origin) in the transposed matrix, the cube coordinates
    /// being swapped.
    pub fn transposed_origin(&self, pos: &UnitPos) -> (usize, usize) {
        let x = pos.cube_y * self.tile_dim + pos.unit_x;
        let y = pos.cube_x * self.tile_dim + pos.unit_y;
        (x as usize, y as usize)
    }

    /// Row offsets `j` iterated by every unit.
    pub fn row_offsets(&self) -> StepBy<Range<usize>> {
        (0..self.tile_dim as usize).step_by(self.block_rows as usize)
    }
}

impl Display for TileGeometry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}x{} matrix, {}x{} tiles, {}x{} units per cube",
            self.nx, self.ny, self.tile_dim, self.tile_dim, self.tile_dim, self.block_rows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn default_launch_dims() {
        let geometry = TileGeometry::default();

        assert_eq!(geometry.cube_count(), CubeCount::new_2d(32, 32));
        assert_eq!(geometry.cube_dim(), CubeDim::new_2d(32, 8));
        assert_eq!(geometry.size_bytes(), 4 * 1024 * 1024);
        assert_eq!(geometry.row_offsets().collect::<Vec<_>>(), vec![0, 8, 16, 24]);
    }

    #[test_log::test]
    fn single_tile() {
        let geometry = TileGeometry::with_size(32, 32).unwrap();

        assert_eq!(geometry.cube_count(), CubeCount::new_single());
        assert_eq!(geometry.cube_dim(), CubeDim::new_2d(32, 8));
    }

    #[test_log::test]
    fn rectangular_matrix() {
        let geometry = TileGeometry::with_size(64, 32).unwrap();

        assert_eq!(geometry.cube_count(), CubeCount::new_2d(2, 1));
        assert_eq!(geometry.num_elems(), 2048);
    }

    #[test_log::test]
    fn launch_covers_every_element_once() {
        let geometry = TileGeometry::new(96, 64, 16, 4).unwrap();
        let count = geometry.cube_count();
        let dim = geometry.cube_dim();
        let mut hits = vec![0u32; geometry.num_elems()];

        for cube_y in 0..count.y {
            for cube_x in 0..count.x {
                for unit_y in 0..dim.y {
                    for unit_x in 0..dim.x {
                        let pos = UnitPos {
                            unit_x,
                            unit_y,
                            unit_z: 0,
                            cube_x,
                            cube_y,
                            cube_z: 0,
                            cube_dim: dim,
                            cube_count: count,
                        };
                        let (x, y) = geometry.unit_origin(&pos);
                        for j in geometry.row_offsets() {
                            hits[(y + j) * geometry.nx() as usize + x] += 1;
                        }
                    }
                }
            }
        }

        assert!(hits.iter().all(|hit| *hit == 1));
    }

    #[test_log::test]
    fn unaligned_width_is_rejected() {
        assert_eq!(
            TileGeometry::with_size(33, 32),
            Err(ConfigurationError::NotTileAligned {
                name: "nx",
                value: 33,
                tile_dim: 32,
            })
        );
    }

    #[test_log::test]
    fn block_rows_must_divide_tile() {
        assert_eq!(
            TileGeometry::new(1024, 1024, 32, 7),
            Err(ConfigurationError::BlockRowsMismatch {
                tile_dim: 32,
                block_rows: 7,
            })
        );
    }

    #[test_log::test]
    fn zero_dimension_is_rejected() {
        assert_eq!(
            TileGeometry::new(1024, 0, 32, 8),
            Err(ConfigurationError::ZeroDimension { name: "ny" })
        );
        assert_eq!(
            TileGeometry::new(1024, 1024, 0, 8),
            Err(ConfigurationError::ZeroDimension { name: "tile_dim" })
        );
    }
}
