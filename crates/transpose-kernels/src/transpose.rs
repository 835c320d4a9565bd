use crate::{INPUT, OUTPUT, geometry::TileGeometry};
use transpose_runtime::prelude::{CubeKernel, CubeScope};

/// Transposes the matrix straight from global memory.
///
/// Reads are coalesced, but consecutive units write `ny` words apart.
#[derive(new, Debug, Clone, Copy)]
pub struct TransposeNaive {
    geometry: TileGeometry,
}

impl CubeKernel for TransposeNaive {
    fn name(&self) -> String {
        "transpose_naive".into()
    }

    fn execute(&self, cube: &mut CubeScope<'_>) {
        let geometry = self.geometry;
        let nx = geometry.nx() as usize;
        let ny = geometry.ny() as usize;

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.unit_origin(unit.pos());
            for j in geometry.row_offsets() {
                let value = unit.load(INPUT, (y + j) * nx + x);
                unit.store(OUTPUT, x * ny + (y + j), value);
            }
        });
    }
}

/// Transposes the matrix through a tile of shared memory, so both the reads and the writes of
/// global memory are coalesced.
///
/// The tile is read column-wise: with a row stride equal to the tile edge every word of a column
/// lands in the same bank. Padding each row with extra words shifts consecutive rows to distinct
/// banks.
#[derive(Debug, Clone, Copy)]
pub struct TiledTranspose {
    geometry: TileGeometry,
    padding: u32,
}

impl TiledTranspose {
    /// Tiled transpose with unpadded rows.
    pub fn coalesced(geometry: TileGeometry) -> Self {
        Self {
            geometry,
            padding: 0,
        }
    }

    /// Tiled transpose with rows padded by one word.
    pub fn no_bank_conflicts(geometry: TileGeometry) -> Self {
        Self {
            geometry,
            padding: 1,
        }
    }

    /// Distance in words between two rows of the tile.
    pub fn row_stride(&self) -> usize {
        (self.geometry.tile_dim() + self.padding) as usize
    }
}

impl CubeKernel for TiledTranspose {
    fn name(&self) -> String {
        match self.padding {
            0 => "transpose_coalesced".into(),
            _ => "transpose_no_bank_conflicts".into(),
        }
    }

    fn shared_memory_len(&self) -> usize {
        self.geometry.tile_dim() as usize * self.row_stride()
    }

    fn execute(&self, cube: &mut CubeScope<'_>) {
        let geometry = self.geometry;
        let nx = geometry.nx() as usize;
        let ny = geometry.ny() as usize;
        let stride = self.row_stride();

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.unit_origin(unit.pos());
            let (tx, ty) = (unit.pos().unit_x as usize, unit.pos().unit_y as usize);
            for j in geometry.row_offsets() {
                let value = unit.load(INPUT, (y + j) * nx + x);
                unit.store_shared((ty + j) * stride + tx, value);
            }
        });

        cube.sync_cube();

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.transposed_origin(unit.pos());
            let (tx, ty) = (unit.pos().unit_x as usize, unit.pos().unit_y as usize);
            for j in geometry.row_offsets() {
                let value = unit.load_shared(tx * stride + ty + j);
                unit.store(OUTPUT, (y + j) * ny + x, value);
            }
        });
    }
}
