use crate::{INPUT, OUTPUT, geometry::TileGeometry};
use transpose_runtime::prelude::{CubeKernel, CubeScope};

/// Copies the matrix element by element, reads and writes being coalesced.
///
/// Its bandwidth is the upper bound every transpose is measured against.
#[derive(new, Debug, Clone, Copy)]
pub struct CopyKernel {
    geometry: TileGeometry,
}

impl CubeKernel for CopyKernel {
    fn name(&self) -> String {
        "copy".into()
    }

    fn execute(&self, cube: &mut CubeScope<'_>) {
        let geometry = self.geometry;
        let nx = geometry.nx() as usize;

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.unit_origin(unit.pos());
            for j in geometry.row_offsets() {
                let index = (y + j) * nx + x;
                let value = unit.load(INPUT, index);
                unit.store(OUTPUT, index, value);
            }
        });
    }
}

/// Copies the matrix through a tile of shared memory.
///
/// Every unit reads back the words it wrote, so the barrier only separates the two stages.
#[derive(new, Debug, Clone, Copy)]
pub struct CopySharedMemory {
    geometry: TileGeometry,
}

impl CubeKernel for CopySharedMemory {
    fn name(&self) -> String {
        "copy_shared_memory".into()
    }

    fn shared_memory_len(&self) -> usize {
        let tile_dim = self.geometry.tile_dim() as usize;
        tile_dim * tile_dim
    }

    fn execute(&self, cube: &mut CubeScope<'_>) {
        let geometry = self.geometry;
        let nx = geometry.nx() as usize;
        let tile_dim = geometry.tile_dim() as usize;

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.unit_origin(unit.pos());
            let (tx, ty) = (unit.pos().unit_x as usize, unit.pos().unit_y as usize);
            for j in geometry.row_offsets() {
                let value = unit.load(INPUT, (y + j) * nx + x);
                unit.store_shared((ty + j) * tile_dim + tx, value);
            }
        });

        cube.sync_cube();

        cube.for_each_unit(|unit| {
            let (x, y) = geometry.unit_origin(unit.pos());
            let (tx, ty) = (unit.pos().unit_x as usize, unit.pos().unit_y as usize);
            for j in geometry.row_offsets() {
                let value = unit.load_shared((ty + j) * tile_dim + tx);
                unit.store(OUTPUT, (y + j) * nx + x, value);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{analyse, initial_matrix, run};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test_log::test]
    fn copy_is_identity() {
        let geometry = TileGeometry::with_size(64, 32).unwrap();
        let input = initial_matrix(&geometry);

        let output = run(Arc::new(CopyKernel::new(geometry)), &geometry, &input);

        assert_eq!(output, input.as_slice());
    }

    #[test_log::test]
    fn shared_memory_copy_is_identity() {
        let geometry = TileGeometry::with_size(64, 96).unwrap();
        let input = initial_matrix(&geometry);

        let output = run(Arc::new(CopySharedMemory::new(geometry)), &geometry, &input);

        assert_eq!(output, input.as_slice());
    }

    #[test_log::test]
    fn copy_accesses_are_coalesced() {
        let geometry = TileGeometry::with_size(32, 32).unwrap();

        let stats = analyse(Arc::new(CopyKernel::new(geometry)), &geometry);

        // 8 planes, 4 rows each, one 32 words row per request.
        assert_eq!(stats.global_load_requests, 32);
        assert_eq!(stats.global_load_sectors, 128);
        assert_eq!(stats.global_store_requests, 32);
        assert_eq!(stats.global_store_sectors, 128);
        assert_eq!(stats.shared_requests, 0);
    }

    #[test_log::test]
    fn shared_memory_copy_is_conflict_free() {
        let geometry = TileGeometry::with_size(32, 32).unwrap();

        let stats = analyse(Arc::new(CopySharedMemory::new(geometry)), &geometry);

        assert_eq!(stats.shared_requests, 64);
        assert_eq!(stats.shared_wavefronts, 64);
        assert_eq!(stats.bank_conflicts, 0);
        assert_eq!(stats.sectors_per_load(), 4.0);
    }
}
