use crate::{
    copy::{CopyKernel, CopySharedMemory},
    geometry::TileGeometry,
    transpose::{TiledTranspose, TransposeNaive},
};
use core::fmt::Display;
use std::sync::Arc;
use transpose_runtime::prelude::CubeKernel;

/// What the output of a kernel must equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expected {
    /// The input matrix.
    Identity,
    /// The transpose of the input matrix.
    Transpose,
}

/// The kernels compared by the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    /// See [CopyKernel].
    Copy,
    /// See [CopySharedMemory].
    CopySharedMemory,
    /// See [TransposeNaive].
    TransposeNaive,
    /// See [TiledTranspose::coalesced].
    TransposeCoalesced,
    /// See [TiledTranspose::no_bank_conflicts].
    TransposeNoBankConflicts,
}

impl KernelVariant {
    /// Every variant, in benchmark order.
    pub const ALL: [KernelVariant; 5] = [
        KernelVariant::Copy,
        KernelVariant::CopySharedMemory,
        KernelVariant::TransposeNaive,
        KernelVariant::TransposeCoalesced,
        KernelVariant::TransposeNoBankConflicts,
    ];

    /// Name shown in reports.
    pub fn name(&self) -> &'static str {
        match self {
            KernelVariant::Copy => "copy",
            KernelVariant::CopySharedMemory => "shared memory copy",
            KernelVariant::TransposeNaive => "naive transpose",
            KernelVariant::TransposeCoalesced => "coalesced transpose",
            KernelVariant::TransposeNoBankConflicts => "conflict-free transpose",
        }
    }

    /// What the output of the variant must equal.
    pub fn expected(&self) -> Expected {
        match self {
            KernelVariant::Copy | KernelVariant::CopySharedMemory => Expected::Identity,
            _ => Expected::Transpose,
        }
    }

    /// The kernel implementing the variant for the given geometry.
    pub fn kernel(&self, geometry: TileGeometry) -> Arc<dyn CubeKernel> {
        match self {
            KernelVariant::Copy => Arc::new(CopyKernel::new(geometry)),
            KernelVariant::CopySharedMemory => Arc::new(CopySharedMemory::new(geometry)),
            KernelVariant::TransposeNaive => Arc::new(TransposeNaive::new(geometry)),
            KernelVariant::TransposeCoalesced => Arc::new(TiledTranspose::coalesced(geometry)),
            KernelVariant::TransposeNoBankConflicts => {
                Arc::new(TiledTranspose::no_bank_conflicts(geometry))
            }
        }
    }
}

impl Display for KernelVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
