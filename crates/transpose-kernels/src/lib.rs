#![warn(missing_docs)]

//! Matrix copy and transpose kernels.
//!
//! Every kernel maps one cube to a square tile of the matrix, each unit of the cube covering one
//! column of the tile every [`block_rows`](TileGeometry::block_rows) rows. The kernels only differ
//! by their memory access pattern, which is what the benchmark measures.

#[macro_use]
extern crate derive_new;

mod copy;
mod geometry;
mod transpose;
mod variant;

pub use copy::*;
pub use geometry::*;
pub use transpose::*;
pub use variant::*;

/// Binding of the input matrix.
pub const INPUT: usize = 0;
/// Binding of the output matrix.
pub const OUTPUT: usize = 1;
