use thiserror::Error;
use transpose_kernels::TileGeometry;
use transpose_runtime::prelude::HostBuffer;

/// The initial matrix, the element at linear index `k` holding `k + 1`.
pub fn initial_matrix(geometry: &TileGeometry) -> HostBuffer {
    let nx = geometry.nx() as usize;
    HostBuffer::from_fn(nx, geometry.ny() as usize, |row, col| {
        (row * nx + col + 1) as f32
    })
}

/// Host transpose of a matrix.
pub fn transpose(matrix: &HostBuffer) -> HostBuffer {
    HostBuffer::from_fn(matrix.height(), matrix.width(), |row, col| {
        matrix.get(col, row)
    })
}

/// A mismatching element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Row of the element.
    pub row: usize,
    /// Column of the element.
    pub col: usize,
    /// The reference value.
    pub expected: f32,
    /// The computed value.
    pub actual: f32,
}

/// The output of a kernel differs from the reference.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectnessFailure {
    /// The output does not have the shape of the reference.
    #[error("output shape {actual:?} differs from the reference shape {expected:?}")]
    Shape {
        /// Width and height of the reference.
        expected: (usize, usize),
        /// Width and height of the output.
        actual: (usize, usize),
    },
    /// Some elements differ.
    #[error(
        "{mismatches} mismatching element(s), first at ({}, {}): expected {}, got {}",
        .first.row,
        .first.col,
        .first.expected,
        .first.actual
    )]
    Values {
        /// Number of mismatching elements.
        mismatches: usize,
        /// The first mismatching element in row-major order.
        first: Mismatch,
    },
}

/// Compares the output with the reference element by element, exactly.
pub fn verify(actual: &HostBuffer, expected: &HostBuffer) -> Result<(), CorrectnessFailure> {
    let shape = |buffer: &HostBuffer| (buffer.width(), buffer.height());
    if shape(actual) != shape(expected) {
        return Err(CorrectnessFailure::Shape {
            expected: shape(expected),
            actual: shape(actual),
        });
    }

    let width = expected.width();
    let mut mismatches = 0;
    let mut first = None;

    for (index, (actual, expected)) in actual
        .as_slice()
        .iter()
        .zip(expected.as_slice())
        .enumerate()
    {
        if actual != expected {
            mismatches += 1;
            first.get_or_insert(Mismatch {
                row: index / width,
                col: index % width,
                expected: *expected,
                actual: *actual,
            });
        }
    }

    match first {
        Some(first) => Err(CorrectnessFailure::Values { mismatches, first }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn initial_values_follow_linear_index() {
        let geometry = TileGeometry::with_size(64, 32).unwrap();
        let matrix = initial_matrix(&geometry);

        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(0, 63), 64.0);
        assert_eq!(matrix.get(1, 0), 65.0);
        assert_eq!(matrix.get(31, 63), 2048.0);
    }

    #[test_log::test]
    fn transpose_swaps_rows_and_columns() {
        let matrix = HostBuffer::from_fn(3, 2, |row, col| (row * 3 + col) as f32);
        let transposed = transpose(&matrix);

        assert_eq!((transposed.width(), transposed.height()), (2, 3));
        assert_eq!(transposed.as_slice(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(transpose(&transposed), matrix);
    }

    #[test_log::test]
    fn verify_reports_first_mismatch() {
        let expected = HostBuffer::from_fn(4, 4, |row, col| (row * 4 + col) as f32);
        let mut actual = expected.clone();
        actual.as_mut_slice()[6] = -1.0;
        actual.as_mut_slice()[9] = -1.0;

        assert_eq!(verify(&expected, &expected), Ok(()));
        assert_eq!(
            verify(&actual, &expected),
            Err(CorrectnessFailure::Values {
                mismatches: 2,
                first: Mismatch {
                    row: 1,
                    col: 2,
                    expected: 6.0,
                    actual: -1.0,
                },
            })
        );
    }

    #[test_log::test]
    fn sentinel_is_a_mismatch() {
        let expected = HostBuffer::filled(2, 2, 1.0);
        let actual = HostBuffer::filled(2, 2, -1.0);

        match verify(&actual, &expected) {
            Err(CorrectnessFailure::Values { mismatches, .. }) => assert_eq!(mismatches, 4),
            result => panic!("Unexpected result {result:?}"),
        }
    }

    #[test_log::test]
    fn smaller_output_is_a_shape_failure() {
        let expected = HostBuffer::filled(4, 4, 1.0);
        let actual = HostBuffer::filled(2, 2, 1.0);

        assert_eq!(
            verify(&actual, &expected),
            Err(CorrectnessFailure::Shape {
                expected: (4, 4),
                actual: (2, 2),
            })
        );
    }

    #[test_log::test]
    fn same_length_with_swapped_dimensions_is_a_shape_failure() {
        let expected = HostBuffer::filled(64, 32, 1.0);
        let actual = HostBuffer::filled(32, 64, 1.0);

        assert!(matches!(
            verify(&actual, &expected),
            Err(CorrectnessFailure::Shape { .. })
        ));
    }
}
