use crate::{
    client::ComputeClient,
    server::{ComputeServer, Handle, IoError, ServerError},
    storage::WORD_SIZE,
};

/// A row-major matrix of `f32` in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBuffer {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl HostBuffer {
    /// Wraps `data` as a `width` x `height` matrix.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, IoError> {
        if data.len() != width * height {
            return Err(IoError::ShapeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A matrix with every element set to `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// A matrix with the element at (`row`, `col`) set to `func(row, col)`.
    pub fn from_fn<F: FnMut(usize, usize) -> f32>(width: usize, height: usize, mut func: F) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                data.push(func(row, col));
            }
        }

        Self {
            data,
            width,
            height,
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The element at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// The elements in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the elements in row-major order.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Size of the matrix in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * WORD_SIZE
    }

    /// Copies the matrix to device memory.
    pub fn upload<S: ComputeServer>(
        &self,
        client: &ComputeClient<S>,
    ) -> Result<DeviceBuffer, ServerError> {
        let handle = client.create(bytemuck::cast_slice(&self.data))?;

        Ok(DeviceBuffer {
            handle,
            width: self.width,
            height: self.height,
        })
    }
}

/// A row-major matrix of `f32` in device memory.
///
/// The memory is released once every clone of the handle is dropped and the server cleans up.
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    handle: Handle,
    width: usize,
    height: usize,
}

impl DeviceBuffer {
    /// Reserves a zeroed `width` x `height` matrix.
    pub fn empty<S: ComputeServer>(
        client: &ComputeClient<S>,
        width: usize,
        height: usize,
    ) -> Result<Self, ServerError> {
        let handle = client.empty(width * height * WORD_SIZE)?;

        Ok(Self {
            handle,
            width,
            height,
        })
    }

    /// Enqueues a fill of every element with `value`.
    pub fn fill<S: ComputeServer>(
        &self,
        client: &ComputeClient<S>,
        value: f32,
    ) -> Result<(), ServerError> {
        client.fill(&self.handle, value)
    }

    /// Copies the matrix back to host memory, once every enqueued task completed.
    pub fn download<S: ComputeServer>(
        &self,
        client: &ComputeClient<S>,
    ) -> Result<HostBuffer, ServerError> {
        let bytes = client.read_one(self.handle.clone())?;
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);

        Ok(HostBuffer::new(self.width, self.height, data)?)
    }

    /// The handle to bind to a kernel launch.
    pub fn binding(&self) -> Handle {
        self.handle.clone()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CpuRuntime, RuntimeOptions};
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn from_fn_is_row_major() {
        let matrix = HostBuffer::from_fn(3, 2, |row, col| (row * 10 + col) as f32);

        assert_eq!(matrix.as_slice(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(matrix.get(1, 2), 12.0);
    }

    #[test_log::test]
    fn shape_mismatch() {
        assert_eq!(
            HostBuffer::new(2, 2, vec![0.0; 3]),
            Err(IoError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test_log::test]
    fn upload_fill_download() {
        let client = CpuRuntime::create_client(RuntimeOptions {
            num_workers: Some(1),
            ..Default::default()
        });
        let host = HostBuffer::from_fn(4, 2, |row, col| (row * 4 + col + 1) as f32);

        let device = host.upload(&client).unwrap();
        assert_eq!(device.download(&client).unwrap(), host);

        device.fill(&client, -1.0).unwrap();
        assert_eq!(device.download(&client).unwrap(), HostBuffer::filled(4, 2, -1.0));
    }
}
