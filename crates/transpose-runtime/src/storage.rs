use crate::server::{Handle, HandleId, IoError};
use core::{
    fmt::Display,
    sync::atomic::{AtomicU32, Ordering},
};
use hashbrown::HashMap;
use std::sync::Arc;

/// Size in bytes of a single word of device memory.
pub const WORD_SIZE: usize = size_of::<f32>();

/// A buffer of device memory, stored as the bit patterns of `f32` words.
///
/// Atomic words let every worker thread write its cubes' outputs concurrently. Relaxed ordering is
/// enough since the scheduler joins every worker before the host can observe the buffer.
#[derive(Debug, Clone)]
pub struct WordResource {
    words: Arc<[AtomicU32]>,
}

impl WordResource {
    /// Allocates `len` zeroed words.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Allocates a resource holding the given bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, IoError> {
        if data.len() % WORD_SIZE != 0 {
            return Err(IoError::UnalignedSize {
                size: data.len(),
                word_size: WORD_SIZE,
            });
        }

        let words: Vec<u32> = bytemuck::pod_collect_to_vec(data);

        Ok(Self {
            words: words.into_iter().map(AtomicU32::new).collect(),
        })
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the resource holds no word.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Reads the word at `index`, `None` when out of bounds.
    pub fn load(&self, index: usize) -> Option<f32> {
        self.words
            .get(index)
            .map(|word| f32::from_bits(word.load(Ordering::Relaxed)))
    }

    /// Writes the word at `index`, returns false when out of bounds.
    pub fn store(&self, index: usize, value: f32) -> bool {
        match self.words.get(index) {
            Some(word) => {
                word.store(value.to_bits(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Sets every word to `value`.
    pub fn fill(&self, value: f32) {
        let bits = value.to_bits();
        for word in self.words.iter() {
            word.store(bits, Ordering::Relaxed);
        }
    }

    /// Copies the resource into bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let words: Vec<u32> = self
            .words
            .iter()
            .map(|word| word.load(Ordering::Relaxed))
            .collect();

        bytemuck::cast_slice(&words).to_vec()
    }
}

/// Current memory usage of a storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// The number of live allocations.
    pub number_allocs: u64,
    /// The number of bytes held by live allocations.
    pub bytes_in_use: u64,
}

impl Display for MemoryUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Memory Usage Report:")?;
        writeln!(f, "  Number of allocations: {}", self.number_allocs)?;
        write!(f, "  Bytes in use: {}", bytes_format(self.bytes_in_use))
    }
}

fn bytes_format(bytes: u64) -> String {
    let unit = 1000;

    if bytes < unit {
        format!("{bytes} B")
    } else {
        let size = bytes as f64;
        let exp = match size.log(1000.0).floor() as usize {
            0 => 1,
            e => e,
        };
        let unit_prefix = "KMGTPEZY".as_bytes();
        format!(
            "{:.2} {}B",
            size / unit.pow(exp as u32) as f64,
            unit_prefix[exp - 1] as char,
        )
    }
}

/// Keeps track of the device buffers, keyed by handle id.
#[derive(Debug)]
pub struct WordStorage {
    resources: HashMap<HandleId, WordResource>,
    max_memory: u64,
}

impl WordStorage {
    /// Creates a storage that can hold at most `max_memory` bytes.
    pub fn new(max_memory: u64) -> Self {
        Self {
            resources: HashMap::new(),
            max_memory,
        }
    }

    fn available(&self) -> u64 {
        self.max_memory.saturating_sub(self.usage().bytes_in_use)
    }

    /// Makes sure `size` bytes fit in the remaining memory, releasing dropped handles if needed.
    fn reserve(&mut self, size: u64) -> Result<(), IoError> {
        let mut available = self.available();

        if size > available && self.cleanup() > 0 {
            available = self.available();
        }

        if size > available {
            return Err(IoError::OutOfMemory {
                requested: size,
                available,
            });
        }

        Ok(())
    }

    fn insert(&mut self, resource: WordResource) -> Handle {
        let size = (resource.len() * WORD_SIZE) as u64;
        let id = HandleId::new();
        self.resources.insert(id.clone(), resource);

        Handle::new(id, size)
    }

    /// Registers a resource and returns the handle pointing to it.
    pub fn register(&mut self, resource: WordResource) -> Result<Handle, IoError> {
        self.reserve((resource.len() * WORD_SIZE) as u64)?;

        Ok(self.insert(resource))
    }

    /// Allocates `size` zeroed bytes.
    ///
    /// The size is checked against the remaining memory before anything is allocated.
    pub fn alloc(&mut self, size: usize) -> Result<Handle, IoError> {
        if size % WORD_SIZE != 0 {
            return Err(IoError::UnalignedSize {
                size,
                word_size: WORD_SIZE,
            });
        }

        self.reserve(size as u64)?;

        Ok(self.insert(WordResource::zeroed(size / WORD_SIZE)))
    }

    /// Gets the resource a handle points to.
    pub fn get(&self, handle: &Handle) -> Result<WordResource, IoError> {
        self.resources
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| IoError::InvalidHandle(handle.id.clone()))
    }

    /// Releases every resource no handle points to anymore.
    ///
    /// Returns the number of released resources.
    pub fn cleanup(&mut self) -> usize {
        let before = self.resources.len();
        self.resources.retain(|id, _| !id.is_free());
        before - self.resources.len()
    }

    /// Current memory usage.
    pub fn usage(&self) -> MemoryUsage {
        self.resources.values().fold(MemoryUsage::default(), |usage, resource| MemoryUsage {
            number_allocs: usage.number_allocs + 1,
            bytes_in_use: usage.bytes_in_use + (resource.len() * WORD_SIZE) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn resource_round_trips_bytes() {
        let values = [1.0f32, -1.0, 3.5];
        let resource = WordResource::from_bytes(bytemuck::cast_slice(&values)).unwrap();

        assert_eq!(resource.load(1), Some(-1.0));
        assert_eq!(resource.load(3), None);
        assert!(!resource.store(3, 0.0));

        let bytes = resource.to_bytes();
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&bytes), values);
    }

    #[test_log::test]
    fn unaligned_bytes_are_rejected() {
        let result = WordResource::from_bytes(&[0u8; 6]);

        assert_eq!(
            result.unwrap_err(),
            IoError::UnalignedSize {
                size: 6,
                word_size: 4
            }
        );
    }

    #[test_log::test]
    fn cleanup_releases_dropped_handles() {
        let mut storage = WordStorage::new(u64::MAX);
        let kept = storage.alloc(64).unwrap();
        let dropped = storage.alloc(128).unwrap();

        assert_eq!(storage.usage().bytes_in_use, 192);
        drop(dropped);
        assert_eq!(storage.cleanup(), 1);
        assert_eq!(
            storage.usage(),
            MemoryUsage {
                number_allocs: 1,
                bytes_in_use: 64
            }
        );
        assert!(storage.get(&kept).is_ok());
    }

    #[test_log::test]
    fn alloc_fails_past_max_memory() {
        let mut storage = WordStorage::new(100);
        let _first = storage.alloc(64).unwrap();

        assert_eq!(
            storage.alloc(64).unwrap_err(),
            IoError::OutOfMemory {
                requested: 64,
                available: 36
            }
        );
    }

    #[test_log::test]
    fn huge_alloc_is_out_of_memory() {
        let mut storage = WordStorage::new(1 << 20);
        let size = (usize::MAX / 8) & !3;

        assert_eq!(
            storage.alloc(size).unwrap_err(),
            IoError::OutOfMemory {
                requested: size as u64,
                available: 1 << 20
            }
        );
        assert_eq!(storage.usage(), MemoryUsage::default());
    }

    #[test_log::test]
    fn dropped_handles_are_reclaimed_when_memory_runs_out() {
        let mut storage = WordStorage::new(100);
        let first = storage.alloc(64).unwrap();
        drop(first);

        assert!(storage.alloc(64).is_ok());
        assert_eq!(storage.usage().number_allocs, 1);
    }

    #[test_log::test]
    fn usage_display() {
        let usage = MemoryUsage {
            number_allocs: 2,
            bytes_in_use: 8_388_608,
        };

        assert_eq!(
            usage.to_string(),
            "Memory Usage Report:\n  Number of allocations: 2\n  Bytes in use: 8.39 MB"
        );
    }
}
