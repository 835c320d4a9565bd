use core::{
    fmt::Display,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::Arc;

static HANDLE_COUNT: AtomicU64 = AtomicU64::new(0);

/// An id that points to device memory.
///
/// Every clone shares the same reference count, the storage keeps one of them so the memory is
/// free once it holds the last reference.
#[derive(Debug, Clone)]
pub struct HandleId {
    value: u64,
    count: Arc<()>,
}

impl HandleId {
    /// Creates a new id.
    pub fn new() -> Self {
        let value = HANDLE_COUNT.fetch_add(1, Ordering::Relaxed);
        Self {
            value,
            count: Arc::new(()),
        }
    }

    /// Whether no handle outside of the storage references this id.
    pub fn is_free(&self) -> bool {
        Arc::strong_count(&self.count) <= 1
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for HandleId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for HandleId {}

impl Hash for HandleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl Display for HandleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.value)
    }
}

/// Server handle pointing to a buffer of device memory.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    /// Memory handle.
    pub id: HandleId,
    /// Length of the buffer in bytes.
    size: u64,
}

impl Handle {
    /// Length of the buffer in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of 32-bit words held by the buffer.
    pub fn num_words(&self) -> usize {
        self.size as usize / size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_free_once_every_clone_is_dropped() {
        let id = HandleId::new();
        let handle = Handle::new(id.clone(), 16);
        let binding = handle.clone();

        assert!(!id.is_free());
        drop(handle);
        assert!(!id.is_free());
        drop(binding);
        assert!(id.is_free());
    }

    #[test]
    fn ids_are_unique() {
        let a = HandleId::new();
        let b = HandleId::new();

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
