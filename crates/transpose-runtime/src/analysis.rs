//! Memory access analysis.
//!
//! Units of a cube are grouped in planes of consecutive linear indices. The n-th access of every
//! unit of a plane forms one request, the way a warp issues a single memory instruction for all
//! its lanes. Shared memory requests are split in wavefronts, one per distinct word hitting the
//! same bank, and global memory requests are split in 32 bytes sectors.

use derive_more::{Add, AddAssign};
use hashbrown::{HashMap, HashSet};
use std::fmt::Display;

/// Number of `f32` words per global memory sector.
pub const SECTOR_WORDS: usize = 8;

/// Memory access statistics of a launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Add, AddAssign)]
pub struct AccessStats {
    /// Number of plane wide shared memory requests.
    pub shared_requests: u64,
    /// Number of shared memory wavefronts needed to serve the requests.
    pub shared_wavefronts: u64,
    /// Wavefronts in excess of one per request.
    pub bank_conflicts: u64,
    /// Number of plane wide global loads.
    pub global_load_requests: u64,
    /// Number of 32 bytes sectors touched by global loads.
    pub global_load_sectors: u64,
    /// Number of plane wide global stores.
    pub global_store_requests: u64,
    /// Number of 32 bytes sectors touched by global stores.
    pub global_store_sectors: u64,
}

impl AccessStats {
    /// Average number of wavefronts per shared memory request, 1.0 when conflict free.
    pub fn wavefronts_per_request(&self) -> f64 {
        ratio(self.shared_wavefronts, self.shared_requests)
    }

    /// Average number of sectors per global load.
    pub fn sectors_per_load(&self) -> f64 {
        ratio(self.global_load_sectors, self.global_load_requests)
    }

    /// Average number of sectors per global store.
    pub fn sectors_per_store(&self) -> f64 {
        ratio(self.global_store_sectors, self.global_store_requests)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Display for AccessStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shared: {} requests, {:.2} wavefronts/request, {} bank conflicts | global: {:.2} sectors/load, {:.2} sectors/store",
            self.shared_requests,
            self.wavefronts_per_request(),
            self.bank_conflicts,
            self.sectors_per_load(),
            self.sectors_per_store(),
        )
    }
}

/// A single memory access of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Load of a shared memory word.
    SharedLoad(usize),
    /// Store of a shared memory word.
    SharedStore(usize),
    /// Load of a word of the given binding.
    GlobalLoad {
        /// Binding position.
        binding: usize,
        /// Word index.
        index: usize,
    },
    /// Store of a word of the given binding.
    GlobalStore {
        /// Binding position.
        binding: usize,
        /// Word index.
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RequestKind {
    Shared,
    GlobalLoad,
    GlobalStore,
}

impl Access {
    fn kind(&self) -> RequestKind {
        match self {
            Access::SharedLoad(_) | Access::SharedStore(_) => RequestKind::Shared,
            Access::GlobalLoad { .. } => RequestKind::GlobalLoad,
            Access::GlobalStore { .. } => RequestKind::GlobalStore,
        }
    }
}

/// Records the accesses of the units of a cube, plane by plane.
#[derive(Debug)]
pub struct AccessRecorder {
    banks: usize,
    current: Vec<Access>,
    plane: Vec<Vec<Access>>,
    stats: AccessStats,
}

impl AccessRecorder {
    /// Creates a recorder for a device with the given number of shared memory banks.
    pub fn new(banks: u32) -> Self {
        Self {
            banks: banks.max(1) as usize,
            current: Vec::new(),
            plane: Vec::new(),
            stats: AccessStats::default(),
        }
    }

    /// Records an access of the current unit.
    pub fn record(&mut self, access: Access) {
        self.current.push(access);
    }

    /// Ends the current unit.
    pub fn end_unit(&mut self) {
        self.plane.push(core::mem::take(&mut self.current));
    }

    /// Ends the current plane, turning its accesses into requests.
    pub fn end_plane(&mut self) {
        if !self.current.is_empty() {
            self.end_unit();
        }

        let depth = self.plane.iter().map(Vec::len).max().unwrap_or(0);

        for step in 0..depth {
            let mut requests: HashMap<RequestKind, Vec<Access>> = HashMap::new();
            for access in self.plane.iter().filter_map(|unit| unit.get(step)) {
                requests.entry(access.kind()).or_default().push(*access);
            }

            for (kind, accesses) in requests {
                match kind {
                    RequestKind::Shared => self.shared_request(&accesses),
                    RequestKind::GlobalLoad => {
                        self.stats.global_load_requests += 1;
                        self.stats.global_load_sectors += sectors(&accesses);
                    }
                    RequestKind::GlobalStore => {
                        self.stats.global_store_requests += 1;
                        self.stats.global_store_sectors += sectors(&accesses);
                    }
                }
            }
        }

        self.plane.clear();
    }

    fn shared_request(&mut self, accesses: &[Access]) {
        let mut banks: HashMap<usize, HashSet<usize>> = HashMap::new();

        for access in accesses {
            if let Access::SharedLoad(index) | Access::SharedStore(index) = access {
                banks.entry(index % self.banks).or_default().insert(*index);
            }
        }

        // Units hitting the same word are served by a broadcast.
        let wavefronts = banks.values().map(HashSet::len).max().unwrap_or(1) as u64;

        self.stats.shared_requests += 1;
        self.stats.shared_wavefronts += wavefronts;
        self.stats.bank_conflicts += wavefronts - 1;
    }

    /// Flushes the last plane and returns the statistics of the cube.
    pub fn finish(mut self) -> AccessStats {
        if !self.plane.is_empty() || !self.current.is_empty() {
            self.end_plane();
        }
        self.stats
    }
}

fn sectors(accesses: &[Access]) -> u64 {
    accesses
        .iter()
        .filter_map(|access| match access {
            Access::GlobalLoad { binding, index } | Access::GlobalStore { binding, index } => {
                Some((*binding, index / SECTOR_WORDS))
            }
            _ => None,
        })
        .collect::<HashSet<_>>()
        .len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_plane(recorder: &mut AccessRecorder, accesses: impl Iterator<Item = Access>) {
        for access in accesses {
            recorder.record(access);
            recorder.end_unit();
        }
        recorder.end_plane();
    }

    #[test]
    fn consecutive_shared_words_are_conflict_free() {
        let mut recorder = AccessRecorder::new(32);
        record_plane(&mut recorder, (0..32).map(Access::SharedStore));

        let stats = recorder.finish();
        assert_eq!(stats.shared_requests, 1);
        assert_eq!(stats.shared_wavefronts, 1);
        assert_eq!(stats.bank_conflicts, 0);
    }

    #[test]
    fn strided_shared_words_conflict() {
        let mut recorder = AccessRecorder::new(32);
        record_plane(&mut recorder, (0..32).map(|i| Access::SharedLoad(i * 32)));

        let stats = recorder.finish();
        assert_eq!(stats.shared_wavefronts, 32);
        assert_eq!(stats.bank_conflicts, 31);
    }

    #[test]
    fn padded_stride_is_conflict_free() {
        let mut recorder = AccessRecorder::new(32);
        record_plane(&mut recorder, (0..32).map(|i| Access::SharedLoad(i * 33)));

        assert_eq!(recorder.finish().bank_conflicts, 0);
    }

    #[test]
    fn broadcast_counts_once() {
        let mut recorder = AccessRecorder::new(32);
        record_plane(&mut recorder, (0..32).map(|_| Access::SharedLoad(7)));

        assert_eq!(recorder.finish().shared_wavefronts, 1);
    }

    #[test]
    fn global_sectors() {
        let mut recorder = AccessRecorder::new(32);
        record_plane(
            &mut recorder,
            (0..32).map(|index| Access::GlobalLoad { binding: 0, index }),
        );
        record_plane(
            &mut recorder,
            (0..32).map(|i| Access::GlobalStore {
                binding: 1,
                index: i * 1024,
            }),
        );

        let stats = recorder.finish();
        assert_eq!(stats.global_load_requests, 1);
        assert_eq!(stats.global_load_sectors, 4);
        assert_eq!(stats.global_store_requests, 1);
        assert_eq!(stats.global_store_sectors, 32);
        assert_eq!(stats.sectors_per_store(), 32.0);
    }

    #[test]
    fn stats_add_up() {
        let a = AccessStats {
            shared_requests: 1,
            bank_conflicts: 2,
            ..Default::default()
        };
        let mut b = a;
        b += a;

        assert_eq!(a + a, b);
        assert_eq!(b.bank_conflicts, 4);
    }
}
