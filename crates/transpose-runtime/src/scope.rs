use crate::{
    analysis::{Access, AccessRecorder, AccessStats},
    kernel::UnitPos,
    server::{CubeCount, CubeDim, ExecutionMode},
    storage::WordResource,
};
use core::fmt::Display;
use thiserror::Error;

/// Memory space of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// A global memory binding.
    Global {
        /// Binding position.
        binding: usize,
    },
    /// The shared memory of the cube.
    Shared,
}

impl Display for MemorySpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MemorySpace::Global { binding } => write!(f, "binding {binding}"),
            MemorySpace::Shared => f.write_str("shared memory"),
        }
    }
}

/// Kind of race between two units of the same cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceKind {
    /// A unit reads a word another unit wrote without a barrier in between.
    ReadAfterWrite,
    /// Two units write the same word without a barrier in between.
    WriteAfterWrite,
    /// A unit overwrites a word another unit read without a barrier in between.
    WriteAfterRead,
}

impl Display for RaceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            RaceKind::ReadAfterWrite => "read after write",
            RaceKind::WriteAfterWrite => "write after write",
            RaceKind::WriteAfterRead => "write after read",
        })
    }
}

/// A fault raised while executing a kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelFault {
    /// An access past the end of a buffer.
    #[error("{unit} accessed index {index} of {memory} holding {len} words")]
    OutOfBounds {
        /// The accessed memory.
        memory: MemorySpace,
        /// The accessed word.
        index: usize,
        /// The length of the memory in words.
        len: usize,
        /// The faulting unit.
        unit: UnitPos,
    },

    /// An access to a binding the launch didn't provide.
    #[error("{unit} accessed binding {binding}, only {len} bindings were provided")]
    MissingBinding {
        /// The requested binding.
        binding: usize,
        /// The number of bindings of the launch.
        len: usize,
        /// The faulting unit.
        unit: UnitPos,
    },

    /// Two units of a cube raced on a shared memory word.
    #[error(
        "Shared memory race ({kind}) on word {index} between units {first} and {second} of cube {cube:?}, after {epoch} barriers"
    )]
    SharedMemoryRace {
        /// The kind of race.
        kind: RaceKind,
        /// The shared memory word.
        index: usize,
        /// Linear index of the unit that accessed the word first.
        first: u32,
        /// Linear index of the unit that accessed the word second.
        second: u32,
        /// The cube the race happened in.
        cube: (u32, u32, u32),
        /// Number of barriers executed by the cube before the race.
        epoch: u32,
    },

    /// A shared memory word was read before any unit wrote it.
    #[error("{unit} read shared memory word {index} before it was written")]
    UninitializedShared {
        /// The shared memory word.
        index: usize,
        /// The faulting unit.
        unit: UnitPos,
    },

    /// The kernel body panicked.
    #[error("Kernel panicked: {message}")]
    Panicked {
        /// The panic message.
        message: String,
    },
}

/// Options of a cube execution.
#[derive(new, Debug, Clone, Copy)]
pub struct ScopeOptions {
    /// The execution mode.
    pub mode: ExecutionMode,
    /// Whether memory accesses are recorded.
    pub analyse: bool,
    /// Number of units per plane.
    pub plane_size: u32,
    /// Number of shared memory banks.
    pub banks: u32,
}

#[derive(Debug, Clone, Copy, Default)]
enum Readers {
    #[default]
    None,
    One(u32),
    /// At least two distinct readers.
    Many(u32, u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct WordHazard {
    writer: Option<u32>,
    readers: Readers,
}

/// Tracks shared memory accesses between two barriers.
#[derive(Debug)]
struct HazardTracker {
    words: Vec<WordHazard>,
    written: Vec<bool>,
}

impl HazardTracker {
    fn new(len: usize) -> Self {
        Self {
            words: vec![WordHazard::default(); len],
            written: vec![false; len],
        }
    }

    fn barrier(&mut self) {
        self.words.fill(WordHazard::default());
    }

    /// Returns the conflicting unit and race kind, if any.
    fn read(&mut self, index: usize, unit: u32) -> Result<Option<(RaceKind, u32)>, ()> {
        if !self.written[index] {
            return Err(());
        }

        let word = &mut self.words[index];
        if let Some(writer) = word.writer
            && writer != unit
        {
            return Ok(Some((RaceKind::ReadAfterWrite, writer)));
        }

        word.readers = match word.readers {
            Readers::None => Readers::One(unit),
            Readers::One(reader) if reader == unit => Readers::One(unit),
            Readers::One(reader) => Readers::Many(reader, unit),
            many => many,
        };

        Ok(None)
    }

    fn write(&mut self, index: usize, unit: u32) -> Option<(RaceKind, u32)> {
        self.written[index] = true;
        let word = &mut self.words[index];

        if let Some(writer) = word.writer
            && writer != unit
        {
            return Some((RaceKind::WriteAfterWrite, writer));
        }

        match word.readers {
            Readers::One(reader) if reader != unit => {
                return Some((RaceKind::WriteAfterRead, reader));
            }
            Readers::Many(first, second) => {
                let reader = if first != unit { first } else { second };
                return Some((RaceKind::WriteAfterRead, reader));
            }
            _ => {}
        }

        word.writer = Some(unit);
        None
    }
}

struct CubeState<'a> {
    bindings: &'a [WordResource],
    shared: Vec<f32>,
    hazards: Option<HazardTracker>,
    recorder: Option<AccessRecorder>,
    fault: Option<KernelFault>,
    epoch: u32,
}

impl CubeState<'_> {
    fn fault(&mut self, fault: KernelFault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    fn record(&mut self, access: Access) {
        if let Some(recorder) = &mut self.recorder {
            recorder.record(access);
        }
    }
}

/// Result of the execution of a single cube.
#[derive(Debug, Default)]
pub struct CubeOutcome {
    /// The first fault raised by the cube.
    pub fault: Option<KernelFault>,
    /// The recorded memory accesses, when analysed.
    pub stats: Option<AccessStats>,
}

/// Execution scope of a single cube.
///
/// Units of a stage run one after the other in linear order, so every unit observes the writes of
/// the previous stages. Checked executions report shared memory accesses that would race on a
/// device where units run concurrently.
pub struct CubeScope<'a> {
    cube: (u32, u32, u32),
    cube_dim: CubeDim,
    cube_count: CubeCount,
    plane_size: u32,
    state: CubeState<'a>,
}

impl<'a> CubeScope<'a> {
    /// Creates the scope of the cube at the given position.
    pub fn new(
        cube: (u32, u32, u32),
        cube_dim: CubeDim,
        cube_count: CubeCount,
        bindings: &'a [WordResource],
        shared_memory_len: usize,
        options: &ScopeOptions,
    ) -> Self {
        let hazards = match options.mode {
            ExecutionMode::Checked => Some(HazardTracker::new(shared_memory_len)),
            ExecutionMode::Unchecked => None,
        };

        Self {
            cube,
            cube_dim,
            cube_count,
            plane_size: options.plane_size.max(1),
            state: CubeState {
                bindings,
                shared: vec![0.0; shared_memory_len],
                hazards,
                recorder: options.analyse.then(|| AccessRecorder::new(options.banks)),
                fault: None,
                epoch: 0,
            },
        }
    }

    /// Position of the cube in the grid.
    pub fn cube_pos(&self) -> (u32, u32, u32) {
        self.cube
    }

    /// Units per cube.
    pub fn cube_dim(&self) -> CubeDim {
        self.cube_dim
    }

    /// Cubes per launch.
    pub fn cube_count(&self) -> CubeCount {
        self.cube_count
    }

    /// Whether a unit of the cube faulted.
    pub fn has_faulted(&self) -> bool {
        self.state.fault.is_some()
    }

    /// Runs a stage of the kernel for every unit of the cube.
    pub fn for_each_unit<F>(&mut self, mut stage: F)
    where
        F: FnMut(&mut Unit<'_, 'a>),
    {
        let dim = self.cube_dim;
        let mut linear = 0;

        for unit_z in 0..dim.z {
            for unit_y in 0..dim.y {
                for unit_x in 0..dim.x {
                    if self.state.fault.is_some() {
                        return;
                    }

                    let pos = UnitPos {
                        unit_x,
                        unit_y,
                        unit_z,
                        cube_x: self.cube.0,
                        cube_y: self.cube.1,
                        cube_z: self.cube.2,
                        cube_dim: dim,
                        cube_count: self.cube_count,
                    };
                    let mut unit = Unit {
                        pos,
                        cube: self.cube,
                        state: &mut self.state,
                    };
                    stage(&mut unit);

                    linear += 1;
                    if let Some(recorder) = &mut self.state.recorder {
                        recorder.end_unit();
                        if linear % self.plane_size == 0 {
                            recorder.end_plane();
                        }
                    }
                }
            }
        }

        if let Some(recorder) = &mut self.state.recorder {
            recorder.end_plane();
        }
    }

    /// Waits for every unit of the cube, making their shared memory writes visible.
    pub fn sync_cube(&mut self) {
        self.state.epoch += 1;
        if let Some(hazards) = &mut self.state.hazards {
            hazards.barrier();
        }
    }

    /// Consumes the scope, returning its fault and access statistics.
    pub fn finish(self) -> CubeOutcome {
        CubeOutcome {
            fault: self.state.fault,
            stats: self.state.recorder.map(AccessRecorder::finish),
        }
    }
}

/// A single unit of a cube, executing one stage of the kernel.
pub struct Unit<'s, 'a> {
    pos: UnitPos,
    cube: (u32, u32, u32),
    state: &'s mut CubeState<'a>,
}

impl<'a> Unit<'_, 'a> {
    /// Position of the unit.
    pub fn pos(&self) -> &UnitPos {
        &self.pos
    }

    /// Loads a word of a global binding. Faulting loads return zero.
    pub fn load(&mut self, binding: usize, index: usize) -> f32 {
        let Some(resource) = self.resource(binding) else {
            return 0.0;
        };

        match resource.load(index) {
            Some(value) => {
                self.state.record(Access::GlobalLoad { binding, index });
                value
            }
            None => {
                let len = resource.len();
                self.out_of_bounds(MemorySpace::Global { binding }, index, len);
                0.0
            }
        }
    }

    /// Stores a word of a global binding. Faulting stores are dropped.
    pub fn store(&mut self, binding: usize, index: usize, value: f32) {
        let Some(resource) = self.resource(binding) else {
            return;
        };

        if resource.store(index, value) {
            self.state.record(Access::GlobalStore { binding, index });
        } else {
            let len = resource.len();
            self.out_of_bounds(MemorySpace::Global { binding }, index, len);
        }
    }

    /// Loads a word of the cube's shared memory.
    pub fn load_shared(&mut self, index: usize) -> f32 {
        let len = self.state.shared.len();
        if index >= len {
            self.out_of_bounds(MemorySpace::Shared, index, len);
            return 0.0;
        }

        let unit = self.pos.unit_linear();
        if let Some(hazards) = &mut self.state.hazards {
            match hazards.read(index, unit) {
                Err(()) => {
                    let pos = self.pos;
                    self.state
                        .fault(KernelFault::UninitializedShared { index, unit: pos });
                    return 0.0;
                }
                Ok(Some((kind, other))) => {
                    self.race(kind, index, other, unit);
                    return 0.0;
                }
                Ok(None) => {}
            }
        }

        self.state.record(Access::SharedLoad(index));
        self.state.shared[index]
    }

    /// Stores a word of the cube's shared memory.
    pub fn store_shared(&mut self, index: usize, value: f32) {
        let len = self.state.shared.len();
        if index >= len {
            self.out_of_bounds(MemorySpace::Shared, index, len);
            return;
        }

        let unit = self.pos.unit_linear();
        if let Some(hazards) = &mut self.state.hazards
            && let Some((kind, other)) = hazards.write(index, unit)
        {
            self.race(kind, index, other, unit);
            return;
        }

        self.state.record(Access::SharedStore(index));
        self.state.shared[index] = value;
    }

    fn resource(&mut self, binding: usize) -> Option<&'a WordResource> {
        let bindings: &'a [WordResource] = self.state.bindings;

        match bindings.get(binding) {
            Some(resource) => Some(resource),
            None => {
                let len = self.state.bindings.len();
                let pos = self.pos;
                self.state.fault(KernelFault::MissingBinding {
                    binding,
                    len,
                    unit: pos,
                });
                None
            }
        }
    }

    fn out_of_bounds(&mut self, memory: MemorySpace, index: usize, len: usize) {
        let pos = self.pos;
        self.state.fault(KernelFault::OutOfBounds {
            memory,
            index,
            len,
            unit: pos,
        });
    }

    fn race(&mut self, kind: RaceKind, index: usize, first: u32, second: u32) {
        let epoch = self.state.epoch;
        self.state.fault(KernelFault::SharedMemoryRace {
            kind,
            index,
            first,
            second,
            cube: self.cube,
            epoch,
        });
    }
}
