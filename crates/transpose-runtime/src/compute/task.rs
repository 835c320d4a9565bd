use crate::{
    analysis::AccessStats,
    kernel::CubeKernel,
    scope::{CubeScope, KernelFault, ScopeOptions},
    server::{CubeCount, CubeDim},
    storage::WordResource,
};
use std::{
    ops::Range,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, mpsc},
};

/// A launch, resolved against the server storage.
pub struct LaunchTask {
    pub kernel: Arc<dyn CubeKernel>,
    pub count: CubeCount,
    pub dim: CubeDim,
    pub resources: Vec<WordResource>,
    pub shared_memory_len: usize,
    pub options: ScopeOptions,
}

/// Result of a range of cubes.
#[derive(Debug, Default)]
pub struct ChunkResult {
    /// The first fault, along with the linear index of the faulting cube.
    pub fault: Option<(u64, KernelFault)>,
    pub stats: Option<AccessStats>,
}

/// A range of cubes of a launch, executed by a single worker.
pub struct CubeTask {
    pub launch: Arc<LaunchTask>,
    pub cubes: Range<u64>,
    pub callback: mpsc::Sender<ChunkResult>,
}

impl CubeTask {
    pub fn compute(self) {
        let result = self.launch.execute(self.cubes);
        // The scheduler stopped waiting, nothing to report to.
        let _ = self.callback.send(result);
    }
}

impl LaunchTask {
    pub fn num_cubes(&self) -> u64 {
        self.count.num_cubes()
    }

    fn cube_pos(&self, linear: u64) -> (u32, u32, u32) {
        let x = self.count.x as u64;
        let xy = x * self.count.y as u64;

        (
            (linear % x) as u32,
            ((linear % xy) / x) as u32,
            (linear / xy) as u32,
        )
    }

    /// Executes the cubes of the range in order, stopping at the first fault.
    pub fn execute(&self, cubes: Range<u64>) -> ChunkResult {
        let mut result = ChunkResult {
            fault: None,
            stats: self.options.analyse.then(AccessStats::default),
        };

        for linear in cubes {
            let mut scope = CubeScope::new(
                self.cube_pos(linear),
                self.dim,
                self.count,
                &self.resources,
                self.shared_memory_len,
                &self.options,
            );

            let executed = catch_unwind(AssertUnwindSafe(|| self.kernel.execute(&mut scope)));
            let outcome = scope.finish();

            if let (Some(total), Some(stats)) = (&mut result.stats, outcome.stats) {
                *total += stats;
            }

            let fault = match executed {
                Ok(()) => outcome.fault,
                Err(payload) => Some(KernelFault::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            };

            if let Some(fault) = fault {
                result.fault = Some((linear, fault));
                break;
            }
        }

        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ExecutionMode;

    struct CubeIndex;

    impl CubeKernel for CubeIndex {
        fn execute(&self, cube: &mut CubeScope<'_>) {
            cube.for_each_unit(|unit| {
                let pos = *unit.pos();
                if pos.unit_linear() == 0 {
                    unit.store(0, pos.cube_linear() as usize, pos.cube_linear() as f32);
                }
            });
        }
    }

    struct Panicking;

    impl CubeKernel for Panicking {
        fn execute(&self, _cube: &mut CubeScope<'_>) {
            panic!("kernel bug");
        }
    }

    fn launch(kernel: Arc<dyn CubeKernel>, count: CubeCount) -> LaunchTask {
        LaunchTask {
            kernel,
            count,
            dim: CubeDim::new_1d(2),
            resources: vec![WordResource::zeroed(count.num_cubes() as usize)],
            shared_memory_len: 0,
            options: ScopeOptions::new(ExecutionMode::Checked, false, 32, 32),
        }
    }

    #[test]
    fn cubes_are_positioned_x_first() {
        let task = launch(Arc::new(CubeIndex), CubeCount::new_3d(3, 2, 2));

        assert_eq!(task.cube_pos(0), (0, 0, 0));
        assert_eq!(task.cube_pos(4), (1, 1, 0));
        assert_eq!(task.cube_pos(11), (2, 1, 1));

        let result = task.execute(0..12);
        assert!(result.fault.is_none());
        assert_eq!(task.resources[0].load(11), Some(11.0));
    }

    #[test]
    fn panics_become_faults() {
        let task = launch(Arc::new(Panicking), CubeCount::new_1d(4));
        let result = task.execute(2..4);

        assert_eq!(
            result.fault,
            Some((
                2,
                KernelFault::Panicked {
                    message: "kernel bug".to_string()
                }
            ))
        );
    }
}
