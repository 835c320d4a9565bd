use super::{
    task::{ChunkResult, CubeTask, LaunchTask},
    worker::Worker,
};
use crate::{analysis::AccessStats, scope::KernelFault};
use std::{fmt::Debug, sync::Arc, sync::mpsc};

/// Outcome of a whole launch.
#[derive(Debug, Default)]
pub struct LaunchOutcome {
    /// The fault of the lowest faulting cube.
    pub fault: Option<KernelFault>,
    /// Access statistics summed over every cube, when analysed.
    pub stats: Option<AccessStats>,
}

/// Distributes the cubes of a launch over the workers and waits for all of them.
pub struct Scheduler {
    workers: Vec<Worker>,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scheduler {{ workers: {} }}", self.workers.len())
    }
}

impl Scheduler {
    pub fn new(num_workers: usize) -> Self {
        let workers: Vec<Worker> = (0..num_workers.max(1))
            .filter_map(|id| match Worker::new(id) {
                Ok(worker) => Some(worker),
                Err(err) => {
                    log::warn!("Can't spawn worker {id}: {err}");
                    None
                }
            })
            .collect();

        if workers.is_empty() {
            log::warn!("No worker available, cubes are executed on the server thread");
        }

        Self { workers }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn dispatch(&mut self, launch: LaunchTask) -> LaunchOutcome {
        let num_cubes = launch.num_cubes();
        let launch = Arc::new(launch);
        let (send, receive) = mpsc::channel();
        let mut results = Vec::new();
        let mut msg_count = 0;

        if self.workers.is_empty() {
            results.push(launch.execute(0..num_cubes));
        } else {
            let chunk_size = num_cubes.div_ceil(self.workers.len() as u64).max(1);

            for (index, worker) in self.workers.iter().enumerate() {
                let start = index as u64 * chunk_size;
                if start >= num_cubes {
                    break;
                }
                let end = u64::min(start + chunk_size, num_cubes);

                let task = CubeTask {
                    launch: launch.clone(),
                    cubes: start..end,
                    callback: send.clone(),
                };

                match worker.send_task(task) {
                    Ok(()) => msg_count += 1,
                    Err(task) => {
                        log::warn!("Worker {index} is gone, executing its cubes on the server thread");
                        results.push(task.launch.execute(task.cubes));
                    }
                }
            }
        }

        // Every task holds a sender clone, the loop ends early if a worker drops its task.
        core::mem::drop(send);
        for result in receive.iter() {
            results.push(result);
            msg_count -= 1;
            if msg_count == 0 {
                break;
            }
        }

        let mut outcome = merge(results);
        if msg_count > 0 && outcome.fault.is_none() {
            outcome.fault = Some(KernelFault::Panicked {
                message: format!("{msg_count} worker(s) stopped before completing their cubes"),
            });
        }

        outcome
    }
}

fn merge(results: Vec<ChunkResult>) -> LaunchOutcome {
    let mut outcome = LaunchOutcome::default();
    let mut first_fault: Option<(u64, KernelFault)> = None;

    for result in results {
        if let Some(stats) = result.stats {
            *outcome.stats.get_or_insert_with(AccessStats::default) += stats;
        }
        if let Some((cube, fault)) = result.fault {
            match &first_fault {
                Some((first, _)) if *first <= cube => {}
                _ => first_fault = Some((cube, fault)),
            }
        }
    }

    outcome.fault = first_fault.map(|(_, fault)| fault);
    outcome
}
