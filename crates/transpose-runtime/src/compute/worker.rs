use super::task::CubeTask;
use std::{
    sync::mpsc,
    thread::{self, JoinHandle},
};

/// A persistent thread executing the cube tasks it receives.
#[derive(Debug)]
pub struct Worker {
    tx: Option<mpsc::Sender<CubeTask>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(thread_id: usize) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let inner_worker = InnerWorker { thread_id, rx };
        let handle = thread::Builder::new()
            .name(format!("transpose-worker-{thread_id}"))
            .spawn(move || inner_worker.work())?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Sends the task to the worker, giving it back when the worker is gone.
    pub fn send_task(&self, task: CubeTask) -> Result<(), CubeTask> {
        match &self.tx {
            Some(tx) => tx.send(task).map_err(|err| err.0),
            None => Err(task),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel stops the worker loop.
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("A worker thread panicked while stopping");
        }
    }
}

struct InnerWorker {
    thread_id: usize,
    rx: mpsc::Receiver<CubeTask>,
}

impl InnerWorker {
    fn work(self) {
        log::trace!("Worker {} started", self.thread_id);
        for task in self.rx.iter() {
            task.compute();
        }
        log::trace!("Worker {} stopped", self.thread_id);
    }
}
