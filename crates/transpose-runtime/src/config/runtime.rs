/// Configuration of the compute runtime.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Number of worker threads executing cubes, defaults to the available parallelism.
    #[serde(default)]
    pub num_workers: Option<usize>,
}

impl RuntimeConfig {
    /// Number of worker threads to spawn.
    pub fn num_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|num| num.get())
                .unwrap_or(1)
        })
    }
}
