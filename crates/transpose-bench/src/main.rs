use std::{path::PathBuf, process::ExitCode};
use transpose_bench::{BenchConfig, BenchError, BenchReport, BenchmarkHarness};
use transpose_runtime::{
    config::GlobalConfig,
    prelude::{CpuDevice, CpuRuntime, Runtime},
};

fn main() -> ExitCode {
    env_logger::init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);

    match run(path) {
        Ok(report) => {
            println!("{report}");
            match report.failures() {
                0 => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            }
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

fn run(path: Option<PathBuf>) -> Result<BenchReport, BenchError> {
    if let Some(path) = &path {
        GlobalConfig::set(GlobalConfig::from_file_path(path)?.override_from_env());
    }

    let config = BenchConfig::load(path.as_deref())?;
    // Rejects invalid configurations before the device is touched.
    config.validate()?;

    let client = CpuRuntime::client(&CpuDevice);
    log::info!(
        "Running on {} ({})",
        client.properties(),
        CpuRuntime::name(&client)
    );

    BenchmarkHarness::new(client, config)?.run()
}
