mod scheduler;
mod server;
mod task;
mod worker;

pub use server::*;
