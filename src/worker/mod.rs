//! Worker Entry (C9): bootstrap code for a spawned child process or
//! worker thread.

pub mod entry;

pub use entry::{run_listen_worker, run_stdio_worker, run_threaded_worker, run_worker};
