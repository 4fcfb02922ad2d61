//! writebench - sustained file-write throughput benchmark
//!
//! Writer workers fill randomly sized files in a scratch directory using
//! either buffered streams or memory maps, while a reporter logs a rolling
//! bytes/sec and files/min rate. A run ends on Ctrl-C, Enter, a deadline, or
//! the first I/O failure, and always finishes by emptying the directory.

pub mod cancel;
pub mod cli;
pub mod counters;
pub mod error;
pub mod orchestrator;
pub mod size;
pub mod stats;
pub mod target;
pub mod writer;

pub use error::{BenchError, ConfigError};
pub use orchestrator::{run, BenchConfig, RunSummary, StopReason};
pub use size::ByteSize;
