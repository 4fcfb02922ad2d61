//! Error types for configuration and steady-state benchmark failures

use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while building a [`crate::orchestrator::BenchConfig`],
/// before any task or file exists.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid size format: {0:?} (expected e.g. 512, 1B, 64KB, 10MB, 1.5GB)")]
    InvalidSizeFormat(String),

    #[error("Invalid size range: minimum {min} must be smaller than maximum {max}")]
    InvalidRange { min: String, max: String },

    #[error("No writer selected: pass --filestreams and/or --memorymaps")]
    NoWriterSelected,
}

/// Errors that end a benchmark run
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O failure while {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not allocate a {0}-byte payload buffer")]
    PayloadAllocation(u64),

    #[error("Failed to spawn {task} thread: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up signal handling: {0}")]
    Signal(#[source] nix::Error),

    #[error("Task {0} panicked")]
    TaskPanicked(String),
}

impl BenchError {
    /// Wrap an I/O error with the operation and path it failed on
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result type for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;
