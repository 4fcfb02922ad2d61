//! CLI argument parsing for writebench

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "writebench")]
#[command(version)]
#[command(
    about = "Sustained file-write throughput benchmark: buffered streams vs memory-mapped files",
    long_about = None
)]
pub struct Cli {
    /// Run the memory-mapped file writer
    #[arg(long = "memorymaps")]
    pub memory_maps: bool,

    /// Run the buffered file-stream writer
    #[arg(long = "filestreams")]
    pub file_streams: bool,

    /// Smallest file size to write (e.g. 1B, 4KB, 1.5MB)
    #[arg(long = "minsize", value_name = "SIZE", default_value = "1B")]
    pub min_size: String,

    /// Upper bound (exclusive) of file sizes to write
    #[arg(long = "maxsize", value_name = "SIZE", default_value = "10MB")]
    pub max_size: String,

    /// Stop automatically after this many seconds (0 = run until stopped)
    #[arg(long = "stopafter", value_name = "SECONDS", default_value_t = 0)]
    pub stop_after: u64,

    /// Parent directory for the scratch folder (default: <temp dir>).
    /// Files go into and are swept from its `writebench` subfolder only
    #[arg(long = "dir", value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Enable debug tracing output (to stderr)
    #[arg(long = "debug")]
    pub debug: bool,
}
