//! The directory benchmark files are written into
//!
//! Files get random names and are opened with `create_new`, so two writers
//! can never share a path. Nothing keeps a manifest of created files: at
//! shutdown the directory listing is the source of truth and every regular
//! file in it is removed, including leftovers from earlier runs.

use crate::error::{BenchError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Scratch subfolder created under the temp dir or the `--dir` parent
pub const DEFAULT_SUBDIR: &str = "writebench";

const NAME_LEN: usize = 24;
const NAME_EXTENSION: &str = "tmp";

/// Target directory handle
#[derive(Debug, Clone)]
pub struct TargetDir {
    path: PathBuf,
}

/// Outcome of [`TargetDir::cleanup`]
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl TargetDir {
    /// `<temp dir>/writebench`
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_SUBDIR)
    }

    /// Create the directory (and parents) if it does not exist yet
    pub fn prepare(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| BenchError::io("creating directory", &path, e))?;
        debug!(path = %path.display(), "Target directory ready");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a fresh, uniquely named file opened for reading and writing.
    ///
    /// Read access is needed by the memory-mapped writer.
    pub fn create_file(&self) -> Result<(PathBuf, File)> {
        loop {
            let path = self.path.join(random_file_name());
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "File name collision, retrying");
                }
                Err(e) => return Err(BenchError::io("creating", path, e)),
            }
        }
    }

    /// Regular files currently in the directory
    pub fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Delete every regular file in the directory.
    ///
    /// Best effort: failures are logged and collected, never returned as an
    /// error, and do not stop the sweep.
    pub fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let files = match self.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not list target directory for cleanup"
                );
                report.failed.push((self.path.clone(), e));
                return report;
            }
        };

        for file in files {
            match fs::remove_file(&file) {
                Ok(()) => report.removed += 1,
                // Removed by someone else in the meantime
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Failed to delete file");
                    report.failed.push((file, e));
                }
            }
        }

        debug!(
            removed = report.removed,
            failed = report.failed.len(),
            "Cleanup finished"
        );
        report
    }
}

fn random_file_name() -> String {
    let stem: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_LEN)
        .map(char::from)
        .collect();
    format!("{stem}.{NAME_EXTENSION}")
}
