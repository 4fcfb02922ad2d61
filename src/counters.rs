//! Process-wide write counters shared by writer workers and the reporter

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic byte and file totals.
///
/// Workers add after each completed file; the reporter loads. The two
/// values are read independently, so a snapshot may pair a byte total with
/// a file total from a neighbouring write. That is fine for a rate line.
#[derive(Debug, Default)]
pub struct WriteCounters {
    written_bytes: AtomicU64,
    written_files: AtomicU64,
}

/// One reading of [`WriteCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub bytes: u64,
    pub files: u64,
}

impl WriteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, n: u64) {
        self.written_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_files(&self) {
        self.written_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one completed file of `size` bytes
    pub fn record_file(&self, size: u64) {
        self.add_bytes(size);
        self.increment_files();
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            bytes: self.written_bytes.load(Ordering::Relaxed),
            files: self.written_files.load(Ordering::Relaxed),
        }
    }
}
