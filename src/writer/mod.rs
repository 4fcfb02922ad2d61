//! Writer workers: fill randomly sized files until cancelled
//!
//! A worker owns one [`FileWriter`] strategy. It generates a single random
//! payload of `max` bytes at startup and writes prefixes of it, so the
//! benchmark measures I/O rather than the RNG.
//!
//! ```text
//! loop (until cancelled)
//!   size  <- uniform [min, max)
//!   file  <- TargetDir::create_file()      (fresh random name)
//!   write payload[..size] with the strategy
//!   counters += (size, 1)
//! ```
//!
//! Cancellation is checked at the top of the loop only; a write in flight
//! always completes. Any I/O error ends the worker with
//! [`BenchError::Io`]; there is no per-file retry.

pub mod mmap;
pub mod stream;

pub use mmap::MmapWriter;
pub use stream::StreamWriter;

use crate::cancel::CancelToken;
use crate::counters::WriteCounters;
use crate::error::{BenchError, ConfigError, Result};
use crate::size::ByteSize;
use crate::target::TargetDir;
use rand::Rng;
use std::fmt;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::{info, trace};

/// Which I/O strategy a worker uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterKind {
    /// Buffered sequential writes (`--filestreams`)
    Stream,
    /// Memory-mapped writes (`--memorymaps`)
    MemoryMap,
}

impl WriterKind {
    pub fn name(self) -> &'static str {
        match self {
            WriterKind::Stream => "filestream",
            WriterKind::MemoryMap => "memorymap",
        }
    }

    /// Default strategy implementation for this kind
    pub fn writer(self) -> Box<dyn FileWriter> {
        match self {
            WriterKind::Stream => Box::new(StreamWriter::new()),
            WriterKind::MemoryMap => Box::new(MmapWriter::new()),
        }
    }
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A way of persisting one payload into one freshly created file
pub trait FileWriter: Send {
    fn kind(&self) -> WriterKind;

    /// Write all of `data` into `file` and close it.
    ///
    /// `file` is empty and opened for reading and writing.
    fn write_file(&self, file: File, data: &[u8]) -> io::Result<()>;
}

/// Half-open range `[min, max)` of file sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    min: u64,
    max: u64,
}

impl SizeRange {
    pub fn new(min: ByteSize, max: ByteSize) -> std::result::Result<Self, ConfigError> {
        if min >= max {
            return Err(ConfigError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Self {
            min: min.bytes(),
            max: max.bytes(),
        })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn contains(&self, size: u64) -> bool {
        (self.min..self.max).contains(&size)
    }

    /// Uniform draw from `[min, max)`
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.min..self.max)
    }
}

/// What a worker did before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub kind: WriterKind,
    pub files: u64,
    pub bytes: u64,
}

/// One writer loop bound to a strategy, a target and the shared counters
pub struct WriterWorker {
    writer: Box<dyn FileWriter>,
    range: SizeRange,
    target: TargetDir,
    counters: Arc<WriteCounters>,
    cancel: CancelToken,
}

impl WriterWorker {
    pub fn new(
        writer: Box<dyn FileWriter>,
        range: SizeRange,
        target: TargetDir,
        counters: Arc<WriteCounters>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            writer,
            range,
            target,
            counters,
            cancel,
        }
    }

    pub fn kind(&self) -> WriterKind {
        self.writer.kind()
    }

    /// Run until the token fires or a write fails
    pub fn run(self) -> Result<WorkerReport> {
        let kind = self.kind();
        let mut rng = rand::thread_rng();
        let payload = random_payload(&mut rng, self.range.max())?;
        let mut report = WorkerReport {
            kind,
            files: 0,
            bytes: 0,
        };

        info!(writer = %kind, "Writer started");

        while !self.cancel.is_cancelled() {
            let size = self.range.sample(&mut rng);
            let (path, file) = self.target.create_file()?;
            // size < max == payload.len(), so the cast cannot truncate
            self.writer
                .write_file(file, &payload[..size as usize])
                .map_err(|e| BenchError::io("writing", &path, e))?;

            self.counters.record_file(size);
            report.files += 1;
            report.bytes += size;
            trace!(writer = %kind, path = %path.display(), size, "File written");
        }

        info!(
            writer = %kind,
            files = report.files,
            bytes = report.bytes,
            "Writer stopped"
        );
        Ok(report)
    }
}

/// Random bytes, allocated fallibly so an absurd `--maxsize` fails cleanly
fn random_payload<R: Rng>(rng: &mut R, len: u64) -> Result<Vec<u8>> {
    let alloc_error = || BenchError::PayloadAllocation(len);
    let size = usize::try_from(len).map_err(|_| alloc_error())?;

    let mut payload = Vec::new();
    payload.try_reserve_exact(size).map_err(|_| alloc_error())?;
    payload.resize(size, 0);
    rng.fill(&mut payload[..]);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn range(min: u64, max: u64) -> SizeRange {
        SizeRange::new(ByteSize::new(min), ByteSize::new(max)).unwrap()
    }

    struct FailingWriter;

    impl FileWriter for FailingWriter {
        fn kind(&self) -> WriterKind {
            WriterKind::Stream
        }

        fn write_file(&self, _file: File, _data: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_size_range_rejects_empty_or_inverted() {
        assert!(matches!(
            SizeRange::new(ByteSize::new(10), ByteSize::new(10)),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert!(SizeRange::new(ByteSize::new(11), ByteSize::new(10)).is_err());
        assert!(SizeRange::new(ByteSize::new(0), ByteSize::new(1)).is_ok());
    }

    #[test]
    fn test_size_range_sample_stays_in_bounds() {
        let r = range(5, 9);
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            assert!(r.contains(r.sample(&mut rng)));
        }
        assert!(!r.contains(9));
        assert!(r.contains(5));
    }

    #[test]
    fn test_random_payload_has_requested_length() {
        let payload = random_payload(&mut rand::thread_rng(), 4096).unwrap();
        assert_eq!(payload.len(), 4096);
        assert!(payload.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_worker_with_cancelled_token_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let target = TargetDir::prepare(tmp.path()).unwrap();
        let counters = Arc::new(WriteCounters::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = WriterWorker::new(
            WriterKind::Stream.writer(),
            range(1, 100),
            target.clone(),
            Arc::clone(&counters),
            cancel,
        )
        .run()
        .unwrap();

        assert_eq!(report.files, 0);
        assert_eq!(counters.snapshot().files, 0);
        assert!(target.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_worker_fails_fast_on_write_error() {
        let tmp = TempDir::new().unwrap();
        let target = TargetDir::prepare(tmp.path()).unwrap();
        let counters = Arc::new(WriteCounters::new());

        let err = WriterWorker::new(
            Box::new(FailingWriter),
            range(1, 100),
            target,
            Arc::clone(&counters),
            CancelToken::new(),
        )
        .run()
        .unwrap_err();

        assert!(matches!(err, BenchError::Io { action: "writing", .. }));
        assert_eq!(counters.snapshot().files, 0);
    }

    #[test]
    fn test_worker_accounts_every_file_it_writes() {
        let tmp = TempDir::new().unwrap();
        let target = TargetDir::prepare(tmp.path()).unwrap();
        let counters = Arc::new(WriteCounters::new());
        let cancel = CancelToken::new();

        let worker = WriterWorker::new(
            WriterKind::MemoryMap.writer(),
            range(1, 2048),
            target.clone(),
            Arc::clone(&counters),
            cancel.clone(),
        );
        let handle = std::thread::spawn(move || worker.run());
        std::thread::sleep(std::time::Duration::from_millis(100));
        cancel.cancel();
        let report = handle.join().unwrap().unwrap();

        let files = target.list_files().unwrap();
        let on_disk: u64 = files
            .iter()
            .map(|p| fs::metadata(p).unwrap().len())
            .sum();
        assert_eq!(files.len() as u64, report.files);
        assert_eq!(on_disk, report.bytes);
        assert_eq!(counters.snapshot().files, report.files);
        assert_eq!(counters.snapshot().bytes, report.bytes);
    }
}
