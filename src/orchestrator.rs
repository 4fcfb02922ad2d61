//! Run lifecycle: start tasks, wait for the first exit, drain, clean up
//!
//! ```text
//! Starting ──► Running ──► Draining ──► Cleanup ──► Exited
//!   config      writers      cancel       delete every
//!   + target    reporter     + join       file in the
//!   dir         listeners    workers      target dir
//! ```
//!
//! Every task runs on its own thread and reports a [`TaskExit`] on one
//! channel. The first message (or the `--stopafter` deadline) ends the run.
//! Writers and the reporter are joined before cleanup so no file can appear
//! after the sweep. The signal and keypress listeners are left detached;
//! they hold nothing cleanup depends on.

use crate::cancel::CancelToken;
use crate::cli::Cli;
use crate::counters::{CounterSnapshot, WriteCounters};
use crate::error::{BenchError, ConfigError, Result};
use crate::size::{format_size, ByteSize};
use crate::stats::StatsReporter;
use crate::target::{CleanupReport, TargetDir, DEFAULT_SUBDIR};
use crate::writer::{FileWriter, SizeRange, WorkerReport, WriterKind, WriterWorker};
use crossbeam::channel::{self, select, Receiver, Sender};
use nix::sys::signal::{SigSet, Signal};
use std::fmt;
use std::io::{self, BufRead};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Validated benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub range: SizeRange,
    pub writers: Vec<WriterKind>,
    /// `None` runs until interrupted
    pub stop_after: Option<Duration>,
    pub target_dir: PathBuf,
    /// Stop on SIGINT / SIGTERM
    pub listen_for_signals: bool,
    /// Stop when a line is read from stdin
    pub listen_for_keypress: bool,
}

impl BenchConfig {
    /// Configuration with no listeners, no deadline and the default target
    pub fn new(
        range: SizeRange,
        writers: Vec<WriterKind>,
    ) -> std::result::Result<Self, ConfigError> {
        if writers.is_empty() {
            return Err(ConfigError::NoWriterSelected);
        }
        Ok(Self {
            range,
            writers,
            stop_after: None,
            target_dir: TargetDir::default_path(),
            listen_for_signals: false,
            listen_for_keypress: false,
        })
    }

    pub fn from_cli(cli: &Cli) -> std::result::Result<Self, ConfigError> {
        let min = ByteSize::parse(&cli.min_size)?;
        let max = ByteSize::parse(&cli.max_size)?;
        let range = SizeRange::new(min, max)?;

        let mut writers = Vec::new();
        if cli.file_streams {
            writers.push(WriterKind::Stream);
        }
        if cli.memory_maps {
            writers.push(WriterKind::MemoryMap);
        }

        let mut config = Self::new(range, writers)?.with_listeners(true, true);
        if cli.stop_after > 0 {
            config = config.with_stop_after(Duration::from_secs(cli.stop_after));
        }
        // The sweep deletes every file in the target, so never aim it at a
        // directory the user owns: always work inside a dedicated subfolder
        if let Some(dir) = &cli.dir {
            config = config.with_target_dir(dir.join(DEFAULT_SUBDIR));
        }
        Ok(config)
    }

    pub fn with_stop_after(mut self, stop_after: Duration) -> Self {
        self.stop_after = Some(stop_after);
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = dir.into();
        self
    }

    pub fn with_listeners(mut self, signals: bool, keypress: bool) -> Self {
        self.listen_for_signals = signals;
        self.listen_for_keypress = keypress;
        self
    }
}

/// Lifecycle phases, logged at DEBUG on entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Cleanup,
    Exited,
}

impl Phase {
    fn enter(self) {
        debug!(phase = ?self, "Entering phase");
    }
}

/// Why a run that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM
    Interrupted(&'static str),
    KeyPressed,
    TimedOut,
    /// A task returned without being asked to
    TaskFinished(&'static str),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted(signal) => write!(f, "received {}", signal),
            StopReason::KeyPressed => write!(f, "key pressed"),
            StopReason::TimedOut => write!(f, "stop-after elapsed"),
            StopReason::TaskFinished(task) => write!(f, "{} finished", task),
        }
    }
}

/// What a clean run produced
#[derive(Debug)]
pub struct RunSummary {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub totals: CounterSnapshot,
    pub workers: Vec<WorkerReport>,
    pub cleanup: CleanupReport,
}

impl RunSummary {
    /// Mean bytes per second over the whole run
    pub fn average_bytes_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.totals.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Message a task sends when it ends
#[derive(Debug)]
enum TaskExit {
    Signal(Signal),
    KeyPressed,
    TimedOut,
    Worker(Result<WorkerReport>),
    Finished(&'static str),
    Panicked(&'static str),
}

/// Run a benchmark to completion.
///
/// Returns the first task failure, if any, after cleanup has run.
pub fn run(config: BenchConfig) -> Result<RunSummary> {
    run_with_writers(config, WriterKind::writer)
}

/// [`run`] with the strategy for each enabled kind supplied by `make_writer`
fn run_with_writers<F>(config: BenchConfig, make_writer: F) -> Result<RunSummary>
where
    F: Fn(WriterKind) -> Box<dyn FileWriter>,
{
    let started = Instant::now();

    Phase::Starting.enter();
    let target = TargetDir::prepare(&config.target_dir)?;
    // Must happen before any thread exists so every thread inherits the mask
    let signals = if config.listen_for_signals {
        Some(block_shutdown_signals()?)
    } else {
        None
    };

    let writer_names: Vec<&str> = config.writers.iter().map(|w| w.name()).collect();
    info!(
        dir = %target.path().display(),
        writers = ?writer_names,
        min = %ByteSize::new(config.range.min()),
        max = %ByteSize::new(config.range.max()),
        stop_after_secs = config.stop_after.map(|d| d.as_secs()),
        "Starting write benchmark"
    );
    if config.listen_for_keypress {
        info!("Press Enter to stop");
    }

    let cancel = CancelToken::new();
    let counters = Arc::new(WriteCounters::new());
    let (exit_tx, exit_rx) = channel::unbounded();

    Phase::Running.enter();
    let mut handles = Vec::new();
    let spawned = spawn_tasks(
        &config,
        &make_writer,
        signals,
        &target,
        &counters,
        &cancel,
        &exit_tx,
        &mut handles,
    );
    drop(exit_tx);

    let mut workers = Vec::new();
    let mut outcome = spawned.and_then(|()| {
        let first = wait_for_first_exit(&exit_rx, config.stop_after);
        classify(first, &mut workers)
    });

    Phase::Draining.enter();
    match &outcome {
        Ok(reason) => info!(reason = %reason, "Stopping"),
        Err(e) => error!(error = %e, "Stopping after failure"),
    }
    cancel.cancel();
    for (task, handle) in handles {
        if handle.join().is_err() {
            record_failure(&mut outcome, BenchError::TaskPanicked(task.to_string()));
        }
    }
    for exit in exit_rx.try_iter() {
        if let Err(e) = classify(exit, &mut workers) {
            record_failure(&mut outcome, e);
        }
    }

    Phase::Cleanup.enter();
    let cleanup = target.cleanup();
    if cleanup.is_clean() {
        info!(removed = cleanup.removed, "Target directory cleaned");
    } else {
        warn!(
            removed = cleanup.removed,
            failed = cleanup.failed.len(),
            "Target directory cleaned with failures"
        );
    }

    Phase::Exited.enter();
    let elapsed = started.elapsed();
    let totals = counters.snapshot();
    let reason = outcome?;
    let summary = RunSummary {
        reason,
        elapsed,
        totals,
        workers,
        cleanup,
    };
    info!(
        "Wrote {} files ({}) in {:.1}s, average {}/s",
        totals.files,
        format_size(totals.bytes),
        elapsed.as_secs_f64(),
        format_size(summary.average_bytes_per_sec())
    );
    Ok(summary)
}

/// Keep the first failure; later ones are only logged
fn record_failure(outcome: &mut Result<StopReason>, err: BenchError) {
    if outcome.is_ok() {
        *outcome = Err(err);
    } else {
        error!(error = %err, "Additional failure while draining");
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_tasks(
    config: &BenchConfig,
    make_writer: &dyn Fn(WriterKind) -> Box<dyn FileWriter>,
    signals: Option<SigSet>,
    target: &TargetDir,
    counters: &Arc<WriteCounters>,
    cancel: &CancelToken,
    exits: &Sender<TaskExit>,
    handles: &mut Vec<(&'static str, JoinHandle<()>)>,
) -> Result<()> {
    if let Some(set) = signals {
        let listener_exits = exits.clone();
        spawn_task("signal-listener", exits, move || {
            listen_for_signals(set, listener_exits)
        })?;
    }
    if config.listen_for_keypress {
        spawn_task("keypress-listener", exits, wait_for_enter)?;
    }

    let reporter = StatsReporter::new(Arc::clone(counters), cancel.clone());
    handles.push((
        "stats-reporter",
        spawn_task("stats-reporter", exits, move || {
            reporter.run();
            Some(TaskExit::Finished("stats-reporter"))
        })?,
    ));

    for &kind in &config.writers {
        let worker = WriterWorker::new(
            make_writer(kind),
            config.range,
            target.clone(),
            Arc::clone(counters),
            cancel.clone(),
        );
        let name = task_name(kind);
        handles.push((
            name,
            spawn_task(name, exits, move || Some(TaskExit::Worker(worker.run())))?,
        ));
    }
    Ok(())
}

fn task_name(kind: WriterKind) -> &'static str {
    match kind {
        WriterKind::Stream => "filestream-writer",
        WriterKind::MemoryMap => "memorymap-writer",
    }
}

/// Spawn a named thread that reports its exit, or a panic, on `exits`.
/// A body returning `None` ends silently.
fn spawn_task<F>(name: &'static str, exits: &Sender<TaskExit>, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> Option<TaskExit> + Send + 'static,
{
    let exits = exits.clone();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let exit = panic::catch_unwind(AssertUnwindSafe(body))
                .unwrap_or(Some(TaskExit::Panicked(name)));
            if let Some(exit) = exit {
                // Receiver gone means the run is already over
                let _ = exits.send(exit);
            }
        })
        .map_err(|source| BenchError::Spawn { task: name, source })
}

fn wait_for_first_exit(exits: &Receiver<TaskExit>, stop_after: Option<Duration>) -> TaskExit {
    let deadline = stop_after.map(channel::after).unwrap_or_else(channel::never);
    select! {
        recv(exits) -> exit => exit.unwrap_or(TaskExit::Finished("all tasks")),
        recv(deadline) -> _ => TaskExit::TimedOut,
    }
}

fn classify(exit: TaskExit, workers: &mut Vec<WorkerReport>) -> Result<StopReason> {
    match exit {
        TaskExit::Signal(signal) => Ok(StopReason::Interrupted(signal.as_str())),
        TaskExit::KeyPressed => Ok(StopReason::KeyPressed),
        TaskExit::TimedOut => Ok(StopReason::TimedOut),
        TaskExit::Worker(Ok(report)) => {
            workers.push(report);
            Ok(StopReason::TaskFinished(task_name(report.kind)))
        }
        TaskExit::Worker(Err(e)) => Err(e),
        TaskExit::Finished(task) => Ok(StopReason::TaskFinished(task)),
        TaskExit::Panicked(task) => Err(BenchError::TaskPanicked(task.to_string())),
    }
}

fn block_shutdown_signals() -> Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block().map_err(BenchError::Signal)?;
    Ok(set)
}

/// Exit status used when a second signal aborts the drain (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

/// The first signal starts a graceful stop. A second one while writers are
/// still finishing their last file exits the process at once, skipping
/// cleanup.
fn listen_for_signals(set: SigSet, exits: Sender<TaskExit>) -> Option<TaskExit> {
    let first = match set.wait() {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Signal listener failed; Ctrl-C will not stop the run");
            return None;
        }
    };
    let _ = exits.send(TaskExit::Signal(first));

    match set.wait() {
        Ok(signal) => {
            warn!(
                signal = signal.as_str(),
                "Second signal while stopping, exiting without cleanup"
            );
            std::process::exit(FORCED_EXIT_CODE);
        }
        Err(e) => {
            warn!(error = %e, "Signal listener failed while stopping");
            None
        }
    }
}

/// One line on stdin stops the run. EOF (stdin closed or redirected from
/// /dev/null) can never become a keypress, so the listener just goes away.
fn wait_for_enter() -> Option<TaskExit> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            debug!("stdin closed, keypress listener exiting");
            None
        }
        Ok(_) => Some(TaskExit::KeyPressed),
        Err(e) => {
            warn!(error = %e, "Could not read stdin, keypress listener exiting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::StreamWriter;
    use clap::Parser;
    use std::cell::Cell;
    use std::fs::{self, File};
    use tempfile::TempDir;

    /// Writes a few files normally, then fails every write
    struct FailAfter {
        inner: StreamWriter,
        remaining: Cell<u32>,
    }

    impl FileWriter for FailAfter {
        fn kind(&self) -> WriterKind {
            WriterKind::Stream
        }

        fn write_file(&self, file: File, data: &[u8]) -> io::Result<()> {
            match self.remaining.get() {
                0 => Err(io::Error::new(io::ErrorKind::Other, "device went away")),
                n => {
                    self.remaining.set(n - 1);
                    self.inner.write_file(file, data)
                }
            }
        }
    }

    fn range(min: u64, max: u64) -> SizeRange {
        SizeRange::new(ByteSize::new(min), ByteSize::new(max)).unwrap()
    }

    #[test]
    fn test_from_cli_defaults() {
        let cli = Cli::parse_from(["writebench", "--filestreams"]);
        let config = BenchConfig::from_cli(&cli).unwrap();
        assert_eq!(config.range, range(1, 10 * 1024 * 1024));
        assert_eq!(config.writers, vec![WriterKind::Stream]);
        assert_eq!(config.stop_after, None);
        assert_eq!(config.target_dir, TargetDir::default_path());
        assert!(config.listen_for_signals);
        assert!(config.listen_for_keypress);
    }

    #[test]
    fn test_from_cli_all_options() {
        let cli = Cli::parse_from([
            "writebench",
            "--filestreams",
            "--memorymaps",
            "--minsize=4KB",
            "--maxsize=1MB",
            "--stopafter=7",
            "--dir=/tmp/wb-test",
        ]);
        let config = BenchConfig::from_cli(&cli).unwrap();
        assert_eq!(config.range, range(4096, 1024 * 1024));
        assert_eq!(config.writers, vec![WriterKind::Stream, WriterKind::MemoryMap]);
        assert_eq!(config.stop_after, Some(Duration::from_secs(7)));
        assert_eq!(config.target_dir, PathBuf::from("/tmp/wb-test/writebench"));
    }

    #[test]
    fn test_from_cli_rejects_bad_configuration() {
        let no_writer = Cli::parse_from(["writebench"]);
        assert_eq!(
            BenchConfig::from_cli(&no_writer).unwrap_err(),
            ConfigError::NoWriterSelected
        );

        let bad_size = Cli::parse_from(["writebench", "--filestreams", "--minsize=abc"]);
        assert_eq!(
            BenchConfig::from_cli(&bad_size).unwrap_err(),
            ConfigError::InvalidSizeFormat("abc".to_string())
        );

        let inverted = Cli::parse_from([
            "writebench",
            "--memorymaps",
            "--minsize=2MB",
            "--maxsize=1MB",
        ]);
        assert!(matches!(
            BenchConfig::from_cli(&inverted).unwrap_err(),
            ConfigError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Interrupted("SIGINT").to_string(), "received SIGINT");
        assert_eq!(StopReason::TimedOut.to_string(), "stop-after elapsed");
        assert_eq!(
            StopReason::TaskFinished("stats-reporter").to_string(),
            "stats-reporter finished"
        );
    }

    #[test]
    fn test_run_times_out_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let writers = vec![WriterKind::Stream, WriterKind::MemoryMap];
        let config = BenchConfig::new(range(1, 4096), writers)
            .unwrap()
            .with_target_dir(tmp.path())
            .with_stop_after(Duration::from_millis(300));

        let summary = run(config).unwrap();

        assert_eq!(summary.reason, StopReason::TimedOut);
        assert!(summary.totals.files > 0);
        assert_eq!(summary.workers.len(), 2);
        let worker_files: u64 = summary.workers.iter().map(|w| w.files).sum();
        let worker_bytes: u64 = summary.workers.iter().map(|w| w.bytes).sum();
        assert_eq!(worker_files, summary.totals.files);
        assert_eq!(worker_bytes, summary.totals.bytes);
        assert_eq!(summary.cleanup.removed as u64, summary.totals.files);
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_run_fails_when_target_cannot_be_created() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the target directory should be
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let config = BenchConfig::new(range(1, 16), vec![WriterKind::Stream])
            .unwrap()
            .with_target_dir(blocker.join("sub"))
            .with_stop_after(Duration::from_secs(5));

        assert!(matches!(run(config), Err(BenchError::Io { .. })));
    }

    #[test]
    fn test_run_writer_failure_stops_siblings_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let writers = vec![WriterKind::Stream, WriterKind::MemoryMap];
        let config = BenchConfig::new(range(1, 4096), writers)
            .unwrap()
            .with_target_dir(tmp.path())
            .with_stop_after(Duration::from_secs(30));
        let started = Instant::now();

        let result = run_with_writers(config, |kind| -> Box<dyn FileWriter> {
            match kind {
                WriterKind::Stream => Box::new(FailAfter {
                    inner: StreamWriter::new(),
                    remaining: Cell::new(50),
                }),
                WriterKind::MemoryMap => kind.writer(),
            }
        });

        assert!(matches!(
            result,
            Err(BenchError::Io {
                action: "writing",
                ..
            })
        ));
        // Ended by the failure, not by the deadline
        assert!(started.elapsed() < Duration::from_secs(20));
        // Files from both writers, including the failed one, were swept
        assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
        // The memory-map writer was joined, so nothing appears afterwards
        thread::sleep(Duration::from_millis(100));
        assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
