//! Rolling throughput statistics
//!
//! The reporter samples [`WriteCounters`] once per tick and keeps the last
//! [`WINDOW_CAPACITY`] samples. Rates are measured against the *oldest*
//! sample still in the window, not the previous one, so the reported value
//! is an average over up to the last minute:
//!
//! ```text
//! samples:  s0  s1  s2  ...  s59 | now
//! rate   =  (now - s0) / 60        once the window is full
//! rate   =  (now - s0) / k         while it holds k < 60 samples
//! ```

use crate::cancel::CancelToken;
use crate::counters::{CounterSnapshot, WriteCounters};
use crate::size::format_size;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Samples kept for the rolling rate (one minute at the default tick)
pub const WINDOW_CAPACITY: usize = 60;

/// Reporter cadence
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Averaged rates over the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    pub bytes_per_sec: u64,
    pub files_per_min: u64,
}

/// Bounded FIFO of counter snapshots
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<CounterSnapshot>,
    capacity: usize,
}

impl SampleWindow {
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Sample window capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Rates of `current` against the oldest sample, or `None` for the
    /// very first observation. `current` is then appended and the oldest
    /// sample evicted if the window overflows.
    pub fn observe(&mut self, current: CounterSnapshot) -> Option<Rates> {
        let rates = self.samples.front().map(|oldest| {
            let ticks = self.samples.len() as u64;
            Rates {
                bytes_per_sec: current.bytes.saturating_sub(oldest.bytes) / ticks,
                files_per_min: current.files.saturating_sub(oldest.files) * 60 / ticks,
            }
        });

        self.samples.push_back(current);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        rates
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}

/// One human-readable report line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsLine {
    pub elapsed: Duration,
    pub rates: Option<Rates>,
    pub total: CounterSnapshot,
}

impl StatsLine {
    pub fn write_rate(&self) -> String {
        match self.rates {
            Some(r) => format!("{}/s", format_size(r.bytes_per_sec)),
            None => "N/A".to_string(),
        }
    }

    pub fn file_rate(&self) -> String {
        match self.rates {
            Some(r) => format!("{}/min", r.files_per_min),
            None => "N/A".to_string(),
        }
    }
}

impl fmt::Display for StatsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>5}s] files: {} | write: {} | total: {}",
            self.elapsed.as_secs(),
            self.file_rate(),
            self.write_rate(),
            format_size(self.total.bytes)
        )
    }
}

/// Periodic stats logger
pub struct StatsReporter {
    counters: Arc<WriteCounters>,
    cancel: CancelToken,
    tick: Duration,
    window: SampleWindow,
}

impl StatsReporter {
    pub fn new(counters: Arc<WriteCounters>, cancel: CancelToken) -> Self {
        Self::with_tick(counters, cancel, DEFAULT_TICK)
    }

    pub fn with_tick(counters: Arc<WriteCounters>, cancel: CancelToken, tick: Duration) -> Self {
        Self {
            counters,
            cancel,
            tick,
            window: SampleWindow::default(),
        }
    }

    /// Sample, update the window and build the line for this tick
    pub fn tick(&mut self, elapsed: Duration) -> StatsLine {
        let total = self.counters.snapshot();
        let rates = self.window.observe(total);
        StatsLine {
            elapsed,
            rates,
            total,
        }
    }

    /// Log one line per tick until cancelled.
    ///
    /// Sleeps `tick - work` after each line so slow iterations do not push
    /// the schedule back; an overrun fires the next tick immediately.
    pub fn run(mut self) {
        let started = Instant::now();
        while !self.cancel.is_cancelled() {
            let tick_start = Instant::now();
            let line = self.tick(started.elapsed());
            info!("{}", line);

            let remaining = self.tick.saturating_sub(tick_start.elapsed());
            if self.cancel.wait_timeout(remaining) {
                break;
            }
        }
    }
}
