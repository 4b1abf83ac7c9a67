use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Minimum time between two `Update` events for the same file.
const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Progress of a multi-file upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// An attempt to upload a file has started.
    FileStarted {
        name: String,
        /// 1-based.
        file_index_current: usize,
        file_index_max: usize,
        /// 1-based.
        attempt_current: u32,
        attempt_max: u32,
    },
    /// Bytes have been sent for the current attempt.
    Update {
        name: String,
        file_index_current: usize,
        file_index_max: usize,
        attempt_current: u32,
        attempt_max: u32,
        bytes_sent: u64,
        bytes_max: u64,
        /// Always within `[0, 1]`.
        progress: f64,
        bytes_per_second: u64,
        time_remaining: Duration,
    },
}

impl ProgressEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::FileStarted { name, .. } | Self::Update { name, .. } => name,
        }
    }

    pub fn file_index_current(&self) -> usize {
        match self {
            Self::FileStarted {
                file_index_current, ..
            }
            | Self::Update {
                file_index_current, ..
            } => *file_index_current,
        }
    }

    pub fn attempt_current(&self) -> u32 {
        match self {
            Self::FileStarted {
                attempt_current, ..
            }
            | Self::Update {
                attempt_current, ..
            } => *attempt_current,
        }
    }
}

/// Callback invoked with every progress event.
pub type ProgressSink = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// A [`ProgressCounter`] shared between the uploader and the statistics
/// task of the stream currently in flight.
pub type SharedProgressCounter = Arc<Mutex<ProgressCounter>>;

/// Turns file starts and absolute byte counts into [`ProgressEvent`]s.
///
/// Time is read from [`tokio::time::Instant`], so tests can drive it
/// with a paused clock.
pub struct ProgressCounter {
    sink: ProgressSink,
    generation: u64,
    at_start: bool,
    time_last: Instant,
    size_period: u64,
    size_received: u64,
    size_expected: u64,
    name: String,
    file_index: usize,
    file_count: usize,
    attempt_index: u32,
    attempt_max: u32,
}

impl ProgressCounter {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            sink,
            generation: 0,
            at_start: true,
            time_last: Instant::now(),
            size_period: 0,
            size_received: 0,
            size_expected: 0,
            name: String::new(),
            file_index: 0,
            file_count: 0,
            attempt_index: 0,
            attempt_max: 0,
        }
    }

    /// Wraps a new counter for sharing.
    pub fn shared(sink: ProgressSink) -> SharedProgressCounter {
        Arc::new(Mutex::new(Self::new(sink)))
    }

    /// Identifies the current attempt. Changes on every
    /// [`start_file`](Self::start_file).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Begins an attempt for a file and emits `FileStarted`.
    ///
    /// `file_index` is 0-based; events carry it 1-based.
    pub fn start_file(
        &mut self,
        name: &str,
        size_expected: u64,
        attempt_index: u32,
        attempt_max: u32,
        file_index: usize,
        file_count: usize,
    ) {
        self.generation += 1;
        self.name = name.to_string();
        self.size_expected = size_expected;
        self.size_period = 0;
        self.size_received = 0;
        self.attempt_index = attempt_index;
        self.attempt_max = attempt_max;
        self.file_index = file_index;
        self.file_count = file_count;
        self.time_last = Instant::now();
        self.at_start = true;

        (self.sink)(ProgressEvent::FileStarted {
            name: self.name.clone(),
            file_index_current: self.file_index + 1,
            file_index_max: self.file_count,
            attempt_current: self.attempt_index,
            attempt_max: self.attempt_max,
        });
    }

    /// Records the absolute number of bytes sent so far in this attempt.
    ///
    /// Emits an `Update` on the first call after `start_file` and then at
    /// most once per second.
    pub fn set_size_received(&mut self, total: u64) {
        let delta = total.saturating_sub(self.size_received);
        self.size_received = total;
        self.size_period += delta;

        if self.size_received > self.size_expected {
            warn!(
                file = %self.name,
                expected = self.size_expected,
                received = self.size_received,
                "received more data than expected"
            );
        }

        let now = Instant::now();
        if self.at_start || now.duration_since(self.time_last) >= UPDATE_INTERVAL {
            self.time_last = now;
            (self.sink)(ProgressEvent::Update {
                name: self.name.clone(),
                file_index_current: self.file_index + 1,
                file_index_max: self.file_count,
                attempt_current: self.attempt_index,
                attempt_max: self.attempt_max,
                bytes_sent: self.size_received,
                bytes_max: self.size_expected,
                progress: self.progress(),
                bytes_per_second: self.size_period,
                time_remaining: self.time_remaining(),
            });
            self.size_period = 0;
        }
        self.at_start = false;
    }

    fn progress(&self) -> f64 {
        if self.size_expected == 0 {
            return 1.0;
        }
        let raw = self.size_received as f64 / self.size_expected as f64;
        raw.clamp(0.0, 1.0)
    }

    fn time_remaining(&self) -> Duration {
        if self.size_period == 0 {
            return Duration::ZERO;
        }
        let remaining = self.size_expected.saturating_sub(self.size_received);
        Duration::from_secs(remaining / self.size_period)
    }
}
