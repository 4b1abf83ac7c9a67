use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::SAMPLE_PERIOD;

/// A snapshot of one stream's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatistics {
    /// Total size, if known up front.
    pub expected: Option<u64>,
    /// Bytes transferred since the stream was opened.
    pub transferred_total: u64,
    /// Bytes transferred during the last sample period.
    pub octets_per_second: u64,
}

impl TransferStatistics {
    /// Fraction of the expected size transferred so far.
    ///
    /// `None` if the expected size is unknown or zero.
    pub fn percent_normalized(&self) -> Option<f64> {
        match self.expected {
            Some(expected) if expected > 0 => {
                Some(self.transferred_total as f64 / expected as f64)
            }
            _ => None,
        }
    }

    /// Estimated seconds until the expected size is reached at the
    /// current rate.
    ///
    /// `None` if the expected size is unknown or nothing moved during
    /// the last period.
    pub fn expected_seconds_remaining(&self) -> Option<f64> {
        let expected = self.expected?;
        if self.octets_per_second == 0 {
            return None;
        }
        let remaining = expected.saturating_sub(self.transferred_total);
        Some(remaining as f64 / self.octets_per_second as f64)
    }
}

/// Receives every snapshot a tracker broadcasts.
pub type StatisticsConsumer = Arc<dyn Fn(TransferStatistics) + Send + Sync>;

struct Counters {
    expected: Option<u64>,
    period: AtomicU64,
    total: AtomicU64,
}

impl Counters {
    /// Takes a snapshot and starts a new period.
    fn sample(&self) -> TransferStatistics {
        let period = self.period.swap(0, Ordering::AcqRel);
        TransferStatistics {
            expected: self.expected,
            transferred_total: self.total.load(Ordering::Acquire),
            octets_per_second: period,
        }
    }
}

/// Samples a byte counter once per second on a background task.
///
/// The first snapshot is broadcast as soon as the task runs, then one per
/// [`SAMPLE_PERIOD`]. The task ends when the tracker is closed or dropped.
pub struct StatisticsTracker {
    counters: Arc<Counters>,
    stop: Option<oneshot::Sender<()>>,
}

impl StatisticsTracker {
    /// Starts a tracker and its sampling task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(expected: Option<u64>, consumer: StatisticsConsumer) -> Self {
        let counters = Arc::new(Counters {
            expected,
            period: AtomicU64::new(0),
            total: AtomicU64::new(0),
        });
        let (tx, mut rx) = oneshot::channel();

        let sampled = Arc::clone(&counters);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_PERIOD);
            loop {
                tokio::select! {
                    _ = ticker.tick() => consumer(sampled.sample()),
                    _ = &mut rx => break,
                }
            }
        });

        Self {
            counters,
            stop: Some(tx),
        }
    }

    /// Records `octets` more bytes transferred.
    pub fn add(&self, octets: u64) {
        self.counters.period.fetch_add(octets, Ordering::AcqRel);
        self.counters.total.fetch_add(octets, Ordering::AcqRel);
    }

    /// Returns the bytes recorded so far.
    pub fn transferred(&self) -> u64 {
        self.counters.total.load(Ordering::Acquire)
    }

    /// Returns true until [`close`](Self::close) has been called.
    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    /// Stops the sampling task. Calling it again does nothing.
    pub fn close(&mut self) {
        // Dropping the sender signals the task to exit.
        drop(self.stop.take());
    }
}

impl Drop for StatisticsTracker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn recording() -> (StatisticsConsumer, Arc<Mutex<Vec<TransferStatistics>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let consumer: StatisticsConsumer = Arc::new(move |stats| s.lock().unwrap().push(stats));
        (consumer, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn broadcasts_immediately_then_every_second() {
        let (consumer, seen) = recording();
        let tracker = StatisticsTracker::start(Some(50), consumer);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[TransferStatistics {
                expected: Some(50),
                transferred_total: 0,
                octets_per_second: 0,
            }]
        );

        tracker.add(10);
        tracker.add(5);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].transferred_total, 15);
        assert_eq!(seen[1].octets_per_second, 15);
        // Period resets after each broadcast; the total does not.
        assert_eq!(seen[2].transferred_total, 15);
        assert_eq!(seen[2].octets_per_second, 0);
        assert_eq!(tracker.transferred(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_broadcasts() {
        let (consumer, seen) = recording();
        let mut tracker = StatisticsTracker::start(None, consumer);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);

        tracker.close();
        assert!(!tracker.is_running());
        tracker.close();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_broadcasts() {
        let (consumer, seen) = recording();
        let tracker = StatisticsTracker::start(None, consumer.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(tracker);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        // The task released its handle on the consumer.
        assert_eq!(Arc::strong_count(&consumer), 1);
    }

    #[test]
    fn derived_values() {
        let stats = TransferStatistics {
            expected: Some(100),
            transferred_total: 40,
            octets_per_second: 20,
        };
        assert_eq!(stats.percent_normalized(), Some(0.4));
        assert_eq!(stats.expected_seconds_remaining(), Some(3.0));

        let stalled = TransferStatistics {
            octets_per_second: 0,
            ..stats
        };
        assert_eq!(stalled.expected_seconds_remaining(), None);

        let unknown = TransferStatistics {
            expected: None,
            ..stats
        };
        assert_eq!(unknown.percent_normalized(), None);
        assert_eq!(unknown.expected_seconds_remaining(), None);
    }
}
