//! Periodic "still executing" log lines for long-running commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shortest period [`Chatter::start`] accepts.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Logs `still executing...` once per period until stopped or dropped.
///
/// The first line is logged one full period after [`Chatter::start`].
pub struct Chatter {
    cancel: CancellationToken,
    ticks: Arc<AtomicU64>,
}

impl Chatter {
    /// Spawns the logging task. Must be called from within a tokio runtime.
    ///
    /// Periods below [`MIN_PERIOD`] are raised to it.
    pub fn start(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU64::new(0));

        let task_cancel = cancel.clone();
        let task_ticks = Arc::clone(&ticks);
        let start = tokio::time::Instant::now() + period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        task_ticks.fetch_add(1, Ordering::Relaxed);
                        info!("still executing...");
                    }
                }
            }
        });

        Self { cancel, ticks }
    }

    /// Number of lines logged so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stops the task. Calling it again does nothing.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Chatter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
