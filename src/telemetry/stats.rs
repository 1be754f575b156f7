//! Periodic polling of [`Scheduler::stats`] for dashboards and logs.

use crate::scheduler::{Scheduler, SchedulerMonitor, SchedulerStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Snapshot handed to a [`StatsReporter`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub stats: SchedulerStats,
    /// Time since the reporter started.
    pub uptime: Duration,
}

/// Background task polling a scheduler on a fixed interval. Stops when dropped.
#[derive(Debug)]
pub struct StatsReporter {
    handle: JoinHandle<()>,
}

impl StatsReporter {
    /// Log every snapshot at `info` level.
    pub fn spawn_logging(scheduler: &Scheduler, every: Duration) -> Self {
        Self::spawn(scheduler, every, |snap: StatsSnapshot| {
            tracing::info!(
                queued = snap.stats.queued_requests,
                active = snap.stats.active_requests,
                processing = snap.stats.is_processing,
                uptime = %format_uptime(snap.uptime),
                "scheduler stats"
            );
        })
    }

    /// Poll `scheduler` every `every` and pass each snapshot to `report`.
    ///
    /// The first snapshot is taken immediately. The reporter only holds a
    /// [`SchedulerMonitor`], so it exits once the scheduler shuts down or its last handle is
    /// dropped. Must be called within a tokio runtime.
    pub fn spawn<F>(scheduler: &Scheduler, every: Duration, report: F) -> Self
    where
        F: Fn(StatsSnapshot) + Send + Sync + 'static,
    {
        let scheduler: SchedulerMonitor = scheduler.monitor();
        let report = Arc::new(report);
        let period = every.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if scheduler.is_shut_down() {
                    tracing::debug!("scheduler shut down; stats reporter exiting");
                    break;
                }
                report(StatsSnapshot { stats: scheduler.stats(), uptime: started.elapsed() });
            }
        });
        Self { handle }
    }

    /// Stop polling.
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Render an uptime the way operators read it: `1d 2h 3m`, `2h 3m`, `3m 4s` or `4s`.
pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
