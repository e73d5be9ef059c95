//! Shift Scheduler: fires a callback at each shift-boundary time of day.
//!
//! Capacity only changes when a regular agent's window opens or closes, so
//! instead of polling, one background task sleeps until the next boundary,
//! runs the callback, and after the last boundary of the day sleeps to local
//! midnight and starts over.

use chrono::{Days, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

pub type ShiftAction = Arc<dyn Fn() + Send + Sync>;

/// Handle to the running boundary task.
pub struct ShiftScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ShiftScheduler {
    /// Spawns the task on the current tokio runtime. `times` is deduplicated and
    /// sorted here, so callers may pass raw start/end lists.
    pub fn spawn(
        callback: ShiftAction,
        times: Vec<NaiveTime>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let mut times = times;
        times.sort();
        times.dedup();

        tracing::info!(
            "Shift scheduler started ({} boundaries: {})",
            times.len(),
            times
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let handle = tokio::spawn(run_shift_loop(callback, times, clock, cancel.clone()));
        Self { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels any pending sleep and waits for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Shift scheduler task ended abnormally: {}", e);
        }
    }
}

async fn run_shift_loop(
    callback: ShiftAction,
    times: Vec<NaiveTime>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    loop {
        for &time in &times {
            let now = clock.now();
            let at = now.date().and_time(time);
            if at < now {
                continue;
            }

            if !sleep_until(at, &*clock, &cancel).await {
                return;
            }
            tracing::info!("Shift boundary {} reached", time.format("%H:%M"));
            callback();
        }

        let now = clock.now();
        let Some(tomorrow) = now.date().checked_add_days(Days::new(1)) else {
            tracing::error!("Shift scheduler cannot compute the next midnight after {}", now);
            return;
        };
        if !sleep_until(tomorrow.and_time(NaiveTime::default()), &*clock, &cancel).await {
            return;
        }
    }
}

/// `false` when cancelled before the deadline.
async fn sleep_until(at: NaiveDateTime, clock: &dyn Clock, cancel: &CancellationToken) -> bool {
    let delay = (at - clock.now()).to_std().unwrap_or_default();
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("Shift scheduler cancelled");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}
