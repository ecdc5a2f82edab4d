// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic interval source for real-time loops.
//!
//! The first fire lands one second after construction, every `period` after
//! that. Each fire reports how many periods elapsed since the previous fire
//! (normally 1); a loop that stalls gets a single late fire with the skip
//! count rather than a burst of catch-up fires. Backed by the tokio monotonic
//! clock, so wall-clock adjustments never move a deadline.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct Periodic {
    name: String,
    period: Duration,
    interval: Interval,
}

impl Periodic {
    pub fn new(period: Duration, name: impl Into<String>) -> Self {
        let mut interval = time::interval_at(Instant::now() + Duration::from_secs(1), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { name: name.into(), period, interval }
    }

    /// Wait for the next fire and return the number of periods elapsed since
    /// the previous one (>= 1). Warns when periods were skipped.
    pub async fn tick(&mut self) -> u64 {
        let deadline = self.interval.tick().await;
        // A fire that lands late covers the deadlines that passed while the
        // loop was stalled; those are skipped, not replayed.
        let late = Instant::now().saturating_duration_since(deadline);
        let n_periods = 1 + (late.as_secs_f64() / self.period.as_secs_f64()).floor() as u64;
        if n_periods > 1 {
            warn!(name = %self.name, skipped = n_periods - 1, "periodic timer skipped periods");
        }
        n_periods
    }

    /// Drive `callback` on its own task until `shutdown` cancels.
    ///
    /// The callback receives the periods-elapsed count and must not block the
    /// scheduler; heavy work belongs behind a queue.
    pub fn spawn(
        period: Duration,
        name: impl Into<String>,
        shutdown: CancellationToken,
        mut callback: impl FnMut(u64) + Send + 'static,
    ) -> JoinHandle<()> {
        let mut periodic = Self::new(period, name);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    n_periods = periodic.tick() => callback(n_periods),
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "periodic_tests.rs"]
mod tests;
