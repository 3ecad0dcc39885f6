//! A background job run on a fixed interval, used by the transport's
//! stale-pending-command eviction, the trace recorder's screenshot
//! loop and the supervisor's idle watcher. A "ready to run again"
//! abstraction, `PeriodicJob`, expressed with `tokio::time::interval`
//! since the engine commits to a single async runtime end to end.

use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};

#[derive(Debug)]
pub(crate) struct PeriodicJob {
    interval: Interval,
}

impl PeriodicJob {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Waits for the next tick. Intended to be called in a loop inside
    /// a dedicated `tokio::spawn`ed task.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
