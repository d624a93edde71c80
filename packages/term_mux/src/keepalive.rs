//! Keepalive cadence for open transport links.
//!
//! Every open link carries a periodic keepalive frame so intermediate
//! proxies keep the connection alive. The cadence is configurable but
//! floored: sub-floor intervals would spam the far end for no benefit,
//! so they are rejected and the previous cadence kept.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::warn;

/// Smallest accepted keepalive interval, in seconds.
pub const MIN_KEEPALIVE_SECS: u64 = 5;

/// Default keepalive interval, in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 25;

/// Validated keepalive cadence.
///
/// Construction and mutation both enforce the floor, so any value held
/// here is safe to arm a pulse with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveSchedule {
    interval: Duration,
}

impl Default for KeepaliveSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
        }
    }
}

impl KeepaliveSchedule {
    /// Build a schedule from a second count, falling back to the default
    /// cadence when the requested value is below the floor.
    pub fn new(secs: u64) -> Self {
        let mut schedule = Self::default();
        schedule.set_interval(secs);
        schedule
    }

    /// Update the cadence. Values below [`MIN_KEEPALIVE_SECS`] are
    /// rejected and the previous cadence retained.
    pub fn set_interval(&mut self, secs: u64) {
        if secs < MIN_KEEPALIVE_SECS {
            warn!(
                requested_secs = secs,
                floor_secs = MIN_KEEPALIVE_SECS,
                "keepalive interval below floor, keeping {:?}",
                self.interval
            );
            return;
        }
        self.interval = Duration::from_secs(secs);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[cfg(test)]
    pub(crate) fn from_duration(interval: Duration) -> Self {
        Self { interval }
    }
}

/// The ticking half of the keepalive machinery.
///
/// A pulse is armed while its link is open and parked otherwise. Parked
/// pulses pend forever in [`tick`](Self::tick), which makes them safe to
/// poll from a select loop without guard conditions: a disarmed arm
/// simply never completes, so a tick can never race a link teardown.
#[derive(Debug, Default)]
pub(crate) struct KeepalivePulse {
    timer: Option<Interval>,
}

impl KeepalivePulse {
    /// Arm the pulse. The first tick lands one full interval from now,
    /// never immediately.
    pub(crate) fn start(&mut self, schedule: KeepaliveSchedule) {
        let period = schedule.interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Park the pulse. Any tick already due is discarded with the timer.
    pub(crate) fn stop(&mut self) {
        self.timer = None;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Complete on the next scheduled tick, or never while parked.
    pub(crate) async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
