//! Tick sources for the polling loop.
//!
//! The scheduler never sleeps on its own; it awaits a [`Ticker`] between two
//! transitions. Production uses a fixed-interval timer, tests use
//! [`ManualTicker`] to step the state machine without wall-clock time.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of polling ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Completes when the next tick is due.
    async fn tick(&mut self);
}

/// Fixed-interval ticks from the tokio timer.
///
/// A late tick handler delays the following ticks instead of bursting them,
/// so two handlers never run back to back to catch up.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// First tick fires after `start_delay`, then every `period`.
    pub fn new(period: Duration, start_delay: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + start_delay, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticks immediately and counts how many were taken.
#[derive(Debug, Default, Clone)]
pub struct ManualTicker {
    ticks: u64,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        self.ticks += 1;
        tokio::task::yield_now().await;
    }
}
