//! Tick scheduling.
//!
//! A [`Ticker`] yields a sequence of tick numbers; the service runs one
//! reconciliation pass per tick. Production uses [`IntervalTicker`], which
//! fires immediately and then every poll interval. Tests use
//! [`ManualTicker`] and step ticks through its [`TickTrigger`].
//!
//! Tick numbers start at 1 and increase by one per yielded tick.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// A source of tick events.
pub trait Ticker {
    /// Wait for the next tick. Returns `None` once the sequence has ended.
    fn next_tick(&mut self) -> impl Future<Output = Option<u64>> + Send;
}

/// Ticks on a fixed wall-clock interval, starting immediately.
///
/// Ticks missed while a pass was still running are skipped rather than
/// fired in a burst, so passes never queue up behind a slow one.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
    count: u64,
}

impl IntervalTicker {
    /// Create a ticker firing every `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, count: 0 }
    }
}

impl Ticker for IntervalTicker {
    async fn next_tick(&mut self) -> Option<u64> {
        self.interval.tick().await;
        self.count = self.count.saturating_add(1);
        Some(self.count)
    }
}

/// Ticks only when its [`TickTrigger`] says so.
///
/// The sequence ends when every trigger has been dropped.
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
    count: u64,
}

/// Handle that fires ticks on a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct TickTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    /// Create a manual ticker and the trigger that drives it.
    pub fn channel() -> (Self, TickTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, count: 0 }, TickTrigger { tx })
    }
}

impl TickTrigger {
    /// Queue one tick. Returns `false` if the ticker has been dropped.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl Ticker for ManualTicker {
    async fn next_tick(&mut self) -> Option<u64> {
        self.rx.recv().await?;
        self.count = self.count.saturating_add(1);
        Some(self.count)
    }
}
