//! Send throughput accounting.
//!
//! Senders bump a shared [`PacketCounter`]; the [`RateMonitor`] drains
//! it once per interval and logs the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

use crate::engine::FloodContext;

/// Default reporting cadence.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

// ── PacketCounter ────────────────────────────────────────────────

/// Process-wide count of successful sends.
#[derive(Debug, Default)]
pub struct PacketCounter {
    window: AtomicU64,
    drained: AtomicU64,
}

impl PacketCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful send.
    pub fn record(&self) {
        self.window.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset to zero and return what was counted since the last take.
    pub fn take(&self) -> u64 {
        let n = self.window.swap(0, Ordering::AcqRel);
        self.drained.fetch_add(n, Ordering::Relaxed);
        n
    }

    /// Sends counted since the last take, without resetting.
    pub fn pending(&self) -> u64 {
        self.window.load(Ordering::Acquire)
    }

    /// Everything ever counted, drained or not.
    pub fn total(&self) -> u64 {
        self.drained.load(Ordering::Relaxed) + self.pending()
    }
}

// ── RateSample ───────────────────────────────────────────────────

/// Packets counted over one monitor interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub packets: u64,
    pub elapsed: Duration,
}

impl RateSample {
    /// Packets per second, normalized to the measured interval.
    pub fn per_second(&self) -> u64 {
        if self.elapsed.is_zero() {
            return self.packets;
        }
        (self.packets as f64 / self.elapsed.as_secs_f64()).round() as u64
    }
}

impl std::fmt::Display for RateSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} pps", self.per_second())
    }
}

// ── RateMonitor ──────────────────────────────────────────────────

/// Drains the packet counter on a fixed cadence.
#[derive(Debug, Clone)]
pub struct RateMonitor {
    interval: Duration,
}

impl RateMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Report until cancelled. The first tick fires immediately.
    pub async fn run(self, ctx: Arc<FloodContext>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = ctx.cancel.cancelled() => break,
            }

            let now = Instant::now();
            let sample = RateSample {
                packets: ctx.counter.take(),
                elapsed: now.duration_since(last),
            };
            last = now;

            info!(
                target: "v6paint::rate",
                packets = sample.packets,
                snapshots = ctx.snapshots.generation(),
                "{sample}"
            );
        }
    }
}

impl Default for RateMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

// ── Tests ────────────────────────────────────────────────────────
