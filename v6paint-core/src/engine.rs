//! Flood engine orchestration.
//!
//! Wires the pipeline together:
//!
//! 1. [`AddressGenerator`] publishes a snapshot every interval.
//! 2. [`SenderPool`] workers cycle through the current snapshot.
//! 3. [`RateMonitor`] drains the packet counter once per interval.
//!
//! Every task shares one [`FloodContext`] and stops when its
//! cancellation token fires. A fatal error in any task cancels the rest.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::address::{AddressGenerator, DEFAULT_PREFIX, DEFAULT_PUBLISH_INTERVAL, OffsetDrift};
use crate::echo::EchoTemplate;
use crate::error::PaintError;
use crate::pixel::Pixel;
use crate::rate::{DEFAULT_REPORT_INTERVAL, PacketCounter, RateMonitor};
use crate::sender::{ClampPolicy, DEFAULT_WORKERS, EchoSink, SenderPool, SenderStats, SinkFactory};
use crate::snapshot::SnapshotStore;

// ── FloodContext ─────────────────────────────────────────────────

/// State shared by every task of one engine run.
#[derive(Debug)]
pub struct FloodContext {
    pub snapshots: SnapshotStore,
    pub counter: PacketCounter,
    pub template: EchoTemplate,
    pub cancel: CancellationToken,
}

impl FloodContext {
    pub fn new(template: EchoTemplate) -> Self {
        Self {
            snapshots: SnapshotStore::new(),
            counter: PacketCounter::new(),
            template,
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for FloodContext {
    fn default() -> Self {
        Self::new(EchoTemplate::default())
    }
}

// ── EngineConfig ─────────────────────────────────────────────────

/// Configuration for [`FloodEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// First three address groups (the /48).
    pub prefix: String,
    /// Offset movement per generation cycle.
    pub drift: OffsetDrift,
    /// Time between two published snapshots.
    pub publish_interval: Duration,
    /// Number of concurrent senders.
    pub workers: usize,
    /// How senders pull an overflowing cursor back in.
    pub clamp: ClampPolicy,
    /// Rate monitor cadence.
    pub report_interval: Duration,
    /// Echo request identifier.
    pub echo_identifier: u16,
    /// Echo request sequence number.
    pub echo_sequence: u16,
    /// Echo request payload.
    pub echo_payload: Vec<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            drift: OffsetDrift::default(),
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            workers: DEFAULT_WORKERS,
            clamp: ClampPolicy::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            echo_identifier: 0,
            echo_sequence: 0,
            echo_payload: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn template(&self) -> EchoTemplate {
        EchoTemplate::new(self.echo_identifier, self.echo_sequence, &self.echo_payload)
    }
}

// ── EngineReport ─────────────────────────────────────────────────

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Snapshots published.
    pub snapshots: u64,
    /// Successful sends, as seen by the packet counter.
    pub packets: u64,
    /// Per-outcome totals summed over every sender.
    pub senders: SenderStats,
}

// ── FloodEngine ──────────────────────────────────────────────────

/// Owns the pixels and the shared context for one run.
pub struct FloodEngine {
    config: EngineConfig,
    pixels: Vec<Pixel>,
    ctx: Arc<FloodContext>,
}

impl FloodEngine {
    pub fn new(config: EngineConfig, pixels: Vec<Pixel>) -> Self {
        let ctx = Arc::new(FloodContext::new(config.template()));
        Self {
            config,
            pixels,
            ctx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The context every task will share.
    pub fn context(&self) -> Arc<FloodContext> {
        Arc::clone(&self.ctx)
    }

    /// Token that stops the run when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Open the sender pool, start every task and wait.
    ///
    /// Returns `Ok` once the stop handle is cancelled, or the first
    /// fatal error raised by any task. Socket-open failures are
    /// reported before anything is spawned.
    pub async fn run<S, F>(self, factory: F) -> Result<EngineReport, PaintError>
    where
        S: EchoSink,
        F: SinkFactory<S>,
    {
        let FloodEngine {
            config,
            pixels,
            ctx,
        } = self;

        let pool = SenderPool::<S>::open(config.workers, config.clamp, &factory)?;
        info!("{} senders connected", pool.len());

        let generator = AddressGenerator::new(pixels, config.prefix.clone(), config.drift)
            .with_interval(config.publish_interval);
        let mut generator_task = tokio::spawn(generator.run(Arc::clone(&ctx)));
        let monitor_task =
            tokio::spawn(RateMonitor::new(config.report_interval).run(Arc::clone(&ctx)));
        let mut senders = pool.spawn(Arc::clone(&ctx));

        let mut totals = SenderStats::default();
        let mut generator_done = false;
        let mut failure: Option<PaintError> = None;

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                res = &mut generator_task, if !generator_done => {
                    generator_done = true;
                    if let Err(e) = res.map_err(PaintError::from).and_then(|r| r) {
                        failure = Some(e);
                        break;
                    }
                }
                Some(res) = senders.join_next() => {
                    match res.map_err(PaintError::from).and_then(|r| r) {
                        Ok(stats) => totals.merge(stats),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
        }

        if let Some(e) = &failure {
            error!("fatal: {e}; stopping every task");
        }
        ctx.cancel.cancel();

        if !generator_done {
            if let Err(e) = generator_task.await.map_err(PaintError::from).and_then(|r| r) {
                failure.get_or_insert(e);
            }
        }
        if let Err(e) = monitor_task.await {
            failure.get_or_insert(e.into());
        }
        while let Some(res) = senders.join_next().await {
            match res.map_err(PaintError::from).and_then(|r| r) {
                Ok(stats) => totals.merge(stats),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let report = EngineReport {
            snapshots: ctx.snapshots.generation(),
            packets: ctx.counter.total(),
            senders: totals,
        };
        info!(
            snapshots = report.snapshots,
            packets = report.packets,
            buffer_full = report.senders.buffer_full,
            failed = report.senders.failed,
            "flood engine stopped"
        );
        Ok(report)
    }
}

// ── Tests ────────────────────────────────────────────────────────
