//! Flooder service lifecycle.
//!
//! Samples the configured image, builds the flood engine and runs it
//! against raw ICMPv6 sockets until stopped.

use std::future::Future;
use std::io;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use v6paint_core::{EngineReport, FloodEngine, ImageSampler, PaintError, Pixel, raw_icmpv6};

use crate::config::PaintConfig;

// ── PaintService ─────────────────────────────────────────────────

/// The top-level flooder service.
///
/// Owns a ready-to-run engine; the image has already been sampled.
pub struct PaintService {
    engine: FloodEngine,
}

impl PaintService {
    /// Decode, scale and shuffle the configured image, then build the
    /// engine. Image errors are fatal.
    pub fn prepare(config: &PaintConfig) -> Result<Self, PaintError> {
        let sampler = ImageSampler::new(&config.image.path)
            .with_target_width(config.image.target_width);
        let pixels = sampler.sample(&mut rand::thread_rng())?;
        info!("generating done: {} pixels", pixels.len());
        Ok(Self::from_pixels(config, pixels))
    }

    /// Build the service around pixels sampled elsewhere.
    pub fn from_pixels(config: &PaintConfig, pixels: Vec<Pixel>) -> Self {
        Self {
            engine: FloodEngine::new(config.to_engine_config(), pixels),
        }
    }

    /// Signal every task to stop.
    pub fn stop(&self) {
        self.engine.stop_handle().cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.engine.stop_handle().is_cancelled()
    }

    /// Stop the service when the process receives Ctrl-C.
    pub fn stop_on_ctrl_c(&self) -> JoinHandle<()> {
        self.stop_on_signal(tokio::signal::ctrl_c())
    }

    /// Stop the service once `signal` resolves.
    ///
    /// If the listener itself fails the service keeps running.
    pub fn stop_on_signal<F>(&self, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let stop = self.engine.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = signal.await {
                warn!("cannot listen for Ctrl-C: {e}; stop the process another way");
                return;
            }
            info!("Ctrl-C received, shutting down");
            stop.cancel();
        })
    }

    /// Run until stopped or until a fatal error.
    ///
    /// Opening the raw sockets needs `CAP_NET_RAW` (or root).
    pub async fn run(self) -> Result<EngineReport, PaintError> {
        let cfg = self.engine.config();
        info!(
            "flooding {}::/48 with {} senders",
            cfg.prefix, cfg.workers
        );
        self.engine.run(raw_icmpv6).await
    }
}

// ── Tests ────────────────────────────────────────────────────────
