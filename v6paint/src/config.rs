//! Configuration for the v6paint flooder.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use v6paint_core::{ClampPolicy, EngineConfig, OffsetDrift};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintConfig {
    /// Source image settings.
    pub image: ImageConfig,
    /// Address generation settings.
    pub address: AddressConfig,
    /// Sender pool settings.
    pub sender: SenderConfig,
    /// Rate monitor settings.
    pub monitor: MonitorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image to draw, read once at startup.
    pub path: String,
    /// Width the image is scaled to; height keeps the aspect ratio.
    pub target_width: u32,
}

/// Address generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    /// First three groups of every address (a /48).
    pub prefix: String,
    /// Horizontal offset step per snapshot.
    pub step_x: u32,
    /// Vertical offset step per snapshot.
    pub step_y: u32,
    /// Offsets wrap to zero once they exceed this.
    pub bound: u32,
    /// Milliseconds between published snapshots.
    pub publish_interval_ms: u64,
}

/// Sender pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Number of concurrent raw-socket senders.
    pub workers: usize,
    /// Cursor clamp policy: "literal" or "rewind".
    pub clamp: String,
    /// ICMPv6 echo identifier.
    pub echo_identifier: u16,
    /// ICMPv6 echo sequence number.
    pub echo_sequence: u16,
}

/// Rate monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between throughput reports.
    pub report_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            path: "image.png".into(),
            target_width: v6paint_core::pixel::DEFAULT_TARGET_WIDTH,
        }
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        let drift = OffsetDrift::default();
        Self {
            prefix: v6paint_core::DEFAULT_PREFIX.into(),
            step_x: drift.step_x,
            step_y: drift.step_y,
            bound: drift.bound,
            publish_interval_ms: 1000,
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            workers: v6paint_core::sender::DEFAULT_WORKERS,
            clamp: "literal".into(),
            echo_identifier: 0,
            echo_sequence: 0,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl PaintConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the engine's configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        let clamp = self.sender.clamp.parse::<ClampPolicy>().unwrap_or_else(|e| {
            warn!("{e}; using literal clamp");
            ClampPolicy::Literal
        });

        EngineConfig {
            prefix: self.address.prefix.clone(),
            drift: OffsetDrift {
                step_x: self.address.step_x,
                step_y: self.address.step_y,
                bound: self.address.bound,
            },
            publish_interval: Duration::from_millis(self.address.publish_interval_ms.max(1)),
            workers: self.sender.workers.max(1),
            clamp,
            report_interval: Duration::from_millis(self.monitor.report_interval_ms.max(1)),
            echo_identifier: self.sender.echo_identifier,
            echo_sequence: self.sender.echo_sequence,
            echo_payload: Vec::new(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
