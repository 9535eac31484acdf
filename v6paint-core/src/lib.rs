//! # v6paint-core
//!
//! Address-generation and flood engine for drawing an image into an
//! IPv6 range with ICMPv6 echo requests.
//!
//! This crate contains:
//! - **Pixels**: `ImageSampler` decodes, scales and shuffles the source image
//! - **Addresses**: `AddressGenerator` maps pixels plus a drifting `Offset` to targets
//! - **Snapshots**: `SnapshotStore`, the lock-free published target list
//! - **Echo**: `EchoTemplate`, the one serialized ICMPv6 echo request
//! - **Senders**: `SenderPool` of raw-socket workers with private cursors
//! - **Rate**: `PacketCounter` and `RateMonitor` for throughput reporting
//! - **Engine**: `FloodEngine` and the shared `FloodContext`
//! - **Error**: `PaintError` and `SendFailure`, `thiserror`-based

pub mod address;
pub mod echo;
pub mod engine;
pub mod error;
pub mod pixel;
pub mod rate;
pub mod sender;
pub mod snapshot;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use address::{AddressGenerator, DEFAULT_PREFIX, Offset, OffsetDrift};
pub use echo::EchoTemplate;
pub use engine::{EngineConfig, EngineReport, FloodContext, FloodEngine};
pub use error::{PaintError, SendFailure};
pub use pixel::{ImageSampler, Pixel};
pub use rate::{PacketCounter, RateMonitor, RateSample};
pub use sender::{
    ClampPolicy, Cursor, EchoSink, RawIcmpSocket, Sender, SenderPool, SenderStats, SinkFactory,
    StepOutcome, raw_icmpv6,
};
pub use snapshot::{Snapshot, SnapshotStore};
