//! Pixel-to-address mapping and the snapshot producer.
//!
//! Every pixel becomes one IPv6 address under a fixed /48 prefix:
//!
//! ```text
//! {prefix}:{x + oX}:{y + oY}:{r}:{g}:{b}
//!           decimal   decimal  hex hex hex
//! ```
//!
//! The offset `(oX, oY)` drifts once per generation cycle, which slides
//! the drawn image across the address range.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::FloodContext;
use crate::error::PaintError;
use crate::pixel::Pixel;
use crate::snapshot::Snapshot;

// ── Constants ────────────────────────────────────────────────────

/// The /48 every generated address lives under.
pub const DEFAULT_PREFIX: &str = "2A06:1E81:F147";

/// Time between two published snapshots.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

// ── Offset ───────────────────────────────────────────────────────

/// How the offset moves between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetDrift {
    pub step_x: u32,
    /// Zero by default: the vertical offset has never moved.
    pub step_y: u32,
    /// An axis that grows past this value wraps back to zero.
    pub bound: u32,
}

impl Default for OffsetDrift {
    fn default() -> Self {
        Self {
            step_x: 100,
            step_y: 0,
            bound: 500,
        }
    }
}

/// Coordinate offset added to every pixel before encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Offset {
    pub x: u32,
    pub y: u32,
}

impl Offset {
    pub const ORIGIN: Offset = Offset { x: 0, y: 0 };

    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Step both axes, wrapping each to zero once it exceeds the bound.
    pub fn advance(&mut self, drift: &OffsetDrift) {
        self.x = self.x.wrapping_add(drift.step_x);
        self.y = self.y.wrapping_add(drift.step_y);

        if self.x > drift.bound {
            self.x = 0;
        }
        if self.y > drift.bound {
            self.y = 0;
        }
    }
}

// ── Address mapping ──────────────────────────────────────────────

/// Render the textual address for one pixel.
pub fn format_address(prefix: &str, pixel: &Pixel, offset: Offset) -> String {
    format!(
        "{prefix}:{}:{}:{:x}:{:x}:{:x}",
        u64::from(pixel.x) + u64::from(offset.x),
        u64::from(pixel.y) + u64::from(offset.y),
        pixel.r,
        pixel.g,
        pixel.b,
    )
}

/// Parse a generated address into a socket address ready for `sendto`.
pub fn resolve_address(address: &str) -> Result<SocketAddr, PaintError> {
    address
        .parse::<Ipv6Addr>()
        .map(|ip| SocketAddr::new(IpAddr::V6(ip), 0))
        .map_err(|source| PaintError::AddressResolution {
            address: address.to_string(),
            source,
        })
}

/// Map every pixel through `offset` into a fresh target list.
///
/// Order follows `pixels`; one target per pixel.
pub fn build_targets(
    pixels: &[Pixel],
    prefix: &str,
    offset: Offset,
) -> Result<Vec<SocketAddr>, PaintError> {
    pixels
        .iter()
        .map(|pixel| resolve_address(&format_address(prefix, pixel, offset)))
        .collect()
}

// ── AddressGenerator ─────────────────────────────────────────────

/// Single producer of address snapshots.
#[derive(Debug)]
pub struct AddressGenerator {
    pixels: Vec<Pixel>,
    prefix: String,
    drift: OffsetDrift,
    offset: Offset,
    interval: Duration,
    generation: u64,
}

impl AddressGenerator {
    pub fn new(pixels: Vec<Pixel>, prefix: impl Into<String>, drift: OffsetDrift) -> Self {
        Self {
            pixels,
            prefix: prefix.into(),
            drift,
            offset: Offset::ORIGIN,
            interval: DEFAULT_PUBLISH_INTERVAL,
            generation: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start from an explicit offset instead of the origin.
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Advance the offset and build the snapshot for it.
    pub fn next_snapshot(&mut self) -> Result<Snapshot, PaintError> {
        self.offset.advance(&self.drift);
        let targets = build_targets(&self.pixels, &self.prefix, self.offset)?;
        self.generation += 1;
        Ok(Snapshot::new(self.generation, self.offset, targets))
    }

    /// Publish a new snapshot every interval until cancelled.
    ///
    /// Returns only on cancellation (`Ok`) or on a resolution failure,
    /// which the engine treats as fatal.
    pub async fn run(mut self, ctx: Arc<FloodContext>) -> Result<(), PaintError> {
        info!(
            "address generator started: {} pixels under {}::/48",
            self.pixels.len(),
            self.prefix
        );

        while !ctx.cancel.is_cancelled() {
            let snapshot = self.next_snapshot()?;
            info!(
                generation = snapshot.generation(),
                offset_x = snapshot.offset().x,
                offset_y = snapshot.offset().y,
                targets = snapshot.len(),
                "stored new snapshot"
            );
            ctx.snapshots.publish(snapshot);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = ctx.cancel.cancelled() => break,
            }
        }

        info!("address generator stopped after {} snapshots", self.generation);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn px(x: u32, y: u32, r: u8, g: u8, b: u8) -> Pixel {
        Pixel::new(x, y, [r, g, b, 255])
    }

    #[test]
    fn offset_wraps_past_bound() {
        let drift = OffsetDrift::default();
        let mut offset = Offset::ORIGIN;
        let mut seen = Vec::new();
        for _ in 0..7 {
            offset.advance(&drift);
            seen.push(offset.x);
        }
        assert_eq!(seen, vec![100, 200, 300, 400, 500, 0, 100]);
    }

    #[test]
    fn vertical_offset_stays_put_by_default() {
        let drift = OffsetDrift::default();
        let mut offset = Offset::ORIGIN;
        for _ in 0..20 {
            offset.advance(&drift);
            assert_eq!(offset.y, 0);
        }
    }

    #[test]
    fn vertical_offset_moves_when_stepped() {
        let drift = OffsetDrift {
            step_x: 0,
            step_y: 250,
            bound: 500,
        };
        let mut offset = Offset::ORIGIN;
        offset.advance(&drift);
        offset.advance(&drift);
        assert_eq!(offset, Offset::new(0, 500));
        offset.advance(&drift);
        assert_eq!(offset, Offset::new(0, 0));
    }

    #[test]
    fn formats_coordinates_decimal_and_channels_hex() {
        let addr = format_address(DEFAULT_PREFIX, &px(12, 34, 0xab, 0x0f, 0), Offset::new(100, 0));
        assert_eq!(addr, "2A06:1E81:F147:112:34:ab:f:0");
    }

    #[test]
    fn resolves_to_port_zero_v6() {
        let addr = resolve_address("2A06:1E81:F147:1:0:4:5:6").unwrap();
        assert_eq!(addr.port(), 0);
        assert_eq!(
            addr.ip(),
            IpAddr::V6(Ipv6Addr::new(0x2a06, 0x1e81, 0xf147, 1, 0, 4, 5, 6))
        );
    }

    #[test]
    fn oversized_coordinate_is_resolution_error() {
        let err = build_targets(&[px(70_000, 0, 0, 0, 0)], DEFAULT_PREFIX, Offset::ORIGIN)
            .unwrap_err();
        match err {
            PaintError::AddressResolution { address, .. } => {
                assert_eq!(address, "2A06:1E81:F147:70000:0:0:0:0")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_prefix_is_resolution_error() {
        let err = build_targets(&[px(0, 0, 0, 0, 0)], "not-an-address", Offset::ORIGIN);
        assert!(matches!(err, Err(PaintError::AddressResolution { .. })));
    }

    #[test]
    fn generator_advances_before_building() {
        let mut generator =
            AddressGenerator::new(vec![px(1, 2, 3, 4, 5)], DEFAULT_PREFIX, OffsetDrift::default());
        let first = generator.next_snapshot().unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(first.offset(), Offset::new(100, 0));
        assert_eq!(
            first.targets()[0],
            resolve_address("2A06:1E81:F147:101:2:3:4:5").unwrap()
        );

        let second = generator.next_snapshot().unwrap();
        assert_eq!(second.generation(), 2);
        assert_eq!(second.offset(), Offset::new(200, 0));
    }

    /// Counts INFO events from this module that carry a `generation` field.
    struct SnapshotLogCounter(Arc<std::sync::atomic::AtomicU64>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SnapshotLogCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let meta = event.metadata();
            if *meta.level() == tracing::Level::INFO
                && meta.target() == module_path!()
                && meta.fields().field("generation").is_some()
            {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_publish_is_logged_at_info() {
        use tracing_subscriber::layer::SubscriberExt;

        let lines = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let subscriber =
            tracing_subscriber::registry().with(SnapshotLogCounter(Arc::clone(&lines)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let ctx = Arc::new(FloodContext::default());
        let generator =
            AddressGenerator::new(vec![px(1, 2, 3, 4, 5)], DEFAULT_PREFIX, OffsetDrift::default())
                .with_interval(Duration::from_secs(1));
        let task = tokio::spawn(generator.run(Arc::clone(&ctx)));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        ctx.cancel.cancel();
        task.await.unwrap().unwrap();

        let published = ctx.snapshots.generation();
        assert_eq!(published, 3);
        assert_eq!(lines.load(std::sync::atomic::Ordering::Relaxed), published);
    }

    proptest! {
        #[test]
        fn same_input_same_targets(
            raw in proptest::collection::vec((0u32..500, 0u32..500, any::<[u8; 4]>()), 0..64),
            ox in 0u32..=500,
            oy in 0u32..=500,
        ) {
            let pixels: Vec<Pixel> = raw.iter().map(|&(x, y, c)| Pixel::new(x, y, c)).collect();
            let offset = Offset::new(ox, oy);
            let a = build_targets(&pixels, DEFAULT_PREFIX, offset).unwrap();
            let b = build_targets(&pixels, DEFAULT_PREFIX, offset).unwrap();
            prop_assert_eq!(a.len(), pixels.len());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn pixel_order_does_not_change_target_set(
            raw in proptest::collection::vec((0u32..500, 0u32..500, any::<[u8; 4]>()), 1..64),
            rotate in 0usize..64,
        ) {
            let pixels: Vec<Pixel> = raw.iter().map(|&(x, y, c)| Pixel::new(x, y, c)).collect();
            let mut reordered = pixels.clone();
            reordered.reverse();
            let by = rotate % reordered.len();
            reordered.rotate_left(by);

            let mut a = build_targets(&pixels, DEFAULT_PREFIX, Offset::ORIGIN).unwrap();
            let mut b = build_targets(&reordered, DEFAULT_PREFIX, Offset::ORIGIN).unwrap();
            a.sort();
            b.sort();
            prop_assert_eq!(a, b);
        }
    }
}
