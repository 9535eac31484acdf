//! The sender pool.
//!
//! Each worker owns one raw ICMPv6 socket and a private cursor into
//! whatever snapshot is current. Workers never coordinate: two of them
//! may hit the same target at the same instant.

use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::engine::FloodContext;
use crate::error::{PaintError, SendFailure};
use crate::snapshot::Snapshot;

/// Default number of concurrent senders.
pub const DEFAULT_WORKERS: usize = 100;

/// Iterations between two looks at the cancellation token.
const CANCEL_CHECK_INTERVAL: u32 = 256;

// ── Sinks ────────────────────────────────────────────────────────

/// Anything an echo request can be written to.
pub trait EchoSink: Send + 'static {
    fn send_to(&self, packet: &[u8], target: &SocketAddr) -> io::Result<usize>;
}

/// Creates the sink for worker `n`.
pub trait SinkFactory<S>: Fn(usize) -> io::Result<S> + Send + Sync + 'static {}

impl<F, S> SinkFactory<S> for F where F: Fn(usize) -> io::Result<S> + Send + Sync + 'static {}

/// A raw `IPPROTO_ICMPV6` socket. Needs `CAP_NET_RAW` or root.
#[derive(Debug)]
pub struct RawIcmpSocket {
    inner: Socket,
}

impl RawIcmpSocket {
    pub fn open() -> io::Result<Self> {
        let inner = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))?;
        Ok(Self { inner })
    }
}

impl EchoSink for RawIcmpSocket {
    fn send_to(&self, packet: &[u8], target: &SocketAddr) -> io::Result<usize> {
        self.inner.send_to(packet, &SockAddr::from(*target))
    }
}

/// [`SinkFactory`] for real raw sockets.
pub fn raw_icmpv6(_worker: usize) -> io::Result<RawIcmpSocket> {
    RawIcmpSocket::open()
}

// ── Cursor ───────────────────────────────────────────────────────

/// How a cursor that ran past the end of a snapshot is pulled back in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClampPolicy {
    /// `min(cursor, last)`. A random rewind is nominally applied when
    /// the cursor is still past the end afterwards, which never happens,
    /// so an overflowing cursor pins to the last index.
    #[default]
    Literal,
    /// An overflowing cursor jumps back by a random amount below `last`.
    Rewind,
}

impl FromStr for ClampPolicy {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "literal" => Ok(ClampPolicy::Literal),
            "rewind" => Ok(ClampPolicy::Rewind),
            other => Err(PaintError::Other(format!("unknown clamp policy: {other}"))),
        }
    }
}

/// Per-sender position into the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    pub const fn at(position: usize) -> Self {
        Self { position }
    }

    /// A non-negative random start, as wide as the platform word allows.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::at(rng.r#gen::<usize>() >> 1)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Pull the cursor into `[0, len - 1]` and return it.
    ///
    /// `None` for an empty snapshot; the cursor is left alone.
    pub fn clamp<R: Rng + ?Sized>(
        &mut self,
        len: usize,
        policy: ClampPolicy,
        rng: &mut R,
    ) -> Option<usize> {
        let last = len.checked_sub(1)?;
        match policy {
            ClampPolicy::Literal => {
                self.position = self.position.min(last);
            }
            ClampPolicy::Rewind => {
                if self.position > last {
                    self.position = if last == 0 {
                        0
                    } else {
                        last - rng.gen_range(0..last)
                    };
                }
            }
        }
        Some(self.position)
    }

    /// Move one step forward. Wrapping is left to the next clamp.
    pub fn advance(&mut self) {
        self.position = self.position.saturating_add(1);
    }
}

// ── Sender ───────────────────────────────────────────────────────

/// Result of a single send iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No snapshot yet, or an empty one. Nothing sent.
    Idle,
    /// The template went out to this target.
    Sent(SocketAddr),
    /// The kernel send buffer was full; iteration dropped.
    BufferFull,
    /// Some other send error; logged and ignored.
    Failed,
}

/// Per-worker totals, reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub sent: u64,
    pub buffer_full: u64,
    pub failed: u64,
}

impl SenderStats {
    /// Fold another worker's totals into these.
    pub fn merge(&mut self, other: SenderStats) {
        self.sent += other.sent;
        self.buffer_full += other.buffer_full;
        self.failed += other.failed;
    }

    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Sent(_) => self.sent += 1,
            StepOutcome::BufferFull => self.buffer_full += 1,
            StepOutcome::Failed => self.failed += 1,
            StepOutcome::Idle => {}
        }
    }
}

/// One worker: a sink, a cursor and a cached view of the snapshot.
pub struct Sender<S> {
    id: usize,
    sink: S,
    cursor: Cursor,
    policy: ClampPolicy,
    rng: StdRng,
    snapshot: Option<Arc<Snapshot>>,
    seen_generation: u64,
}

impl<S: EchoSink> Sender<S> {
    pub fn new(id: usize, sink: S, policy: ClampPolicy) -> Self {
        let mut rng = StdRng::from_entropy();
        let cursor = Cursor::random(&mut rng);
        Self {
            id,
            sink,
            cursor,
            policy,
            rng,
            snapshot: None,
            seen_generation: 0,
        }
    }

    /// Start from a fixed cursor and seed instead of random ones.
    pub fn with_cursor(mut self, cursor: Cursor, seed: u64) -> Self {
        self.cursor = cursor;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Pick up a newer snapshot if one was published since the last look.
    fn refresh(&mut self, ctx: &FloodContext) {
        let generation = ctx.snapshots.generation();
        if generation != self.seen_generation || self.snapshot.is_none() {
            self.snapshot = ctx.snapshots.current();
            self.seen_generation = generation;
        }
    }

    /// Run one iteration of the send loop.
    pub fn step(&mut self, ctx: &FloodContext) -> StepOutcome {
        self.refresh(ctx);

        let Some(snapshot) = self.snapshot.as_deref() else {
            return StepOutcome::Idle;
        };
        let Some(index) = self.cursor.clamp(snapshot.len(), self.policy, &mut self.rng) else {
            return StepOutcome::Idle;
        };
        let target = snapshot.targets()[index];

        match self.sink.send_to(ctx.template.as_bytes(), &target) {
            Ok(_) => {
                ctx.counter.record();
                self.cursor.advance();
                StepOutcome::Sent(target)
            }
            Err(e) => match SendFailure::classify(e) {
                SendFailure::BufferFull => StepOutcome::BufferFull,
                SendFailure::Unexpected(e) => {
                    warn!(worker = self.id, %target, "send failed: {e}");
                    StepOutcome::Failed
                }
            },
        }
    }

    /// Send until the context is cancelled. Blocks the calling thread.
    pub fn run_blocking(mut self, ctx: Arc<FloodContext>) -> SenderStats {
        let mut stats = SenderStats::default();
        let mut until_check = 0u32;

        loop {
            if until_check == 0 {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                until_check = CANCEL_CHECK_INTERVAL;
            }
            until_check -= 1;

            let outcome = self.step(&ctx);
            if outcome == StepOutcome::Idle {
                std::hint::spin_loop();
            }
            stats.record(outcome);
        }

        debug!(
            worker = self.id,
            sent = stats.sent,
            buffer_full = stats.buffer_full,
            failed = stats.failed,
            "sender stopped"
        );
        stats
    }
}

// ── SenderPool ───────────────────────────────────────────────────

/// A fixed set of senders, each with its socket already open.
pub struct SenderPool<S> {
    senders: Vec<Sender<S>>,
}

impl<S: EchoSink> SenderPool<S> {
    /// Open one sink per worker. The first failure aborts the pool.
    pub fn open<F>(workers: usize, policy: ClampPolicy, factory: &F) -> Result<Self, PaintError>
    where
        F: SinkFactory<S>,
    {
        let senders = (0..workers)
            .map(|worker| {
                factory(worker)
                    .map(|sink| Sender::new(worker, sink, policy))
                    .map_err(|source| PaintError::SocketOpen { worker, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { senders })
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Launch every sender.
    ///
    /// Each waits for the first snapshot (or cancellation) on the async
    /// runtime, then moves to a blocking thread for the send loop.
    pub fn spawn(self, ctx: Arc<FloodContext>) -> JoinSet<Result<SenderStats, PaintError>> {
        let mut set = JoinSet::new();
        for sender in self.senders {
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                tokio::select! {
                    _ = ctx.snapshots.ready() => {}
                    _ = ctx.cancel.cancelled() => return Ok(SenderStats::default()),
                }
                tokio::task::spawn_blocking(move || sender.run_blocking(ctx))
                    .await
                    .map_err(PaintError::from)
            });
        }
        set
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Offset;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records every target and fails on demand.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<SocketAddr>>,
        fail_with: Option<fn() -> io::Error>,
    }

    impl EchoSink for RecordingSink {
        fn send_to(&self, packet: &[u8], target: &SocketAddr) -> io::Result<usize> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            self.sent.lock().unwrap().push(*target);
            Ok(packet.len())
        }
    }

    fn addr(i: u16) -> SocketAddr {
        SocketAddr::from(([0x2a06, 0x1e81, 0xf147, i, 0, 0, 0, 0], 0))
    }

    fn ctx_with(n: u16) -> FloodContext {
        let ctx = FloodContext::default();
        ctx.snapshots
            .publish(Snapshot::new(1, Offset::ORIGIN, (0..n).map(addr).collect()));
        ctx
    }

    fn sender(sink: RecordingSink, cursor: usize, policy: ClampPolicy) -> Sender<RecordingSink> {
        Sender::new(0, sink, policy).with_cursor(Cursor::at(cursor), 1)
    }

    #[test]
    fn idle_before_first_publish() {
        let ctx = FloodContext::default();
        let mut s = sender(RecordingSink::default(), 0, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::Idle);
        assert_eq!(ctx.counter.pending(), 0);
        assert!(s.sink().sent.lock().unwrap().is_empty());
    }

    #[test]
    fn idle_on_empty_snapshot() {
        let ctx = ctx_with(0);
        let mut s = sender(RecordingSink::default(), 5, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::Idle);
        assert_eq!(ctx.counter.pending(), 0);
        assert_eq!(s.cursor(), Cursor::at(5));
    }

    #[test]
    fn walks_forward_and_counts() {
        let ctx = ctx_with(4);
        let mut s = sender(RecordingSink::default(), 1, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(1)));
        assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(2)));
        assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(3)));
        assert_eq!(ctx.counter.pending(), 3);
    }

    #[test]
    fn literal_policy_pins_to_last_target() {
        let ctx = ctx_with(4);
        let mut s = sender(RecordingSink::default(), usize::MAX >> 1, ClampPolicy::Literal);
        for _ in 0..5 {
            assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(3)));
        }
    }

    #[test]
    fn buffer_full_is_dropped_silently() {
        let sink = RecordingSink {
            fail_with: Some(|| io::Error::from(io::ErrorKind::WouldBlock)),
            ..Default::default()
        };
        let ctx = ctx_with(4);
        let mut s = sender(sink, 2, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::BufferFull);
        assert_eq!(ctx.counter.pending(), 0);
        assert_eq!(s.cursor(), Cursor::at(2));
    }

    #[test]
    fn unexpected_error_does_not_advance() {
        let sink = RecordingSink {
            fail_with: Some(|| io::Error::from(io::ErrorKind::PermissionDenied)),
            ..Default::default()
        };
        let ctx = ctx_with(4);
        let mut s = sender(sink, 2, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::Failed);
        assert_eq!(s.step(&ctx), StepOutcome::Failed);
        assert_eq!(ctx.counter.pending(), 0);
        assert_eq!(s.cursor(), Cursor::at(2));
    }

    #[test]
    fn picks_up_newer_snapshot() {
        let ctx = ctx_with(2);
        let mut s = sender(RecordingSink::default(), 0, ClampPolicy::Literal);
        assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(0)));

        let newer = vec![addr(100), addr(101)];
        ctx.snapshots.publish(Snapshot::new(2, Offset::new(100, 0), newer));
        assert_eq!(s.step(&ctx), StepOutcome::Sent(addr(101)));
    }

    #[test]
    fn pool_open_failure_names_worker() {
        let factory = |worker: usize| {
            if worker == 3 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                Ok(RecordingSink::default())
            }
        };
        match SenderPool::<RecordingSink>::open(5, ClampPolicy::Literal, &factory) {
            Err(PaintError::SocketOpen { worker, .. }) => assert_eq!(worker, 3),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("pool should not open"),
        }
    }

    #[test]
    fn clamp_policy_from_str() {
        assert_eq!("literal".parse::<ClampPolicy>().unwrap(), ClampPolicy::Literal);
        assert_eq!("Rewind".parse::<ClampPolicy>().unwrap(), ClampPolicy::Rewind);
        assert!("modulo".parse::<ClampPolicy>().is_err());
    }

    fn policy() -> impl Strategy<Value = ClampPolicy> {
        prop_oneof![Just(ClampPolicy::Literal), Just(ClampPolicy::Rewind)]
    }

    proptest! {
        #[test]
        fn clamp_stays_in_bounds(
            len in 1usize..10_000,
            start in any::<usize>(),
            policy in policy(),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut cursor = Cursor::at(start);
            let index = cursor.clamp(len, policy, &mut rng).unwrap();
            prop_assert!(index < len);
            prop_assert_eq!(index, cursor.position());
        }

        #[test]
        fn clamp_leaves_in_range_cursor_alone(
            len in 1usize..10_000,
            frac in 0.0f64..1.0,
            policy in policy(),
        ) {
            let start = ((len as f64) * frac) as usize;
            let start = start.min(len - 1);
            let mut rng = StdRng::seed_from_u64(0);
            let mut cursor = Cursor::at(start);
            prop_assert_eq!(cursor.clamp(len, policy, &mut rng), Some(start));
        }

        #[test]
        fn literal_overflow_lands_on_last(len in 1usize..10_000, over in 0usize..1_000_000) {
            let mut rng = StdRng::seed_from_u64(0);
            let mut cursor = Cursor::at(len + over);
            prop_assert_eq!(cursor.clamp(len, ClampPolicy::Literal, &mut rng), Some(len - 1));
        }

        #[test]
        fn rewind_overflow_lands_after_first(
            len in 2usize..10_000,
            over in 0usize..1_000_000,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut cursor = Cursor::at(len + over);
            let index = cursor.clamp(len, ClampPolicy::Rewind, &mut rng).unwrap();
            prop_assert!(index >= 1 && index <= len - 1);
        }
    }

    #[test]
    fn clamp_on_empty_is_none() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut cursor = Cursor::at(9);
        assert_eq!(cursor.clamp(0, ClampPolicy::Rewind, &mut rng), None);
        assert_eq!(cursor.position(), 9);
    }

    #[test]
    fn rewind_single_target() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut cursor = Cursor::at(42);
        assert_eq!(cursor.clamp(1, ClampPolicy::Rewind, &mut rng), Some(0));
    }
}
