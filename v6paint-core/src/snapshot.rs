//! The published address list and its store.
//!
//! One writer (the address generator) swaps whole snapshots in; many
//! readers (the senders) load whichever one is current. A snapshot is
//! never mutated once built, so a reader holding an `Arc<Snapshot>`
//! keeps a consistent view for as long as it wants.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio::sync::watch;

use crate::address::Offset;

// ── Snapshot ─────────────────────────────────────────────────────

/// One fully-built target list for a single offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    generation: u64,
    offset: Offset,
    targets: Vec<SocketAddr>,
}

impl Snapshot {
    pub fn new(generation: u64, offset: Offset, targets: Vec<SocketAddr>) -> Self {
        Self {
            generation,
            offset,
            targets,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    pub fn get(&self, index: usize) -> Option<&SocketAddr> {
        self.targets.get(index)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// ── SnapshotStore ────────────────────────────────────────────────

/// Lock-free holder of the current [`Snapshot`].
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
    published: AtomicU64,
    ready: watch::Sender<bool>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            current: ArcSwapOption::empty(),
            published: AtomicU64::new(0),
            ready,
        }
    }

    /// Replace the current snapshot.
    ///
    /// Only the address generator calls this.
    pub fn publish(&self, snapshot: Snapshot) {
        self.current.store(Some(Arc::new(snapshot)));
        if self.published.fetch_add(1, Ordering::AcqRel) == 0 {
            self.ready.send_replace(true);
        }
    }

    /// The latest snapshot, or `None` before the first publish.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Resolve once the first snapshot has been published.
    pub async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("generation", &self.generation())
            .field("current_len", &self.current().map(|s| s.len()))
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
