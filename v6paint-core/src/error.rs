//! Domain-specific error types for the flood engine.
//!
//! Fatal conditions surface as [`PaintError`] and end the engine.
//! Per-send failures are classified as [`SendFailure`] and never leave
//! the sender loop.

use std::io;
use std::net::AddrParseError;

use thiserror::Error;

/// The canonical error type for v6paint.
#[derive(Debug, Error)]
pub enum PaintError {
    // ── Input Errors ─────────────────────────────────────────────
    /// The source image could not be opened or decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // ── Generation Errors ────────────────────────────────────────
    /// A generated address string did not parse as IPv6.
    ///
    /// This means the prefix or the pixel coordinates produced a
    /// malformed group, which will not fix itself on the next cycle.
    #[error("cannot resolve generated address {address:?}: {source}")]
    AddressResolution {
        address: String,
        #[source]
        source: AddrParseError,
    },

    // ── Socket Errors ────────────────────────────────────────────
    /// A sender could not open its raw ICMPv6 socket.
    #[error("failed to open raw ICMPv6 socket for worker {worker}: {source}")]
    SocketOpen {
        worker: usize,
        #[source]
        source: io::Error,
    },

    // ── Task Errors ─────────────────────────────────────────────
    /// A spawned task panicked or could not be joined.
    #[error("task error: {0}")]
    Task(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl PaintError {
    /// Whether this error must take the whole process down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PaintError::Other(_))
    }
}

impl From<tokio::task::JoinError> for PaintError {
    fn from(e: tokio::task::JoinError) -> Self {
        PaintError::Task(e.to_string())
    }
}

impl From<String> for PaintError {
    fn from(s: String) -> Self {
        PaintError::Other(s)
    }
}

impl From<&str> for PaintError {
    fn from(s: &str) -> Self {
        PaintError::Other(s.to_string())
    }
}

// ── SendFailure ──────────────────────────────────────────────────

/// Classification of a failed `sendto` on a raw socket.
#[derive(Debug)]
pub enum SendFailure {
    /// The kernel had no buffer space left. Expected under load; the
    /// iteration is dropped without retry.
    BufferFull,
    /// Anything else. Logged, then the loop carries on.
    Unexpected(io::Error),
}

impl SendFailure {
    pub fn classify(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::WouldBlock {
            return SendFailure::BufferFull;
        }
        #[cfg(unix)]
        {
            if err.raw_os_error() == Some(libc::ENOBUFS) {
                return SendFailure::BufferFull;
            }
        }
        SendFailure::Unexpected(err)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SendFailure::BufferFull)
    }
}
