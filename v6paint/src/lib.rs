//! # v6paint: IPv6 canvas flooder
//!
//! Draws an image into an IPv6 range: every pixel becomes one address
//! under a /48, and a pool of raw-socket senders pings those addresses
//! continuously while the image drifts across the range.
//!
//! The engine lives in `v6paint-core`; this crate adds the TOML
//! configuration, the service lifecycle and the command line.

pub mod config;
pub mod service;
