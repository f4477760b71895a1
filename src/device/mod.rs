//! Capture device abstraction.
//!
//! The sensor driver itself (device discovery, decoding, calibration register
//! semantics) lives behind the [`Device`] trait; this crate only drives the
//! session lifecycle around it. A backend implements [`Device`] plus a
//! [`DeviceProvider`] that opens a fresh handle per session. The shipped
//! [`synthetic`] backend produces timed dummy batches so the whole pipeline
//! runs without hardware.

pub mod bias;
pub mod synthetic;

use std::path::Path;
use std::time::Duration;

use crate::core::errors::Result;

/// One opaque batch delivered by the device feed. The payload itself is
/// written to the raw log by the device; the session only sees its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBatch {
    /// Bytes appended to the raw log for this batch.
    pub bytes: u64,
    /// Event count, when the backend knows it.
    pub events: u64,
}

/// Result of one bounded poll of the device feed.
///
/// `Idle` means the wait elapsed without a delivery. The session runs its
/// limit checks on idle ticks too, so a quiescent or disconnected feed can
/// never starve the time-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPoll {
    /// A batch was delivered and logged.
    Batch(EventBatch),
    /// Nothing arrived within the wait window.
    Idle,
    /// The feed has ended; no further batches will arrive.
    Ended,
}

/// Per-key bias application failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiasError {
    /// The device has no bias interface at all.
    Unsupported,
    /// This register rejected the value.
    Rejected(String),
}

impl std::fmt::Display for BiasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "bias interface unavailable"),
            Self::Rejected(details) => write!(f, "{details}"),
        }
    }
}

/// A live capture device, exclusively owned by one session at a time.
///
/// Lifecycle per session: `set_bias`* → rate limiter setup → `begin_log` →
/// `start_stream` → `poll_batch`* → `stop_stream` → `end_log` → drop.
pub trait Device {
    /// Set one named calibration register. Best-effort; see `BiasApplier`.
    fn set_bias(&mut self, name: &str, value: i64) -> std::result::Result<(), BiasError>;

    /// Whether the device carries an event-rate-control facility.
    fn rate_limiter_available(&self) -> bool;

    fn enable_rate_limiter(&mut self, enabled: bool) -> Result<()>;

    /// Ceiling in events per second. Only valid after `enable_rate_limiter`.
    fn set_rate_limit(&mut self, events_per_sec: u64) -> Result<()>;

    fn start_stream(&mut self) -> Result<()>;

    /// Stop producing new batches. The feed drains and then reports `Ended`.
    fn stop_stream(&mut self) -> Result<()>;

    /// Open the raw output file; every delivered batch is appended to it.
    fn begin_log(&mut self, path: &Path) -> Result<()>;

    /// Close the raw output file. Idempotent.
    fn end_log(&mut self) -> Result<()>;

    /// Wait up to `max_wait` for the next batch.
    fn poll_batch(&mut self, max_wait: Duration) -> Result<FeedPoll>;
}

/// Opens a fresh device for each session.
///
/// Open failure is fatal for the process: there is no retry on a camera that
/// cannot be acquired.
pub trait DeviceProvider {
    fn open(&self) -> Result<Box<dyn Device>>;
}
