//! # Monotonic Clock
//!
//! Time source shared by the channels, the supervisor and the autopilot.
//! Timestamps are relative to the clock's creation and never go backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Instant;

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock started
    fn now_ms(&self) -> u64 {
        self.now_micros() / 1000
    }

    /// Microseconds since the clock started
    fn now_micros(&self) -> u64;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Real clock backed by [`tokio::time::Instant`]
///
/// Follows tokio's paused test clock when one is active.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// New clock wrapped for sharing
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Clock advanced by hand, for replay and tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance_ms(&self, ms: u64) {
        self.micros.fetch_add(ms * 1000, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance_micros(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }

    /// Jump to an absolute time; earlier values are ignored
    pub fn set_ms(&self, ms: u64) {
        self.micros.fetch_max(ms * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}
