//! Clock implementations for the scene engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scene_core::Timestamp;
use tokio::time::Instant;

/// Source of engine time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock on the Tokio time base
///
/// Reads `tokio::time::Instant`, so a paused test runtime advances it in
/// lockstep with `tokio::time::sleep`.
/// INVARIANT: never goes backwards
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose zero is the current instant
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }

    /// Time elapsed since the origin
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.elapsed().as_millis() as u64)
    }
}

/// Manually driven clock
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(t: Timestamp) -> Self {
        ManualClock {
            millis: Arc::new(AtomicU64::new(t.as_millis())),
        }
    }

    /// Move forward by `millis`; returns the new time
    pub fn advance(&self, millis: u64) -> Timestamp {
        let prev = self.millis.fetch_add(millis, Ordering::SeqCst);
        Timestamp::from_millis(prev.saturating_add(millis))
    }

    /// Jump to `t`. Only allowed to move forward.
    pub fn set(&self, t: Timestamp) {
        self.millis.fetch_max(t.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
