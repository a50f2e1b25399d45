//! Scene Time - clocks driving debounce windows and sequence timeouts
//!
//! The engine never reads the wall clock directly. It asks an injected
//! [`Clock`] for the current [`Timestamp`](scene_core::Timestamp):
//! - [`MonotonicClock`]: follows the Tokio runtime clock, so deferred
//!   re-evaluation timers and condition timestamps share one time base
//! - [`ManualClock`]: advanced explicitly, for deterministic evaluation tests

pub mod clock;

pub use clock::*;
