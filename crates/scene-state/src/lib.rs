//! Scene State Engine - evaluation state and rule evaluation
//!
//! This crate implements everything a single evaluation pass needs:
//! - Duration tracking (debounce windows for plain conditions)
//! - Sequence matching (ordered steps with inter-step timeouts)
//! - Per-scene state tables
//! - Enter (conjunction) and exit (disjunction) evaluation
//!
//! Nothing here locks, sleeps or spawns; the runtime crate owns those.

pub mod duration;
pub mod sequence;
pub mod tables;
pub mod evaluate;

pub use duration::*;
pub use sequence::*;
pub use tables::*;
pub use evaluate::*;
