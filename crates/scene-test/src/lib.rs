//! Scene Test Harness - scenario driving and end-to-end validation
//!
//! This crate provides:
//! - Vehicle scene fixtures (builders and JSON definitions)
//! - A scenario runner that replays timed signal scripts on paused Tokio time
//! - Canned end-to-end scenarios for the fixture scenes
//! - Criterion benchmarks for dispatch and evaluation

pub mod fixtures;
pub mod scenario;
pub mod scenarios;

pub use fixtures::*;
pub use scenario::*;
pub use scenarios::*;
