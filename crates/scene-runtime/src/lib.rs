//! Scene Runtime - reactive scene orchestration
//!
//! This crate wires the evaluation state to live signals:
//! 1. A signal update arrives from the bus
//! 2. The reverse index selects the scenes that depend on its key
//! 3. Each selected scene is evaluated once, under the engine lock
//! 4. Satisfied rules transition the scene and fire its listeners
//! 5. Rules waiting on a debounce window arm a deferred re-evaluation

pub mod config;
pub mod registry;
pub mod scheduler;
pub mod engine;
pub mod telemetry;

pub use config::*;
pub use registry::*;
pub use scheduler::*;
pub use engine::*;
pub use telemetry::*;
