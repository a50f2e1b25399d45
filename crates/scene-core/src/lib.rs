//! Scene Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the scene engine:
//! - Identifiers (SceneId) and the engine timestamp
//! - Signal values and the current-value lookup contract
//! - The condition model (leaf predicates and ordered sequences)
//! - Scenes, actions and transition listeners

pub mod id;
pub mod time;
pub mod value;
pub mod signal;
pub mod condition;
pub mod scene;
pub mod error;

pub use id::*;
pub use time::*;
pub use value::*;
pub use signal::*;
pub use condition::*;
pub use scene::*;
pub use error::*;
