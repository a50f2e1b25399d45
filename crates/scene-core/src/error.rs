//! Error types for the scene engine
//!
//! Evaluation itself is fail-open and never produces an error; these cover
//! structural problems at registration and engine construction.

use thiserror::Error;

use crate::{Direction, SceneId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Scene {scene}: sequence condition in {direction} list has no steps")]
    EmptySequence { scene: SceneId, direction: Direction },

    #[error("Scene {scene}: more than one sequence condition in {direction} list")]
    MultipleSequences { scene: SceneId, direction: Direction },

    #[error("Scene not found: {0}")]
    SceneNotFound(SceneId),

    #[error("Scene engine must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Result type for scene engine operations
pub type SceneResult<T> = Result<T, SceneError>;
