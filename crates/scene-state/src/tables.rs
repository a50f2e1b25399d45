//! State tables - per-scene evaluation state

use std::collections::HashMap;

use scene_core::{Direction, SceneId};

use crate::{DurationTracker, SequenceState};

/// Evaluation state of one direction of one scene
#[derive(Clone, Debug, Default)]
pub struct DirectionState {
    pub durations: DurationTracker,
    pub sequence: SequenceState,
}

impl DirectionState {
    pub fn clear(&mut self) {
        self.durations.clear();
        self.sequence.reset();
    }
}

/// Evaluation state of one scene
#[derive(Clone, Debug, Default)]
pub struct SceneState {
    pub enter: DirectionState,
    pub exit: DirectionState,
}

impl SceneState {
    pub fn direction(&self, direction: Direction) -> &DirectionState {
        match direction {
            Direction::Enter => &self.enter,
            Direction::Exit => &self.exit,
        }
    }

    pub fn direction_mut(&mut self, direction: Direction) -> &mut DirectionState {
        match direction {
            Direction::Enter => &mut self.enter,
            Direction::Exit => &mut self.exit,
        }
    }
}

/// All scenes' evaluation state, indexed by scene id
#[derive(Debug, Default)]
pub struct StateTables {
    scenes: HashMap<SceneId, SceneState>,
}

impl StateTables {
    pub fn new() -> Self {
        StateTables::default()
    }

    /// Install fresh state for a scene, discarding whatever was there
    pub fn reset(&mut self, id: SceneId) {
        self.scenes.insert(id, SceneState::default());
    }

    /// State for a scene, created on first use
    pub fn entry(&mut self, id: &SceneId) -> &mut SceneState {
        self.scenes.entry(id.clone()).or_default()
    }

    pub fn get(&self, id: &str) -> Option<&SceneState> {
        self.scenes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SceneState> {
        self.scenes.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<SceneState> {
        self.scenes.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SceneId, &SceneState)> {
        self.scenes.iter()
    }
}
