//! Scene registry and reverse index

use std::collections::{BTreeSet, HashMap, HashSet};

use scene_core::{Condition, Direction, Scene, SceneId};

/// Signal key -> scenes whose rules for one direction read that key
#[derive(Debug, Default)]
pub struct ReverseIndex {
    by_key: HashMap<String, HashSet<SceneId>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every key the conditions read, sequence steps unpacked
    pub fn insert(&mut self, scene: &SceneId, conditions: &[Condition]) {
        for condition in conditions {
            for key in condition.signal_keys() {
                self.by_key
                    .entry(key.to_string())
                    .or_default()
                    .insert(scene.clone());
            }
        }
    }

    /// Drop a scene from every bucket; empty buckets are removed
    pub fn remove_scene(&mut self, scene: &str) {
        self.by_key.retain(|_, scenes| {
            scenes.remove(scene);
            !scenes.is_empty()
        });
    }

    pub fn scenes_for(&self, key: &str) -> Option<&HashSet<SceneId>> {
        self.by_key.get(key)
    }

    /// Number of distinct keys indexed
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Scene definitions plus their enter and exit reverse indexes
#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: HashMap<SceneId, Scene>,
    enter_index: ReverseIndex,
    exit_index: ReverseIndex,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene, replacing any scene with the same id
    ///
    /// The replaced scene's index entries are purged first, so keys only
    /// the old definition read stop routing to this id.
    pub fn register(&mut self, scene: Scene) -> Option<Scene> {
        let previous = self.deregister(scene.id.as_str());

        self.enter_index.insert(&scene.id, &scene.enter_conditions);
        self.exit_index.insert(&scene.id, &scene.exit_conditions);
        self.scenes.insert(scene.id.clone(), scene);

        previous
    }

    pub fn deregister(&mut self, id: &str) -> Option<Scene> {
        let scene = self.scenes.remove(id)?;
        self.enter_index.remove_scene(id);
        self.exit_index.remove_scene(id);
        Some(scene)
    }

    pub fn get(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    /// Scenes to evaluate for an update of `key`
    ///
    /// Union of the enter and exit buckets, each scene once, in id order.
    pub fn interested(&self, key: &str) -> Vec<SceneId> {
        let mut ids = BTreeSet::new();
        for index in [&self.enter_index, &self.exit_index] {
            if let Some(scenes) = index.scenes_for(key) {
                ids.extend(scenes.iter().cloned());
            }
        }
        ids.into_iter().collect()
    }

    pub fn index(&self, direction: Direction) -> &ReverseIndex {
        match direction {
            Direction::Enter => &self.enter_index,
            Direction::Exit => &self.exit_index,
        }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }
}
