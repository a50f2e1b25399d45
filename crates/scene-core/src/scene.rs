//! Scene definitions, actions and transition listeners

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Condition, Direction, SceneError, SceneId, SceneResult, Value};

/// Opaque action payload, forwarded verbatim to listeners
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Action {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Callback invoked with a scene's enter or exit actions
pub type SceneListener = Arc<dyn Fn(&[Action]) + Send + Sync>;

/// What to do with the remaining listeners once one of them panics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerFailurePolicy {
    /// Keep invoking the remaining listeners
    #[default]
    Continue,
    /// Skip the remaining listeners of this transition
    Abort,
}

/// Outcome of one listener dispatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub panicked: usize,
    pub skipped: usize,
}

/// Append-only listener lists, shared by every clone of a scene
#[derive(Clone, Default)]
struct Listeners {
    on_enter: Arc<RwLock<Vec<SceneListener>>>,
    on_exit: Arc<RwLock<Vec<SceneListener>>>,
}

impl Listeners {
    fn list(&self, direction: Direction) -> &Arc<RwLock<Vec<SceneListener>>> {
        match direction {
            Direction::Enter => &self.on_enter,
            Direction::Exit => &self.on_exit,
        }
    }
}

/// Scene - a named pair of enter/exit rules with attached actions
#[derive(Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub enter_conditions: Vec<Condition>,
    #[serde(default)]
    pub exit_conditions: Vec<Condition>,
    #[serde(default)]
    pub enter_actions: Vec<Action>,
    #[serde(default)]
    pub exit_actions: Vec<Action>,
    #[serde(skip)]
    listeners: Listeners,
}

impl Scene {
    pub fn new(id: impl Into<SceneId>, name: impl Into<String>) -> Self {
        Scene {
            id: id.into(),
            name: name.into(),
            enter_conditions: Vec::new(),
            exit_conditions: Vec::new(),
            enter_actions: Vec::new(),
            exit_actions: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn with_enter_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.enter_conditions = conditions.into_iter().collect();
        self
    }

    pub fn with_exit_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.exit_conditions = conditions.into_iter().collect();
        self
    }

    pub fn with_enter_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.enter_actions = actions.into_iter().collect();
        self
    }

    pub fn with_exit_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.exit_actions = actions.into_iter().collect();
        self
    }

    /// Rules for one direction
    pub fn conditions(&self, direction: Direction) -> &[Condition] {
        match direction {
            Direction::Enter => &self.enter_conditions,
            Direction::Exit => &self.exit_conditions,
        }
    }

    /// Actions for one direction
    pub fn actions(&self, direction: Direction) -> &[Action] {
        match direction {
            Direction::Enter => &self.enter_actions,
            Direction::Exit => &self.exit_actions,
        }
    }

    /// Append an enter and an exit listener. Existing listeners are kept.
    pub fn subscribe<E, X>(&self, on_enter: E, on_exit: X)
    where
        E: Fn(&[Action]) + Send + Sync + 'static,
        X: Fn(&[Action]) + Send + Sync + 'static,
    {
        self.on_enter(on_enter);
        self.on_exit(on_exit);
    }

    pub fn on_enter<F>(&self, listener: F)
    where
        F: Fn(&[Action]) + Send + Sync + 'static,
    {
        self.listeners.on_enter.write().push(Arc::new(listener));
    }

    pub fn on_exit<F>(&self, listener: F)
    where
        F: Fn(&[Action]) + Send + Sync + 'static,
    {
        self.listeners.on_exit.write().push(Arc::new(listener));
    }

    /// Stable snapshot of the listeners registered for one direction
    pub fn listeners(&self, direction: Direction) -> Vec<SceneListener> {
        self.listeners.list(direction).read().clone()
    }

    pub fn listener_count(&self, direction: Direction) -> usize {
        self.listeners.list(direction).read().len()
    }

    /// Invoke the listeners of one direction with that direction's actions.
    ///
    /// Listeners run in registration order against a snapshot taken here, so
    /// a listener subscribing another listener only affects later dispatches.
    /// A panicking listener is contained and counted; `policy` decides whether
    /// the rest still run.
    pub fn notify(&self, direction: Direction, policy: ListenerFailurePolicy) -> DispatchReport {
        let snapshot = self.listeners(direction);
        let actions = self.actions(direction);
        let mut report = DispatchReport::default();

        for (i, listener) in snapshot.iter().enumerate() {
            report.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(actions)));
            if outcome.is_err() {
                report.panicked += 1;
                if policy == ListenerFailurePolicy::Abort {
                    report.skipped = snapshot.len() - i - 1;
                    break;
                }
            }
        }

        report
    }

    /// Fire the enter listeners, ignoring the enter conditions
    ///
    /// This only notifies listeners. An engine holding this scene does not
    /// see the call, so its active set is unchanged and a later evaluated
    /// enter fires the listeners again. Use `SceneEngine::force_enter` for
    /// a registered scene.
    pub fn enter(&self) -> DispatchReport {
        self.notify(Direction::Enter, ListenerFailurePolicy::Continue)
    }

    /// Fire the exit listeners, ignoring the exit conditions
    ///
    /// Like [`Scene::enter`], this bypasses any engine's active set; use
    /// `SceneEngine::force_exit` for a registered scene.
    pub fn exit(&self) -> DispatchReport {
        self.notify(Direction::Exit, ListenerFailurePolicy::Continue)
    }

    /// Structural checks applied at registration
    ///
    /// Each list may hold at most one sequence and every sequence needs at
    /// least one step.
    pub fn validate(&self) -> SceneResult<()> {
        for direction in [Direction::Enter, Direction::Exit] {
            let mut sequences = 0;
            for condition in self.conditions(direction) {
                if let Condition::Sequence(seq) = condition {
                    if seq.is_empty() {
                        return Err(SceneError::EmptySequence {
                            scene: self.id.clone(),
                            direction,
                        });
                    }
                    sequences += 1;
                }
            }
            if sequences > 1 {
                return Err(SceneError::MultipleSequences {
                    scene: self.id.clone(),
                    direction,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enter_conditions", &self.enter_conditions)
            .field("exit_conditions", &self.exit_conditions)
            .field("enter_actions", &self.enter_actions)
            .field("exit_actions", &self.exit_actions)
            .field("enter_listeners", &self.listener_count(Direction::Enter))
            .field("exit_listeners", &self.listener_count(Direction::Exit))
            .finish()
    }
}
