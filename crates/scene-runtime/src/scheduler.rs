//! Evaluation scheduler - deferred re-evaluation timers
//!
//! At most one timer is pending per (scene, direction). Arming a new one
//! aborts the previous one, so the latest request always wins.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use scene_core::{Direction, SceneId};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Identity of one armed timer
///
/// Fired callbacks receive their own handle so they can tell whether they
/// were superseded while waiting for the engine lock.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

struct PendingTimer {
    handle: TimerHandle,
    task: AbortHandle,
}

/// One-shot timers keyed by (scene, direction), run on a Tokio runtime
pub struct EvaluationScheduler {
    runtime: Handle,
    timers: HashMap<(SceneId, Direction), PendingTimer>,
    next: u64,
}

impl EvaluationScheduler {
    pub fn new(runtime: Handle) -> Self {
        EvaluationScheduler {
            runtime,
            timers: HashMap::new(),
            next: 0,
        }
    }

    /// Arm a timer that calls `fire` after `delay`
    ///
    /// Replaces (and aborts) any timer pending for the same key.
    pub fn schedule<F>(&mut self, scene: SceneId, direction: Direction, delay: Duration, fire: F) -> TimerHandle
    where
        F: FnOnce(TimerHandle) + Send + 'static,
    {
        self.next += 1;
        let handle = TimerHandle(self.next);
        // Deadline is fixed at arm time, not at the task's first poll
        let deadline = Instant::now() + delay;

        let task = self
            .runtime
            .spawn(async move {
                tokio::time::sleep_until(deadline).await;
                fire(handle);
            })
            .abort_handle();

        if let Some(previous) = self
            .timers
            .insert((scene, direction), PendingTimer { handle, task })
        {
            previous.task.abort();
        }

        handle
    }

    /// Cancel one timer by handle. Unknown or already fired handles are ignored.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let key = self
            .timers
            .iter()
            .find(|(_, timer)| timer.handle == handle)
            .map(|(key, _)| key.clone());

        match key.and_then(|key| self.timers.remove(&key)) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_direction(&mut self, scene: &SceneId, direction: Direction) -> bool {
        match self.timers.remove(&(scene.clone(), direction)) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel both directions of a scene; returns how many were pending
    pub fn cancel_scene(&mut self, scene: &SceneId) -> usize {
        [Direction::Enter, Direction::Exit]
            .into_iter()
            .filter(|direction| self.cancel_direction(scene, *direction))
            .count()
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    /// Retire a timer that has fired
    ///
    /// Returns false if `handle` is no longer the pending timer for the key,
    /// in which case the fire is stale and must be ignored.
    pub fn complete(&mut self, scene: &SceneId, direction: Direction, handle: TimerHandle) -> bool {
        let key = (scene.clone(), direction);
        match self.timers.get(&key) {
            Some(timer) if timer.handle == handle => {
                self.timers.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn handle(&self, scene: &SceneId, direction: Direction) -> Option<TimerHandle> {
        self.timers
            .get(&(scene.clone(), direction))
            .map(|timer| timer.handle)
    }

    pub fn is_pending(&self, scene: &SceneId, direction: Direction) -> bool {
        self.timers.contains_key(&(scene.clone(), direction))
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for EvaluationScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for EvaluationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationScheduler")
            .field("pending", &self.timers.len())
            .field("next", &self.next)
            .finish()
    }
}
