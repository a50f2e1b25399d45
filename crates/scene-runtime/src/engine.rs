//! Scene Engine - the orchestrator
//!
//! Every evaluation, registration and timer fire runs under one engine
//! lock. Listeners are invoked while it is held, so they must be quick and
//! must not call back into the engine synchronously; publishing to the bus
//! from a listener is fine because bus updates are evaluated on a spawned
//! task.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use scene_core::{Direction, ListenerFailurePolicy, Scene, SceneError, SceneId, SceneResult, Signal};
use scene_signal::{SignalBus, SubscriptionId};
use scene_state::{evaluate_enter, evaluate_exit, SequenceOutcome, StateTables, Verdict};
use scene_time::{Clock, MonotonicClock};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace};

use crate::{EngineConfig, EvaluationScheduler, SceneRegistry, TimerHandle};

/// Engine counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Signal updates routed through the reverse index
    pub signals_dispatched: u64,
    /// Single-scene evaluation passes
    pub evaluations: u64,
    pub enters: u64,
    pub exits: u64,
    pub timers_armed: u64,
    pub timer_fires: u64,
    /// Timer fires dropped because a newer timer replaced them
    pub stale_timer_fires: u64,
    pub listener_panics: u64,
}

/// Everything guarded by the engine lock
struct EngineCore {
    registry: SceneRegistry,
    tables: StateTables,
    active: HashSet<SceneId>,
    scheduler: EvaluationScheduler,
    stats: EngineStats,
}

impl EngineCore {
    fn new(runtime: Handle) -> Self {
        EngineCore {
            registry: SceneRegistry::new(),
            tables: StateTables::new(),
            active: HashSet::new(),
            scheduler: EvaluationScheduler::new(runtime),
            stats: EngineStats::default(),
        }
    }

    /// Move a scene across `direction`
    ///
    /// The pending timer for that direction is cancelled, listeners fire,
    /// the active set is updated and the direction's evaluation state is
    /// cleared so a consumed sequence must be matched again from scratch.
    fn transition(&mut self, id: &SceneId, direction: Direction, policy: ListenerFailurePolicy) -> bool {
        let EngineCore {
            registry,
            tables,
            active,
            scheduler,
            stats,
        } = self;

        let Some(scene) = registry.get(id.as_str()) else {
            return false;
        };

        scheduler.cancel_direction(id, direction);
        info!(scene = %id, name = %scene.name, %direction, "scene transition");

        let report = scene.notify(direction, policy);
        if report.panicked > 0 {
            error!(
                scene = %id,
                %direction,
                panicked = report.panicked,
                skipped = report.skipped,
                "scene listener panicked"
            );
            stats.listener_panics += report.panicked as u64;
        }

        match direction {
            Direction::Enter => {
                active.insert(id.clone());
                stats.enters += 1;
            }
            Direction::Exit => {
                active.remove(id);
                stats.exits += 1;
            }
        }
        tables.entry(id).direction_mut(direction).clear();
        true
    }
}

struct EngineInner {
    bus: Arc<dyn SignalBus>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    core: Mutex<EngineCore>,
}

impl EngineInner {
    /// Route one signal to every scene whose rules read its key
    fn dispatch(self: &Arc<Self>, signal: &Signal) {
        let mut core = self.core.lock();
        core.stats.signals_dispatched += 1;

        let interested = core.registry.interested(&signal.key);
        trace!(key = %signal.key, scenes = interested.len(), "dispatching signal");

        for id in &interested {
            self.evaluate_scene(&mut core, id, Some(signal));
        }
    }

    /// One evaluation pass over the scene's current direction
    fn evaluate_scene(self: &Arc<Self>, core: &mut EngineCore, id: &SceneId, trigger: Option<&Signal>) {
        let now = self.clock.now();
        let direction = if core.active.contains(id) {
            Direction::Exit
        } else {
            Direction::Enter
        };

        let evaluation = {
            let EngineCore {
                registry,
                tables,
                stats,
                ..
            } = &mut *core;
            let Some(scene) = registry.get(id.as_str()) else {
                return;
            };
            stats.evaluations += 1;

            let conditions = scene.conditions(direction);
            let state = tables.entry(id).direction_mut(direction);
            match direction {
                Direction::Enter => evaluate_enter(conditions, state, trigger, self.bus.as_ref(), now),
                Direction::Exit => evaluate_exit(conditions, state, trigger, self.bus.as_ref(), now),
            }
        };

        match evaluation.sequence {
            Some(SequenceOutcome::Reset(cause)) => {
                debug!(scene = %id, %direction, ?cause, "sequence progress reset");
            }
            Some(SequenceOutcome::Advanced { index }) => {
                debug!(scene = %id, %direction, index, "sequence advanced");
            }
            _ => {}
        }

        match evaluation.verdict {
            Verdict::Fire => {
                core.transition(id, direction, self.config.listener_policy);
            }
            Verdict::WakeAfter(wait_ms) => self.arm_timer(core, id, direction, wait_ms),
            Verdict::Idle => {
                core.scheduler.cancel_direction(id, direction);
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, core: &mut EngineCore, id: &SceneId, direction: Direction, wait_ms: u64) {
        let weak: Weak<EngineInner> = Arc::downgrade(self);
        let scene = id.clone();
        let handle = core.scheduler.schedule(
            id.clone(),
            direction,
            Duration::from_millis(wait_ms),
            move |handle| {
                if let Some(inner) = weak.upgrade() {
                    inner.fire_timer(&scene, direction, handle);
                }
            },
        );
        core.stats.timers_armed += 1;
        debug!(scene = %id, %direction, wait_ms, ?handle, "re-evaluation armed");
    }

    fn fire_timer(self: &Arc<Self>, id: &SceneId, direction: Direction, handle: TimerHandle) {
        let mut core = self.core.lock();
        if !core.scheduler.complete(id, direction, handle) {
            core.stats.stale_timer_fires += 1;
            trace!(scene = %id, %direction, ?handle, "stale timer ignored");
            return;
        }

        core.stats.timer_fires += 1;
        self.evaluate_scene(&mut core, id, None);
    }
}

/// Reactive scene rule engine
///
/// Subscribes to the signal bus on construction and unsubscribes on drop.
/// Must be created inside a Tokio runtime: bus updates and deferred
/// re-evaluations run as tasks on it.
pub struct SceneEngine {
    inner: Arc<EngineInner>,
    subscription: SubscriptionId,
}

impl SceneEngine {
    pub fn new(bus: Arc<dyn SignalBus>) -> SceneResult<Self> {
        Self::with_config(bus, EngineConfig::default())
    }

    pub fn with_config(bus: Arc<dyn SignalBus>, config: EngineConfig) -> SceneResult<Self> {
        Self::with_clock(bus, Arc::new(MonotonicClock::new()), config)
    }

    /// Create an engine reading time from `clock`
    ///
    /// Debounce timers sleep on the Tokio clock, so `clock` should advance
    /// with it.
    pub fn with_clock(bus: Arc<dyn SignalBus>, clock: Arc<dyn Clock>, config: EngineConfig) -> SceneResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SceneError::NoRuntime)?;

        let inner = Arc::new(EngineInner {
            bus: Arc::clone(&bus),
            clock,
            config,
            core: Mutex::new(EngineCore::new(runtime.clone())),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = bus.subscribe(Arc::new(move |signal: &Signal| {
            let weak = weak.clone();
            let signal = signal.clone();
            runtime.spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(&signal);
                }
            });
        }));

        info!(?subscription, "scene engine started");
        Ok(SceneEngine { inner, subscription })
    }

    /// Register a scene, silently replacing any scene with the same id
    ///
    /// A replaced scene keeps its active status but starts from fresh
    /// evaluation state with no pending timers.
    pub fn add_scene(&self, scene: Scene) -> SceneResult<()> {
        scene.validate()?;

        let id = scene.id.clone();
        let mut core = self.inner.core.lock();
        let replaced = core.registry.register(scene).is_some();
        core.tables.reset(id.clone());
        core.scheduler.cancel_scene(&id);
        info!(scene = %id, replaced, "scene registered");

        if self.inner.config.evaluate_on_register {
            self.inner.evaluate_scene(&mut core, &id, None);
        }
        Ok(())
    }

    /// Remove a scene with its index entries, state and pending timers
    ///
    /// Exit listeners are not invoked for a scene removed while active.
    pub fn remove_scene(&self, id: &str) -> bool {
        let mut core = self.inner.core.lock();
        let Some(scene) = core.registry.deregister(id) else {
            return false;
        };

        core.tables.remove(id);
        core.scheduler.cancel_scene(&scene.id);
        let was_active = core.active.remove(id);
        info!(scene = %scene.id, was_active, "scene removed");
        true
    }

    pub fn is_scene_active(&self, id: &str) -> bool {
        self.inner.core.lock().active.contains(id)
    }

    /// Active scenes, ordered by id
    pub fn active_scenes(&self) -> Vec<Scene> {
        let core = self.inner.core.lock();
        let mut scenes: Vec<Scene> = core
            .active
            .iter()
            .filter_map(|id| core.registry.get(id.as_str()).cloned())
            .collect();
        scenes.sort_by(|a, b| a.id.cmp(&b.id));
        scenes
    }

    /// Registered definition of a scene; listeners are shared with it
    pub fn scene(&self, id: &str) -> Option<Scene> {
        self.inner.core.lock().registry.get(id).cloned()
    }

    pub fn scene_count(&self) -> usize {
        self.inner.core.lock().registry.len()
    }

    /// Evaluate a signal update on the caller's thread
    ///
    /// The bus subscription does the same from a spawned task. The value
    /// must already be visible through the bus.
    pub fn handle_signal(&self, signal: &Signal) {
        self.inner.dispatch(signal);
    }

    /// Enter a scene regardless of its enter conditions
    ///
    /// Returns false if the scene was already active.
    pub fn force_enter(&self, id: &str) -> SceneResult<bool> {
        self.force(id, Direction::Enter)
    }

    /// Exit a scene regardless of its exit conditions
    ///
    /// Returns false if the scene was not active.
    pub fn force_exit(&self, id: &str) -> SceneResult<bool> {
        self.force(id, Direction::Exit)
    }

    fn force(&self, id: &str, direction: Direction) -> SceneResult<bool> {
        let mut core = self.inner.core.lock();
        let Some(scene_id) = core.registry.get(id).map(|scene| scene.id.clone()) else {
            return Err(SceneError::SceneNotFound(SceneId::new(id)));
        };

        let active = core.active.contains(id);
        let already = match direction {
            Direction::Enter => active,
            Direction::Exit => !active,
        };
        if already {
            return Ok(false);
        }
        Ok(core.transition(&scene_id, direction, self.inner.config.listener_policy))
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.core.lock().stats.clone()
    }

    /// Number of armed re-evaluation timers
    pub fn pending_timers(&self) -> usize {
        self.inner.core.lock().scheduler.pending()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &Arc<dyn SignalBus> {
        &self.inner.bus
    }
}

impl Drop for SceneEngine {
    fn drop(&mut self) {
        self.inner.bus.unsubscribe(self.subscription);
        self.inner.core.lock().scheduler.cancel_all();
    }
}

impl fmt::Debug for SceneEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("SceneEngine")
            .field("scenes", &core.registry.len())
            .field("active", &core.active.len())
            .field("pending_timers", &core.scheduler.pending())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::{Action, Condition, LeafCondition, SequenceStep, SignalSource, Value};
    use scene_signal::{InMemorySignalBus, SignalListener};
    use scene_time::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    /// Enter/exit listener call counters
    #[derive(Clone, Default)]
    struct Calls {
        enter: Arc<AtomicUsize>,
        exit: Arc<AtomicUsize>,
    }

    impl Calls {
        fn attach(scene: &Scene) -> Self {
            let calls = Calls::default();
            let (enter, exit) = (calls.enter.clone(), calls.exit.clone());
            scene.subscribe(
                move |_| {
                    enter.fetch_add(1, Ordering::SeqCst);
                },
                move |_| {
                    exit.fetch_add(1, Ordering::SeqCst);
                },
            );
            calls
        }

        fn enters(&self) -> usize {
            self.enter.load(Ordering::SeqCst)
        }

        fn exits(&self) -> usize {
            self.exit.load(Ordering::SeqCst)
        }
    }

    /// Value table that never notifies; evaluation only runs through
    /// `handle_signal` and timers
    #[derive(Default)]
    struct QuietBus {
        values: parking_lot::RwLock<HashMap<String, Value>>,
    }

    impl QuietBus {
        fn set(&self, key: &str, value: impl Into<Value>) {
            self.values.write().insert(key.to_string(), value.into());
        }
    }

    impl SignalSource for QuietBus {
        fn current_value(&self, key: &str) -> Option<Value> {
            self.values.read().get(key).cloned()
        }
    }

    impl SignalBus for QuietBus {
        fn subscribe(&self, _listener: SignalListener) -> SubscriptionId {
            SubscriptionId(0)
        }

        fn unsubscribe(&self, _id: SubscriptionId) -> bool {
            false
        }
    }

    struct Fixture {
        bus: Arc<InMemorySignalBus>,
        engine: SceneEngine,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(EngineConfig::default())
        }

        fn with_config(config: EngineConfig) -> Self {
            let bus = Arc::new(InMemorySignalBus::new());
            let engine = SceneEngine::with_config(bus.clone(), config).unwrap();
            Fixture { bus, engine }
        }

        async fn publish(&self, key: &str, value: impl Into<scene_core::Value>) {
            self.bus.set(key, value);
            settle().await;
        }
    }

    fn eco_mode() -> Scene {
        Scene::new("eco_mode", "ECO mode")
            .with_enter_conditions([Condition::less_than("battery_level", 20.0)])
            .with_exit_conditions([Condition::greater_than("battery_level", 60.0)])
            .with_enter_actions([Action::new("enable_eco_mode")])
            .with_exit_actions([Action::new("disable_eco_mode")])
    }

    fn high_speed_cruise() -> Scene {
        Scene::new("high_speed_cruise", "High speed cruise")
            .with_enter_conditions([Condition::greater_than("speed", 80.0).debounced(5000)])
            .with_exit_conditions([
                Condition::less_than("speed", 70.0).debounced(3000),
                Condition::equals("gear", "P").debounced(1000),
            ])
    }

    fn security_start() -> Scene {
        Scene::new("security_start", "Security start").with_enter_conditions([Condition::sequence(vec![
            SequenceStep::new(LeafCondition::equals("brake_pedal", "pressed"), 0),
            SequenceStep::new(LeafCondition::equals("start_button", "clicked"), 3000),
        ])])
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_enter_and_exit() {
        let f = Fixture::new();
        let scene = eco_mode();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("battery_level", 15).await;
        assert!(f.engine.is_scene_active("eco_mode"));
        assert_eq!(calls.enters(), 1);

        f.publish("battery_level", 40).await;
        assert!(f.engine.is_scene_active("eco_mode"));

        f.publish("battery_level", 70).await;
        assert!(!f.engine.is_scene_active("eco_mode"));
        assert_eq!((calls.enters(), calls.exits()), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_receive_configured_actions() {
        let f = Fixture::new();
        let scene = eco_mode();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        scene.on_enter(move |actions| s.lock().extend(actions.iter().map(|a| a.name.clone())));
        f.engine.add_scene(scene).unwrap();

        f.publish("battery_level", 10.5).await;
        assert_eq!(*seen.lock(), vec!["enable_eco_mode".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_enter_fires_from_timer() {
        let f = Fixture::new();
        let scene = high_speed_cruise();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("speed", 100).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));
        assert_eq!(f.engine.pending_timers(), 1);

        advance(4999).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));

        advance(1).await;
        assert!(f.engine.is_scene_active("high_speed_cruise"));
        assert_eq!(calls.enters(), 1);

        let stats = f.engine.stats();
        assert_eq!(stats.timer_fires, 1);
        assert_eq!(stats.enters, 1);
        assert_eq!(f.engine.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_deadline_counts_from_arming() {
        let bus = Arc::new(QuietBus::default());
        let engine = SceneEngine::new(bus.clone()).unwrap();
        engine.add_scene(high_speed_cruise()).unwrap();

        bus.set("speed", 100);
        engine.handle_signal(&Signal::new("speed", 100));
        assert_eq!(engine.pending_timers(), 1);

        // The timer task has not been polled yet when the clock jumps
        advance(5000).await;
        assert!(engine.is_scene_active("high_speed_cruise"));
        assert_eq!(engine.stats().timer_fires, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_clock_drives_debounce() {
        let bus = Arc::new(QuietBus::default());
        let clock = ManualClock::new();
        let engine = SceneEngine::with_clock(bus.clone(), Arc::new(clock.clone()), EngineConfig::default()).unwrap();
        engine.add_scene(high_speed_cruise()).unwrap();

        bus.set("speed", 100);
        let signal = Signal::new("speed", 100);
        engine.handle_signal(&signal);
        assert!(!engine.is_scene_active("high_speed_cruise"));

        clock.advance(4999);
        engine.handle_signal(&signal);
        assert!(!engine.is_scene_active("high_speed_cruise"));

        // Tokio time never moves; only the injected clock does
        clock.advance(1);
        engine.handle_signal(&signal);
        assert!(engine.is_scene_active("high_speed_cruise"));

        let stats = engine.stats();
        assert_eq!(stats.timer_fires, 0);
        assert_eq!(stats.enters, 1);
        assert_eq!(engine.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_sample_restarts_debounce() {
        let f = Fixture::new();
        f.engine.add_scene(high_speed_cruise()).unwrap();

        f.publish("speed", 100).await;
        advance(2000).await;
        f.publish("speed", 60).await;
        assert_eq!(f.engine.pending_timers(), 0);

        advance(1000).await;
        f.publish("speed", 100).await;
        advance(4999).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));

        advance(1).await;
        assert!(f.engine.is_scene_active("high_speed_cruise"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_true_samples_keep_first_clock() {
        let f = Fixture::new();
        f.engine.add_scene(high_speed_cruise()).unwrap();

        f.publish("speed", 90).await;
        advance(2000).await;
        f.publish("speed", 120).await;
        advance(2000).await;
        f.publish("speed", 110).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));

        advance(1000).await;
        assert!(f.engine.is_scene_active("high_speed_cruise"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_exit_takes_shortest_wait() {
        let f = Fixture::new();
        let scene = high_speed_cruise();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();
        assert_eq!(f.engine.force_enter("high_speed_cruise"), Ok(true));

        f.publish("speed", 50).await;
        f.publish("gear", "P").await;

        advance(999).await;
        assert!(f.engine.is_scene_active("high_speed_cruise"));

        advance(1).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));
        assert_eq!(calls.exits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_exit_condition_exits() {
        let f = Fixture::new();
        let scene = Scene::new("cruise", "Cruise")
            .with_enter_conditions([Condition::greater_than("speed", 80.0)])
            .with_exit_conditions([Condition::less_than("speed", 70.0), Condition::equals("gear", "P")]);
        f.engine.add_scene(scene).unwrap();

        f.publish("speed", 100).await;
        assert!(f.engine.is_scene_active("cruise"));

        f.publish("gear", "P").await;
        assert!(!f.engine.is_scene_active("cruise"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_within_timeout_enters() {
        let f = Fixture::new();
        let scene = security_start();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("brake_pedal", "pressed").await;
        advance(1000).await;
        f.publish("start_button", "clicked").await;

        assert!(f.engine.is_scene_active("security_start"));
        assert_eq!(calls.enters(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_timeout_requires_retrigger() {
        let f = Fixture::new();
        f.engine.add_scene(security_start()).unwrap();

        f.publish("brake_pedal", "pressed").await;
        advance(4000).await;
        f.publish("start_button", "clicked").await;
        assert!(!f.engine.is_scene_active("security_start"));

        f.publish("brake_pedal", "pressed").await;
        advance(900).await;
        f.publish("start_button", "clicked").await;
        assert!(f.engine.is_scene_active("security_start"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_brake_invalidates_progress() {
        let f = Fixture::new();
        f.engine.add_scene(security_start()).unwrap();

        f.publish("brake_pedal", "pressed").await;
        advance(1000).await;
        f.publish("brake_pedal", "unpressed").await;
        advance(1000).await;
        f.publish("start_button", "clicked").await;
        assert!(!f.engine.is_scene_active("security_start"));

        // A fresh press followed by a click within the window matches
        advance(500).await;
        f.publish("brake_pedal", "pressed").await;
        advance(500).await;
        f.publish("start_button", "clicked").await;
        assert!(f.engine.is_scene_active("security_start"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_keys_do_not_disturb_sequence() {
        let f = Fixture::new();
        let scene = Scene::new("parked_start", "Parked start").with_enter_conditions([
            Condition::equals("gear", "P"),
            Condition::sequence(vec![
                SequenceStep::of(LeafCondition::equals("brake_pedal", "pressed")),
                SequenceStep::new(LeafCondition::equals("start_button", "clicked"), 3000),
            ]),
        ]);
        f.engine.add_scene(scene).unwrap();

        f.publish("gear", "P").await;
        f.publish("brake_pedal", "pressed").await;
        f.publish("gear", "P").await;
        assert!(!f.engine.is_scene_active("parked_start"));

        f.publish("start_button", "clicked").await;
        assert!(f.engine.is_scene_active("parked_start"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_scene_is_not_reentered() {
        let f = Fixture::new();
        let scene = Scene::new("door_chime", "Door chime").with_enter_conditions([Condition::sequence(vec![
            SequenceStep::of(LeafCondition::equals("door", "open")),
        ])]);
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        for _ in 0..3 {
            f.publish("door", "open").await;
        }

        assert_eq!(calls.enters(), 1);
        assert_eq!(f.engine.active_scenes().len(), 1);
        assert_eq!(f.engine.stats().enters, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_debounced_scene_is_not_reentered() {
        let f = Fixture::new();
        let scene = Scene::new("spoiler", "Spoiler")
            .with_enter_conditions([Condition::greater_than("speed", 80.0).debounced(1000)]);
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("speed", 100).await;
        advance(500).await;
        f.publish("speed", 110).await;
        advance(500).await;
        assert!(f.engine.is_scene_active("spoiler"));
        assert_eq!(f.engine.stats().timer_fires, 1);

        for speed in [120, 130, 140] {
            f.publish("speed", speed).await;
            advance(1000).await;
        }

        assert_eq!(calls.enters(), 1);
        assert_eq!(f.engine.stats().enters, 1);
        assert_eq!(f.engine.active_scenes().len(), 1);
        assert_eq!(f.engine.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_enter_list_never_enters() {
        let f = Fixture::new();
        let scene = Scene::new("exit_only", "Exit only").with_exit_conditions([Condition::equals("gear", "P")]);
        f.engine.add_scene(scene).unwrap();

        f.publish("gear", "P").await;
        f.publish("gear", "D").await;
        assert!(!f.engine.is_scene_active("exit_only"));
        assert!(f.engine.active_scenes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_scene_cancels_timers() {
        let f = Fixture::new();
        let scene = high_speed_cruise();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("speed", 100).await;
        assert_eq!(f.engine.pending_timers(), 1);

        assert!(f.engine.remove_scene("high_speed_cruise"));
        assert!(!f.engine.remove_scene("high_speed_cruise"));
        assert_eq!(f.engine.pending_timers(), 0);

        advance(6000).await;
        assert_eq!(calls.enters(), 0);
        assert_eq!(f.engine.stats().timer_fires, 0);
        assert_eq!(f.engine.scene_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_active_scene_skips_exit_listeners() {
        let f = Fixture::new();
        let scene = eco_mode();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("battery_level", 5).await;
        assert!(f.engine.remove_scene("eco_mode"));
        assert!(!f.engine.is_scene_active("eco_mode"));
        assert_eq!(calls.exits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_state() {
        let f = Fixture::new();
        f.engine.add_scene(high_speed_cruise()).unwrap();

        f.publish("speed", 100).await;
        advance(3000).await;

        f.engine.add_scene(high_speed_cruise()).unwrap();
        assert_eq!(f.engine.scene_count(), 1);
        assert_eq!(f.engine.pending_timers(), 0);

        advance(3000).await;
        assert!(!f.engine.is_scene_active("high_speed_cruise"));

        // The debounce window restarts at the next sample
        f.publish("speed", 100).await;
        advance(5000).await;
        assert!(f.engine.is_scene_active("high_speed_cruise"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_keeps_active_status() {
        let f = Fixture::new();
        f.engine.add_scene(eco_mode()).unwrap();
        f.publish("battery_level", 5).await;

        let replacement = eco_mode().with_exit_conditions([Condition::greater_than("battery_level", 90.0)]);
        f.engine.add_scene(replacement).unwrap();
        assert!(f.engine.is_scene_active("eco_mode"));

        f.publish("battery_level", 70).await;
        assert!(f.engine.is_scene_active("eco_mode"));
        f.publish("battery_level", 95).await;
        assert!(!f.engine.is_scene_active("eco_mode"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_continue() {
        let f = Fixture::new();
        let scene = eco_mode();
        scene.on_enter(|_| panic!("listener failure"));
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("battery_level", 5).await;
        assert!(f.engine.is_scene_active("eco_mode"));
        assert_eq!(calls.enters(), 1);
        assert_eq!(f.engine.stats().listener_panics, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_abort() {
        let f = Fixture::with_config(EngineConfig::strict());
        let scene = eco_mode();
        scene.on_enter(|_| panic!("listener failure"));
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        f.publish("battery_level", 5).await;
        assert!(f.engine.is_scene_active("eco_mode"));
        assert_eq!(calls.enters(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_transitions() {
        let f = Fixture::new();
        let scene = eco_mode();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene).unwrap();

        assert_eq!(f.engine.force_enter("eco_mode"), Ok(true));
        assert_eq!(f.engine.force_enter("eco_mode"), Ok(false));
        assert_eq!(f.engine.force_exit("eco_mode"), Ok(true));
        assert_eq!(f.engine.force_exit("eco_mode"), Ok(false));
        assert_eq!((calls.enters(), calls.exits()), (1, 1));

        assert_eq!(
            f.engine.force_enter("sport_mode"),
            Err(SceneError::SceneNotFound(SceneId::new("sport_mode")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_scene_enter_bypasses_engine() {
        let f = Fixture::new();
        let scene = eco_mode();
        let calls = Calls::attach(&scene);
        f.engine.add_scene(scene.clone()).unwrap();

        scene.enter();
        assert_eq!(calls.enters(), 1);
        assert!(!f.engine.is_scene_active("eco_mode"));

        assert_eq!(f.engine.force_enter("eco_mode"), Ok(true));
        assert_eq!(calls.enters(), 2);
        assert!(f.engine.is_scene_active("eco_mode"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_scene_rejects_malformed_sequence() {
        let f = Fixture::new();
        let scene = Scene::new("broken", "Broken").with_enter_conditions([Condition::sequence(vec![])]);

        assert!(matches!(f.engine.add_scene(scene), Err(SceneError::EmptySequence { .. })));
        assert_eq!(f.engine.scene_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eager_registration_sees_existing_values() {
        let f = Fixture::with_config(EngineConfig::eager());
        f.bus.set("battery_level", 12);
        settle().await;

        f.engine.add_scene(eco_mode()).unwrap();
        assert!(f.engine.is_scene_active("eco_mode"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_registration_waits_for_update() {
        let f = Fixture::new();
        f.bus.set("battery_level", 12);
        settle().await;

        f.engine.add_scene(eco_mode()).unwrap();
        assert!(!f.engine.is_scene_active("eco_mode"));

        f.publish("battery_level", 12).await;
        assert!(f.engine.is_scene_active("eco_mode"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_signal_is_synchronous() {
        let f = Fixture::new();
        f.engine.add_scene(eco_mode()).unwrap();

        f.bus.set("battery_level", 3);
        f.engine.handle_signal(&Signal::new("battery_level", 3));
        assert!(f.engine.is_scene_active("eco_mode"));

        settle().await;
        assert_eq!(f.engine.stats().enters, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_scenes_sorted_by_id() {
        let f = Fixture::new();
        f.engine.add_scene(eco_mode()).unwrap();
        f.engine.add_scene(security_start()).unwrap();
        f.engine.force_enter("security_start").unwrap();
        f.engine.force_enter("eco_mode").unwrap();

        let ids: Vec<String> = f
            .engine
            .active_scenes()
            .into_iter()
            .map(|scene| scene.id.to_string())
            .collect();
        assert_eq!(ids, vec!["eco_mode", "security_start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unsubscribes_from_bus() {
        let bus = Arc::new(InMemorySignalBus::new());
        let engine = SceneEngine::new(bus.clone()).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        drop(engine);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_and_registration() {
        let bus = Arc::new(InMemorySignalBus::new());
        let engine = Arc::new(SceneEngine::new(bus.clone()).unwrap());

        let scene = Scene::new("cruise", "Cruise")
            .with_enter_conditions([Condition::greater_than("speed", 80.0)])
            .with_exit_conditions([Condition::less_than("speed", 70.0)]);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (entered, exited) = (order.clone(), order.clone());
        scene.subscribe(
            move |_| entered.lock().push(Direction::Enter),
            move |_| exited.lock().push(Direction::Exit),
        );
        engine.add_scene(scene.clone()).unwrap();

        let mut tasks = Vec::new();
        for producer in 0..4usize {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..200usize {
                    let speed = if (i + producer) % 2 == 0 { 100 } else { 50 };
                    bus.set("speed", speed);
                    tokio::task::yield_now().await;
                }
            }));
        }

        let registrar = engine.clone();
        tasks.push(tokio::spawn(async move {
            let idle = Scene::new("warp", "Warp").with_enter_conditions([Condition::greater_than("speed", 1000.0)]);
            for _ in 0..100 {
                registrar.add_scene(idle.clone()).unwrap();
                registrar.add_scene(scene.clone()).unwrap();
                assert!(registrar.remove_scene("warp"));
                tokio::task::yield_now().await;
            }
        }));

        for task in tasks {
            task.await.unwrap();
        }
        // Let queued dispatch tasks drain
        tokio::time::sleep(Duration::from_millis(100)).await;

        let order = order.lock().clone();
        assert_eq!(order.first(), Some(&Direction::Enter));
        assert!(order.windows(2).all(|pair| pair[0] != pair[1]), "{:?}", order);

        let stats = engine.stats();
        assert!(stats.enters == stats.exits || stats.enters == stats.exits + 1);
        assert_eq!(stats.enters as usize, order.iter().filter(|d| **d == Direction::Enter).count());
        assert_eq!(engine.is_scene_active("cruise"), stats.enters == stats.exits + 1);
        assert_eq!(engine.scene_count(), 1);
        assert_eq!(engine.pending_timers(), 0);
    }

    #[test]
    fn test_new_requires_runtime() {
        let bus = Arc::new(InMemorySignalBus::new());
        assert!(matches!(SceneEngine::new(bus), Err(SceneError::NoRuntime)));
    }
}
