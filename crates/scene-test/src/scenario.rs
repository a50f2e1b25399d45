//! Scenario runner - scripted signal timelines on paused Tokio time
//!
//! A [`Scenario`] is a list of timed events: signal publications and
//! expectations about scene state. [`ScenarioRunner`] replays it against a
//! real [`SceneEngine`] wired to an [`InMemorySignalBus`], moving the Tokio
//! clock forward between events so debounce timers fire exactly as they
//! would in a live process.
//!
//! The runner must be driven from a runtime with paused time
//! (`#[tokio::test(start_paused = true)]`).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scene_core::{Direction, Scene, SceneId, SceneResult, Signal, Value};
use scene_runtime::{EngineConfig, EngineStats, SceneEngine};
use scene_signal::InMemorySignalBus;
use tokio::time::Instant;

/// Yields granted to spawned tasks after every clock move or publication
const SETTLE_YIELDS: usize = 16;

/// One scripted step
#[derive(Clone, Debug, PartialEq)]
pub enum ScenarioEvent {
    Publish(Signal),
    ExpectActive { scene: SceneId, active: bool },
    ExpectTransitions { scene: SceneId, enters: usize, exits: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimedEvent {
    /// Offset from the runner's creation
    pub at_ms: u64,
    pub event: ScenarioEvent,
}

/// Timed script of publications and expectations
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    events: Vec<TimedEvent>,
    cursor_ms: u64,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Scenario {
            name: name.into(),
            events: Vec::new(),
            cursor_ms: 0,
        }
    }

    /// Place following events at an absolute offset
    pub fn at(mut self, at_ms: u64) -> Self {
        self.cursor_ms = at_ms;
        self
    }

    /// Move the cursor forward
    pub fn after(mut self, ms: u64) -> Self {
        self.cursor_ms += ms;
        self
    }

    pub fn publish(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(ScenarioEvent::Publish(Signal::new(key, value)))
    }

    pub fn expect_active(self, scene: &str) -> Self {
        self.push(ScenarioEvent::ExpectActive {
            scene: SceneId::new(scene),
            active: true,
        })
    }

    pub fn expect_inactive(self, scene: &str) -> Self {
        self.push(ScenarioEvent::ExpectActive {
            scene: SceneId::new(scene),
            active: false,
        })
    }

    /// Expect cumulative listener call counts for a scene
    pub fn expect_transitions(self, scene: &str, enters: usize, exits: usize) -> Self {
        self.push(ScenarioEvent::ExpectTransitions {
            scene: SceneId::new(scene),
            enters,
            exits,
        })
    }

    fn push(mut self, event: ScenarioEvent) -> Self {
        self.events.push(TimedEvent {
            at_ms: self.cursor_ms,
            event,
        });
        self
    }

    /// Events in replay order (stable by time)
    pub fn events(&self) -> Vec<TimedEvent> {
        let mut events = self.events.clone();
        events.sort_by_key(|e| e.at_ms);
        events
    }

    /// Offset of the last event
    pub fn duration_ms(&self) -> u64 {
        self.events.iter().map(|e| e.at_ms).max().unwrap_or(0)
    }
}

/// A transition observed through the scene's listeners
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRecord {
    pub at_ms: u64,
    pub scene: SceneId,
    pub direction: Direction,
}

/// Shared, append-only transition log
#[derive(Clone, Debug, Default)]
pub struct TransitionLog {
    records: Arc<Mutex<Vec<TransitionRecord>>>,
}

impl TransitionLog {
    pub fn record(&self, record: TransitionRecord) {
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self, scene: &SceneId, direction: Direction) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| &r.scene == scene && r.direction == direction)
            .count()
    }
}

/// An expectation that did not hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectationFailure {
    pub at_ms: u64,
    pub scene: SceneId,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={}ms {}: expected {}, got {}",
            self.at_ms, self.scene, self.expected, self.actual
        )
    }
}

/// Outcome of one scenario run
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub failures: Vec<ExpectationFailure>,
    pub transitions: Vec<TransitionRecord>,
    pub stats: EngineStats,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Panic with every failed expectation
    pub fn assert_passed(&self) {
        if !self.passed() {
            let lines: Vec<String> = self.failures.iter().map(|f| format!("  {}", f)).collect();
            panic!("scenario '{}' failed:\n{}", self.name, lines.join("\n"));
        }
    }
}

/// Drives a [`SceneEngine`] through scripted scenarios
pub struct ScenarioRunner {
    bus: Arc<InMemorySignalBus>,
    engine: SceneEngine,
    log: TransitionLog,
    origin: Instant,
}

impl ScenarioRunner {
    pub fn new() -> SceneResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> SceneResult<Self> {
        let bus = Arc::new(InMemorySignalBus::new());
        let engine = SceneEngine::with_config(bus.clone(), config)?;
        Ok(ScenarioRunner {
            bus,
            engine,
            log: TransitionLog::default(),
            origin: Instant::now(),
        })
    }

    /// Register a scene with transition recording attached
    pub fn add_scene(&self, scene: Scene) -> SceneResult<()> {
        for direction in [Direction::Enter, Direction::Exit] {
            let log = self.log.clone();
            let origin = self.origin;
            let id = scene.id.clone();
            let record = move |_: &[scene_core::Action]| {
                log.record(TransitionRecord {
                    at_ms: origin.elapsed().as_millis() as u64,
                    scene: id.clone(),
                    direction,
                });
            };
            match direction {
                Direction::Enter => scene.on_enter(record),
                Direction::Exit => scene.on_exit(record),
            }
        }
        self.engine.add_scene(scene)
    }

    pub fn add_scenes(&self, scenes: impl IntoIterator<Item = Scene>) -> SceneResult<()> {
        for scene in scenes {
            self.add_scene(scene)?;
        }
        Ok(())
    }

    pub fn engine(&self) -> &SceneEngine {
        &self.engine
    }

    pub fn bus(&self) -> &Arc<InMemorySignalBus> {
        &self.bus
    }

    pub fn log(&self) -> &TransitionLog {
        &self.log
    }

    /// Milliseconds since the runner was created
    pub fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Let spawned evaluation and timer tasks run
    pub async fn settle(&self) {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    /// Move the clock to `at_ms`; earlier offsets are a no-op
    ///
    /// Sleeps instead of jumping, so the paused clock auto-advances through
    /// every timer due on the way and each one fires at its own deadline.
    pub async fn advance_to(&self, at_ms: u64) {
        if at_ms > self.elapsed_ms() {
            tokio::time::sleep_until(self.origin + Duration::from_millis(at_ms)).await;
        }
        self.settle().await;
    }

    pub async fn publish(&self, signal: Signal) {
        tracing::debug!(key = %signal.key, value = %signal.value, at_ms = self.elapsed_ms(), "scenario publish");
        self.bus.publish(signal);
        self.settle().await;
    }

    /// Replay a scenario and collect every failed expectation
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let mut failures = Vec::new();

        for timed in scenario.events() {
            self.advance_to(timed.at_ms).await;
            match timed.event {
                ScenarioEvent::Publish(signal) => self.publish(signal).await,
                ScenarioEvent::ExpectActive { scene, active } => {
                    let actual = self.engine.is_scene_active(scene.as_str());
                    if actual != active {
                        failures.push(ExpectationFailure {
                            at_ms: timed.at_ms,
                            scene,
                            expected: state_name(active).to_string(),
                            actual: state_name(actual).to_string(),
                        });
                    }
                }
                ScenarioEvent::ExpectTransitions { scene, enters, exits } => {
                    let actual = (
                        self.log.count(&scene, Direction::Enter),
                        self.log.count(&scene, Direction::Exit),
                    );
                    if actual != (enters, exits) {
                        failures.push(ExpectationFailure {
                            at_ms: timed.at_ms,
                            scene,
                            expected: format!("{} enters / {} exits", enters, exits),
                            actual: format!("{} enters / {} exits", actual.0, actual.1),
                        });
                    }
                }
            }
        }

        ScenarioReport {
            name: scenario.name.clone(),
            failures,
            transitions: self.log.records(),
            stats: self.engine.stats(),
        }
    }
}

fn state_name(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}
