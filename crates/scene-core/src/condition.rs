//! Condition model
//!
//! A condition is either a leaf predicate over one signal, optionally gated by
//! a debounce duration, or an ordered sequence of leaf steps. Sequence steps
//! are leaves by construction, so sequences cannot nest.

use serde::{Deserialize, Serialize};

use crate::{SignalSource, Value};

/// Default maximum gap between two consecutive sequence steps
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5000;

/// Leaf predicate over a single signal value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Exact value equality
    Equals { expected: Value },
    /// Strictly greater than, numeric values only
    GreaterThan { threshold: f64 },
    /// Strictly less than, numeric values only
    LessThan { threshold: f64 },
    /// Inclusive range, numeric values only
    Between { low: f64, high: f64 },
    /// Membership by exact equality
    InSet { allowed: Vec<Value> },
    /// Substring match on the display form of both operands
    Contains { needle: Value },
}

impl Predicate {
    /// Check the predicate against an observed value
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals { expected } => value == expected,
            Predicate::GreaterThan { threshold } => {
                value.as_f64().map_or(false, |v| v > *threshold)
            }
            Predicate::LessThan { threshold } => value.as_f64().map_or(false, |v| v < *threshold),
            Predicate::Between { low, high } => {
                value.as_f64().map_or(false, |v| v >= *low && v <= *high)
            }
            Predicate::InSet { allowed } => allowed.contains(value),
            Predicate::Contains { needle } => value.to_string().contains(&needle.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Equals { .. } => "equals",
            Predicate::GreaterThan { .. } => "greater_than",
            Predicate::LessThan { .. } => "less_than",
            Predicate::Between { .. } => "between",
            Predicate::InSet { .. } => "in_set",
            Predicate::Contains { .. } => "contains",
        }
    }
}

/// A predicate bound to a signal key, with an optional debounce window
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafCondition {
    pub key: String,
    #[serde(flatten)]
    pub predicate: Predicate,
    /// How long the raw predicate must hold continuously (0 = immediately)
    #[serde(default)]
    pub duration_ms: u64,
}

impl LeafCondition {
    pub fn new(key: impl Into<String>, predicate: Predicate) -> Self {
        LeafCondition {
            key: key.into(),
            predicate,
            duration_ms: 0,
        }
    }

    pub fn equals(key: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::new(
            key,
            Predicate::Equals {
                expected: expected.into(),
            },
        )
    }

    pub fn greater_than(key: impl Into<String>, threshold: f64) -> Self {
        Self::new(key, Predicate::GreaterThan { threshold })
    }

    pub fn less_than(key: impl Into<String>, threshold: f64) -> Self {
        Self::new(key, Predicate::LessThan { threshold })
    }

    pub fn between(key: impl Into<String>, low: f64, high: f64) -> Self {
        Self::new(key, Predicate::Between { low, high })
    }

    pub fn in_set<V: Into<Value>>(key: impl Into<String>, allowed: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            key,
            Predicate::InSet {
                allowed: allowed.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn contains(key: impl Into<String>, needle: impl Into<Value>) -> Self {
        Self::new(
            key,
            Predicate::Contains {
                needle: needle.into(),
            },
        )
    }

    /// Require the predicate to hold continuously for `duration_ms`
    pub fn debounced(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Raw predicate check; an unobserved signal never holds
    #[inline]
    pub fn holds(&self, current: Option<&Value>) -> bool {
        current.map_or(false, |value| self.predicate.matches(value))
    }

    /// Raw predicate check against the latest value in `source`
    #[inline]
    pub fn evaluate<S: SignalSource + ?Sized>(&self, source: &S) -> bool {
        self.holds(source.current_value(&self.key).as_ref())
    }
}

/// One step of an ordered sequence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub condition: LeafCondition,
    /// Maximum gap after the previous step matched; ignored for the first step
    #[serde(default = "default_step_timeout")]
    pub timeout_ms: u64,
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

impl SequenceStep {
    pub fn new(condition: LeafCondition, timeout_ms: u64) -> Self {
        SequenceStep {
            condition,
            timeout_ms,
        }
    }

    /// A step with the default inter-step timeout
    pub fn of(condition: LeafCondition) -> Self {
        Self::new(condition, DEFAULT_STEP_TIMEOUT_MS)
    }
}

/// Ordered multi-step condition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceCondition {
    pub steps: Vec<SequenceStep>,
}

impl SequenceCondition {
    pub fn new(steps: Vec<SequenceStep>) -> Self {
        SequenceCondition { steps }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Scene rule condition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Leaf(LeafCondition),
    Sequence(SequenceCondition),
}

impl Condition {
    pub fn equals(key: impl Into<String>, expected: impl Into<Value>) -> Self {
        Condition::Leaf(LeafCondition::equals(key, expected))
    }

    pub fn greater_than(key: impl Into<String>, threshold: f64) -> Self {
        Condition::Leaf(LeafCondition::greater_than(key, threshold))
    }

    pub fn less_than(key: impl Into<String>, threshold: f64) -> Self {
        Condition::Leaf(LeafCondition::less_than(key, threshold))
    }

    pub fn between(key: impl Into<String>, low: f64, high: f64) -> Self {
        Condition::Leaf(LeafCondition::between(key, low, high))
    }

    pub fn in_set<V: Into<Value>>(key: impl Into<String>, allowed: impl IntoIterator<Item = V>) -> Self {
        Condition::Leaf(LeafCondition::in_set(key, allowed))
    }

    pub fn contains(key: impl Into<String>, needle: impl Into<Value>) -> Self {
        Condition::Leaf(LeafCondition::contains(key, needle))
    }

    pub fn sequence(steps: Vec<SequenceStep>) -> Self {
        Condition::Sequence(SequenceCondition::new(steps))
    }

    /// Set the debounce window of a leaf condition. Sequences carry their
    /// durations on their steps, so this leaves them unchanged.
    pub fn debounced(self, duration_ms: u64) -> Self {
        match self {
            Condition::Leaf(leaf) => Condition::Leaf(leaf.debounced(duration_ms)),
            sequence @ Condition::Sequence(_) => sequence,
        }
    }

    /// Debounce window; always 0 for a sequence
    pub fn duration_ms(&self) -> u64 {
        match self {
            Condition::Leaf(leaf) => leaf.duration_ms,
            Condition::Sequence(_) => 0,
        }
    }

    /// Raw check against a single value. A sequence cannot be decided from
    /// one value and always reports false.
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match self {
            Condition::Leaf(leaf) => leaf.holds(current),
            Condition::Sequence(_) => false,
        }
    }

    /// Every signal key this condition depends on, sequence steps unpacked
    pub fn signal_keys(&self) -> Vec<&str> {
        match self {
            Condition::Leaf(leaf) => vec![leaf.key.as_str()],
            Condition::Sequence(seq) => seq
                .steps
                .iter()
                .map(|step| step.condition.key.as_str())
                .collect(),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafCondition> {
        match self {
            Condition::Leaf(leaf) => Some(leaf),
            Condition::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceCondition> {
        match self {
            Condition::Sequence(seq) => Some(seq),
            Condition::Leaf(_) => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Condition::Sequence(_))
    }
}

impl From<LeafCondition> for Condition {
    fn from(leaf: LeafCondition) -> Self {
        Condition::Leaf(leaf)
    }
}

impl From<SequenceCondition> for Condition {
    fn from(seq: SequenceCondition) -> Self {
        Condition::Sequence(seq)
    }
}
