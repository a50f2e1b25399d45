//! Rule evaluation pipeline
//!
//! One pass over one direction of one scene:
//! - Enter rules combine by conjunction: every plain condition must have
//!   cleared its debounce window and the sequence (if any) must fully match
//!   on this very evaluation.
//! - Exit rules combine by disjunction: any satisfied condition exits.
//!
//! The pass mutates only the direction's own state and reports what the
//! caller should do next.

use scene_core::{Condition, Signal, SignalSource, Timestamp};

use crate::{DirectionState, Gate, SequenceOutcome};

/// What the caller should do after an evaluation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The rule is satisfied; transition now
    Fire,
    /// The rule could become satisfied by time alone after this many ms
    WakeAfter(u64),
    /// No time-only path to satisfaction; drop any pending wake-up
    Idle,
}

/// Result of one evaluation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Sequence matcher outcome, if the list has a sequence and it was fed
    pub sequence: Option<SequenceOutcome>,
}

impl Evaluation {
    fn new(verdict: Verdict, sequence: Option<SequenceOutcome>) -> Self {
        Evaluation { verdict, sequence }
    }
}

/// Evaluate an enter rule (conjunction)
///
/// The sequence matcher only runs when a signal triggered the pass; on a
/// timer wake-up a sequence counts as unmatched. Because a sequence match
/// is edge-triggered, a list containing one never asks for a wake-up.
pub fn evaluate_enter<S: SignalSource + ?Sized>(
    conditions: &[Condition],
    state: &mut DirectionState,
    trigger: Option<&Signal>,
    source: &S,
    now: Timestamp,
) -> Evaluation {
    if conditions.is_empty() {
        return Evaluation::new(Verdict::Idle, None);
    }

    let mut has_sequence = false;
    let mut sequence = None;
    let mut all_raw_true = true;
    let mut all_satisfied = true;
    let mut longest_wait = 0u64;

    for (slot, condition) in conditions.iter().enumerate() {
        match condition {
            Condition::Sequence(seq) => {
                has_sequence = true;
                if trigger.is_some() {
                    sequence = Some(state.sequence.advance(seq, trigger, source, now));
                }
            }
            Condition::Leaf(leaf) => match state.durations.check(slot, leaf, source, now) {
                Gate::Satisfied => {}
                Gate::Pending { remaining_ms } => {
                    all_satisfied = false;
                    longest_wait = longest_wait.max(remaining_ms);
                }
                Gate::Unmet => {
                    all_raw_true = false;
                    all_satisfied = false;
                }
            },
        }
    }

    let sequence_matched = !has_sequence || sequence.map_or(false, SequenceOutcome::is_match);

    let verdict = if sequence_matched && all_satisfied {
        Verdict::Fire
    } else if !has_sequence && all_raw_true {
        Verdict::WakeAfter(longest_wait)
    } else {
        Verdict::Idle
    };

    Evaluation::new(verdict, sequence)
}

/// Evaluate an exit rule (disjunction)
///
/// Every condition is observed on each pass, even after one is found
/// satisfied, so debounce clocks stay accurate.
pub fn evaluate_exit<S: SignalSource + ?Sized>(
    conditions: &[Condition],
    state: &mut DirectionState,
    trigger: Option<&Signal>,
    source: &S,
    now: Timestamp,
) -> Evaluation {
    if conditions.is_empty() {
        return Evaluation::new(Verdict::Idle, None);
    }

    let mut any_satisfied = false;
    let mut sequence = None;
    let mut shortest_wait: Option<u64> = None;

    for (slot, condition) in conditions.iter().enumerate() {
        match condition {
            Condition::Sequence(seq) => {
                if trigger.is_some() {
                    let outcome = state.sequence.advance(seq, trigger, source, now);
                    any_satisfied |= outcome.is_match();
                    sequence = Some(outcome);
                }
            }
            Condition::Leaf(leaf) => match state.durations.check(slot, leaf, source, now) {
                Gate::Satisfied => any_satisfied = true,
                Gate::Pending { remaining_ms } => {
                    shortest_wait = Some(shortest_wait.map_or(remaining_ms, |w| w.min(remaining_ms)));
                }
                Gate::Unmet => {}
            },
        }
    }

    let verdict = if any_satisfied {
        Verdict::Fire
    } else if let Some(wait) = shortest_wait {
        Verdict::WakeAfter(wait)
    } else {
        Verdict::Idle
    };

    Evaluation::new(verdict, sequence)
}
