//! Sequence matcher - ordered steps with inter-step timeouts
//!
//! Progress moves forward one step per triggering signal and falls back to
//! the first step whenever:
//! - a step already matched no longer holds on re-check
//! - the gap since the last match exceeds the pending step's timeout
//! - the pending step's own signal reports a value that does not satisfy it
//!
//! A full match is edge-triggered: it is reported on the evaluation that
//! matched the last step and leaves the cursor where it is. The caller
//! resets the state once it has consumed the match.

use scene_core::{SequenceCondition, Signal, SignalSource, Timestamp};

/// Progress cursor of one sequence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceState {
    /// Index of the step waiting to be matched
    pub progress: usize,
    /// When the previous step matched
    pub last_matched_at: Option<Timestamp>,
}

/// Why progress fell back to the first step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetCause {
    /// An earlier step stopped holding
    PredecessorLost { step: usize },
    /// The pending step arrived too late
    TimedOut { step: usize, waited_ms: u64 },
    /// The pending step's signal changed to a non-matching value
    Contradicted { step: usize },
}

/// Result of feeding one evaluation to the matcher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The last step matched on this evaluation
    Matched,
    /// A step matched; `index` is now pending
    Advanced { index: usize },
    /// Nothing changed
    Waiting,
    /// Progress fell back to the first step
    Reset(ResetCause),
}

impl SequenceOutcome {
    #[inline]
    pub fn is_match(self) -> bool {
        matches!(self, SequenceOutcome::Matched)
    }
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.progress = 0;
        self.last_matched_at = None;
    }

    /// Feed one triggering signal to the matcher
    ///
    /// Conditions are evaluated against `source`, the current signal table;
    /// `trigger` only decides which step the event is about. Without a
    /// trigger the first step can never match.
    pub fn advance<S: SignalSource + ?Sized>(
        &mut self,
        seq: &SequenceCondition,
        trigger: Option<&Signal>,
        source: &S,
        now: Timestamp,
    ) -> SequenceOutcome {
        let index = self.progress;
        if index == 0 && trigger.is_none() {
            return SequenceOutcome::Waiting;
        }

        let Some(step) = seq.steps.get(index) else {
            self.reset();
            return SequenceOutcome::Waiting;
        };

        // Steps already matched must still hold
        for (i, done) in seq.steps[..index].iter().enumerate() {
            if !done.condition.evaluate(source) {
                self.reset();
                return SequenceOutcome::Reset(ResetCause::PredecessorLost { step: i });
            }
        }

        if index > 0 {
            let waited_ms = now.millis_since(self.last_matched_at.unwrap_or(Timestamp::ZERO));
            if waited_ms > step.timeout_ms {
                self.reset();
                return SequenceOutcome::Reset(ResetCause::TimedOut {
                    step: index,
                    waited_ms,
                });
            }
        }

        let Some(signal) = trigger else {
            return SequenceOutcome::Waiting;
        };
        if signal.key != step.condition.key {
            return SequenceOutcome::Waiting;
        }

        if step.condition.evaluate(source) {
            if index + 1 == seq.steps.len() {
                return SequenceOutcome::Matched;
            }
            self.progress = index + 1;
            self.last_matched_at = Some(now);
            SequenceOutcome::Advanced { index: index + 1 }
        } else if index > 0 {
            self.reset();
            SequenceOutcome::Reset(ResetCause::Contradicted { step: index })
        } else {
            SequenceOutcome::Waiting
        }
    }
}
