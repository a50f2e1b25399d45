//! Duration tracker - debounce windows for plain conditions

use std::collections::HashMap;

use scene_core::{LeafCondition, SignalSource, Timestamp};

/// Debounce state of one plain condition after an observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Raw predicate is false
    Unmet,
    /// Raw predicate holds but the debounce window is still open
    Pending { remaining_ms: u64 },
    /// Raw predicate has held for at least the debounce window
    Satisfied,
}

impl Gate {
    #[inline]
    pub fn is_satisfied(self) -> bool {
        matches!(self, Gate::Satisfied)
    }

    /// Raw predicate currently holds
    #[inline]
    pub fn is_raw_true(self) -> bool {
        !matches!(self, Gate::Unmet)
    }
}

/// First-continuously-true timestamps, keyed by the condition's position in
/// its list
///
/// INVARIANT: an entry exists exactly while the last observation of that
/// condition was raw-true. The clock is never paused, only reset.
#[derive(Clone, Debug, Default)]
pub struct DurationTracker {
    first_true: HashMap<usize, Timestamp>,
}

impl DurationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw observation and report the condition's gate
    pub fn observe(&mut self, slot: usize, leaf: &LeafCondition, raw: bool, now: Timestamp) -> Gate {
        if !raw {
            self.first_true.remove(&slot);
            return Gate::Unmet;
        }

        let since = *self.first_true.entry(slot).or_insert(now);
        let elapsed = now.millis_since(since);
        if elapsed >= leaf.duration_ms {
            Gate::Satisfied
        } else {
            Gate::Pending {
                remaining_ms: leaf.duration_ms - elapsed,
            }
        }
    }

    /// Evaluate `leaf` against `source` and record the observation
    pub fn check<S: SignalSource + ?Sized>(
        &mut self,
        slot: usize,
        leaf: &LeafCondition,
        source: &S,
        now: Timestamp,
    ) -> Gate {
        let raw = leaf.evaluate(source);
        self.observe(slot, leaf, raw, now)
    }

    /// When the condition at `slot` was first seen continuously true
    pub fn first_true(&self, slot: usize) -> Option<Timestamp> {
        self.first_true.get(&slot).copied()
    }

    pub fn clear(&mut self) {
        self.first_true.clear();
    }

    pub fn len(&self) -> usize {
        self.first_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_true.is_empty()
    }
}
