//! Step sequencing: which step, if any, is next for a conversation.

use chrono::{DateTime, Utc};

use crate::step::ReactivationStep;
use crate::window::WindowGate;

/// Outcome of looking at the next unexecuted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Every listed step has fired.
    Exhausted,
    /// The next step's cumulative wait has not elapsed yet.
    NotDue { index: usize, due_at_minutes: i64 },
    /// The next step is due but its time window is closed. Nothing advances.
    Deferred { index: usize },
    /// The next step should fire now.
    Due { index: usize },
}

/// Minutes after the anchor at which the step at `index` becomes due.
///
/// Sum of `wait_minutes` for every step up to and including `index`.
pub fn due_at_minutes(steps: &[ReactivationStep], index: usize) -> i64 {
    steps
        .iter()
        .take(index + 1)
        .map(|step| i64::from(step.wait_minutes))
        .sum()
}

/// Picks the single next step for a cursor.
///
/// Only the step right after `last_executed_step_index` is ever considered.
/// A long outage that makes several thresholds pass at once still yields one
/// step per evaluation, in list order.
pub struct StepSequencer<'a> {
    steps: &'a [ReactivationStep],
    gate: WindowGate,
}

impl<'a> StepSequencer<'a> {
    pub fn new(steps: &'a [ReactivationStep], gate: WindowGate) -> Self {
        Self { steps, gate }
    }

    pub fn next(&self, last_executed_step_index: i64, elapsed_minutes: i64, now: DateTime<Utc>) -> StepDecision {
        let index = (last_executed_step_index + 1).max(0) as usize;
        let Some(step) = self.steps.get(index) else {
            return StepDecision::Exhausted;
        };

        let due_at = due_at_minutes(self.steps, index);
        if elapsed_minutes < due_at {
            return StepDecision::NotDue {
                index,
                due_at_minutes: due_at,
            };
        }

        if !self.gate.allows(step.time_window.as_ref(), now) {
            return StepDecision::Deferred { index };
        }

        StepDecision::Due { index }
    }
}
