//! Fallback resolution and the per-tick decision.

use chrono::{DateTime, Utc};

use crate::action::{ActionOrigin, PlannedAction};
use crate::cursor::ReactivationCursor;
use crate::sequencer::{StepDecision, StepSequencer};
use crate::settings::ReactivationSettings;
use crate::silence::Silence;
use crate::step::ReactivationStep;

/// Why nothing happens this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The next step's cumulative wait has not elapsed.
    NotDue { index: usize, due_at_minutes: i64 },
    /// The next step is due but its window is closed.
    OutsideWindow { index: usize },
    /// The cursor is already resolved.
    Resolved,
}

/// What the engine should do for one conversation this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Execute(PlannedAction),
    Wait(WaitReason),
}

/// Applies the tenant's ceilings before deferring to the step sequencer.
///
/// Priority, checked on every tick:
/// 1. max window exceeded → max-window fallback, even if a step is due
/// 2. no next step → exhausted fallback
/// 3. the sequencer's decision
pub struct FallbackResolver<'a> {
    settings: &'a ReactivationSettings,
    steps: &'a [ReactivationStep],
}

impl<'a> FallbackResolver<'a> {
    pub fn new(settings: &'a ReactivationSettings, steps: &'a [ReactivationStep]) -> Self {
        Self { settings, steps }
    }

    /// Decide using silence measured from the cursor's anchor.
    pub fn decide(&self, cursor: &ReactivationCursor, now: DateTime<Utc>) -> Decision {
        self.decide_with(cursor, Silence::measure(cursor.anchor_at, now), now)
    }

    pub fn decide_with(&self, cursor: &ReactivationCursor, silence: Silence, now: DateTime<Utc>) -> Decision {
        if cursor.is_resolved() {
            return Decision::Wait(WaitReason::Resolved);
        }

        if let Some(max_window) = self.settings.max_window_minutes {
            if silence.elapsed_minutes > i64::from(max_window) {
                return Decision::Execute(PlannedAction::from_fallback(
                    ActionOrigin::MaxWindow,
                    self.settings.max_window_action,
                    self.settings.max_window_message.as_deref(),
                ));
            }
        }

        let sequencer = StepSequencer::new(self.steps, self.settings.window_gate());
        match sequencer.next(cursor.last_executed_step_index, silence.elapsed_minutes, now) {
            StepDecision::Exhausted => Decision::Execute(PlannedAction::from_fallback(
                ActionOrigin::Exhausted,
                self.settings.exhausted_action,
                self.settings.exhausted_message.as_deref(),
            )),
            StepDecision::NotDue {
                index,
                due_at_minutes,
            } => Decision::Wait(WaitReason::NotDue {
                index,
                due_at_minutes,
            }),
            StepDecision::Deferred { index } => Decision::Wait(WaitReason::OutsideWindow { index }),
            StepDecision::Due { index } => {
                Decision::Execute(PlannedAction::from_step(index, &self.steps[index]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ConversationEffect, FallbackAction, StepAction};
    use crate::cursor::CursorStatus;
    use crate::window::TimeWindow;
    use chrono::{Duration, TimeZone};

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 9, 0, 0).unwrap()
    }

    fn cursor_at(index: i64) -> ReactivationCursor {
        let mut cursor = ReactivationCursor::fresh("conv", "tenant", anchor());
        cursor.last_executed_step_index = index;
        cursor
    }

    fn after(minutes: i64) -> DateTime<Utc> {
        anchor() + Duration::minutes(minutes)
    }

    fn origin(decision: &Decision) -> Option<ActionOrigin> {
        match decision {
            Decision::Execute(action) => Some(action.origin),
            Decision::Wait(_) => None,
        }
    }

    #[test]
    fn test_max_window_preempts_due_step() {
        let steps = vec![ReactivationStep::new("s0", 90, StepAction::SendMessage)];
        let settings = ReactivationSettings::new("tenant").with_max_window(
            60,
            FallbackAction::CloseConversation,
            Some("We'll close this for now."),
        );
        let resolver = FallbackResolver::new(&settings, &steps);

        match resolver.decide(&cursor_at(-1), after(65)) {
            Decision::Execute(action) => {
                assert_eq!(action.origin, ActionOrigin::MaxWindow);
                assert_eq!(action.effect, ConversationEffect::Close);
                assert_eq!(action.message.as_deref(), Some("We'll close this for now."));
                assert!(action.cursor_target().resolve);
            }
            other => panic!("expected max-window fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_max_window_requires_strictly_greater() {
        let steps = vec![ReactivationStep::new("s0", 90, StepAction::SendMessage)];
        let settings =
            ReactivationSettings::new("tenant").with_max_window(60, FallbackAction::DoNothing, None);
        let resolver = FallbackResolver::new(&settings, &steps);

        assert!(matches!(
            resolver.decide(&cursor_at(-1), after(60)),
            Decision::Wait(WaitReason::NotDue { index: 0, .. })
        ));
        assert_eq!(
            origin(&resolver.decide(&cursor_at(-1), after(61))),
            Some(ActionOrigin::MaxWindow)
        );
    }

    #[test]
    fn test_max_window_preempts_even_a_due_step() {
        let steps = vec![ReactivationStep::new("s0", 10, StepAction::SendMessage)];
        let settings =
            ReactivationSettings::new("tenant").with_max_window(30, FallbackAction::DoNothing, None);
        let resolver = FallbackResolver::new(&settings, &steps);

        assert_eq!(
            origin(&resolver.decide(&cursor_at(-1), after(31))),
            Some(ActionOrigin::MaxWindow)
        );
    }

    #[test]
    fn test_exhaustion_after_last_step() {
        let steps = vec![
            ReactivationStep::new("s0", 10, StepAction::SendMessage),
            ReactivationStep::new("s1", 10, StepAction::SendMessage),
        ];
        let settings = ReactivationSettings::new("tenant")
            .with_exhausted(FallbackAction::TransferToHuman, None);
        let resolver = FallbackResolver::new(&settings, &steps);

        match resolver.decide(&cursor_at(1), after(100)) {
            Decision::Execute(action) => {
                assert_eq!(action.origin, ActionOrigin::Exhausted);
                assert_eq!(action.effect, ConversationEffect::TransferToHuman);
                assert_eq!(action.message, None);
            }
            other => panic!("expected exhausted fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_resolved_cursor_waits() {
        let mut cursor = cursor_at(0);
        cursor.status = CursorStatus::Resolved;
        let settings = ReactivationSettings::new("tenant");
        let resolver = FallbackResolver::new(&settings, &[]);
        assert_eq!(
            resolver.decide(&cursor, after(1_000)),
            Decision::Wait(WaitReason::Resolved)
        );
    }

    #[test]
    fn test_window_deferral_then_fire() {
        // Anchor 13:30, step due at 30 minutes, window 22:00-06:00
        let anchor = Utc.with_ymd_and_hms(2026, 5, 20, 13, 30, 0).unwrap();
        let window = TimeWindow::parse("22:00", "06:00").unwrap();
        let steps = vec![ReactivationStep::new("s0", 30, StepAction::SendMessage).with_window(window)];
        let settings = ReactivationSettings::new("tenant");
        let resolver = FallbackResolver::new(&settings, &steps);
        let cursor = ReactivationCursor::fresh("conv", "tenant", anchor);

        let at_two_pm = Utc.with_ymd_and_hms(2026, 5, 20, 14, 0, 0).unwrap();
        let silence = Silence::measure(anchor, at_two_pm);
        assert_eq!(silence.elapsed_minutes, 30);
        assert_eq!(
            resolver.decide_with(&cursor, silence, at_two_pm),
            Decision::Wait(WaitReason::OutsideWindow { index: 0 })
        );

        // Same elapsed time, evaluated at 23:00
        let at_eleven_pm = Utc.with_ymd_and_hms(2026, 5, 20, 23, 0, 0).unwrap();
        assert_eq!(
            origin(&resolver.decide_with(&cursor, silence, at_eleven_pm)),
            Some(ActionOrigin::Step { index: 0 })
        );
    }

    #[test]
    fn test_two_step_scenario() {
        let steps = vec![
            ReactivationStep::new("s0", 30, StepAction::SendMessage).with_parameter("Hi again!"),
            ReactivationStep::new("s1", 60, StepAction::CloseConversation),
        ];
        let settings = ReactivationSettings::new("tenant")
            .with_exhausted(FallbackAction::CloseConversation, None);
        let resolver = FallbackResolver::new(&settings, &steps);

        let first = resolver.decide(&cursor_at(-1), after(30));
        assert_eq!(origin(&first), Some(ActionOrigin::Step { index: 0 }));

        assert!(matches!(
            resolver.decide(&cursor_at(0), after(45)),
            Decision::Wait(WaitReason::NotDue {
                index: 1,
                due_at_minutes: 90
            })
        ));

        match resolver.decide(&cursor_at(0), after(90)) {
            Decision::Execute(action) => {
                assert_eq!(action.origin, ActionOrigin::Step { index: 1 });
                assert_eq!(action.effect, ConversationEffect::Close);
                assert!(action.cursor_target().resolve);
            }
            other => panic!("expected close step, got {:?}", other),
        }
    }

    #[test]
    fn test_no_steps_falls_straight_to_exhausted() {
        let settings =
            ReactivationSettings::new("tenant").with_exhausted(FallbackAction::SendMessage, Some("Hello?"));
        let resolver = FallbackResolver::new(&settings, &[]);
        match resolver.decide(&cursor_at(-1), after(1)) {
            Decision::Execute(action) => {
                assert_eq!(action.origin, ActionOrigin::Exhausted);
                assert_eq!(action.message.as_deref(), Some("Hello?"));
            }
            other => panic!("expected exhausted fallback, got {:?}", other),
        }
    }
}
