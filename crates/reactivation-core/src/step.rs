//! Configured reactivation steps.

use serde::{Deserialize, Serialize};

use crate::action::StepAction;
use crate::error::{ReactivationError, Result};
use crate::window::TimeWindow;

/// Shortest allowed wait between steps.
pub const MIN_WAIT_MINUTES: u32 = 1;

/// Longest allowed wait between steps (one week).
pub const MAX_WAIT_MINUTES: u32 = 10_080;

/// One timed action in a tenant's reactivation sequence.
///
/// The engine executes steps in the order they are listed. `order` is kept
/// for the configuration editor and is never used for sequencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivationStep {
    pub id: String,
    #[serde(default)]
    pub order: i64,
    /// Minutes after the previous step (or the anchor, for the first step).
    pub wait_minutes: u32,
    pub action_type: StepAction,
    #[serde(default)]
    pub action_parameter: Option<String>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl ReactivationStep {
    pub fn new(id: impl Into<String>, wait_minutes: u32, action_type: StepAction) -> Self {
        Self {
            id: id.into(),
            order: 0,
            wait_minutes,
            action_type,
            action_parameter: None,
            time_window: None,
            tag_ids: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.action_parameter = Some(parameter.into());
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_ids = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_WAIT_MINUTES..=MAX_WAIT_MINUTES).contains(&self.wait_minutes) {
            return Err(ReactivationError::InvalidConfiguration(format!(
                "step {} waits {} minutes, allowed range is {}-{}",
                self.id, self.wait_minutes, MIN_WAIT_MINUTES, MAX_WAIT_MINUTES
            )));
        }

        if let Some(window) = &self.time_window {
            window.validate()?;
        }

        if self.tag_ids.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ReactivationError::InvalidConfiguration(format!(
                "step {} has an empty tag id",
                self.id
            )));
        }

        Ok(())
    }
}

/// Validate a whole step list.
pub fn validate_steps(steps: &[ReactivationStep]) -> Result<()> {
    steps.iter().try_for_each(ReactivationStep::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_bounds() {
        assert!(ReactivationStep::new("a", 0, StepAction::SendMessage).validate().is_err());
        assert!(ReactivationStep::new("a", 1, StepAction::SendMessage).validate().is_ok());
        assert!(ReactivationStep::new("a", 10_080, StepAction::SendMessage).validate().is_ok());
        assert!(ReactivationStep::new("a", 10_081, StepAction::SendMessage).validate().is_err());
    }

    #[test]
    fn test_rejects_bad_window_and_tags() {
        let step = ReactivationStep::new("a", 5, StepAction::SendMessage)
            .with_window(TimeWindow { start: 2000, end: 10 });
        assert!(step.validate().is_err());

        let step = ReactivationStep::new("a", 5, StepAction::SendMessage).with_tags(["vip", " "]);
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_deserialize_editor_payload() {
        let json = r#"{
            "id": "step-1",
            "order": 3,
            "waitMinutes": 45,
            "actionType": "send_audio",
            "actionParameter": "",
            "timeWindow": {"start": 540, "end": 1080},
            "tagIds": ["follow-up"]
        }"#;
        let step: ReactivationStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.action_type, StepAction::SendMessage);
        assert_eq!(step.wait_minutes, 45);
        assert_eq!(step.time_window, Some(TimeWindow { start: 540, end: 1080 }));
        assert!(validate_steps(&[step]).is_ok());
    }
}
