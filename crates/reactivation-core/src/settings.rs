//! Per-tenant reactivation settings.

use serde::{Deserialize, Serialize};

use crate::action::FallbackAction;
use crate::error::{ReactivationError, Result};
use crate::window::WindowGate;

/// Largest accepted business timezone offset (UTC+14:00).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

fn default_enabled() -> bool {
    true
}

/// Fallback policies and timezone for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivationSettings {
    pub tenant_id: String,
    /// Disabled tenants are skipped without side effects.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub exhausted_action: FallbackAction,
    #[serde(default)]
    pub exhausted_message: Option<String>,
    /// Ceiling on elapsed silence. `None` means unbounded.
    #[serde(default)]
    pub max_window_minutes: Option<u32>,
    #[serde(default)]
    pub max_window_action: FallbackAction,
    #[serde(default)]
    pub max_window_message: Option<String>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ReactivationSettings {
    /// Enabled settings with no max window and `do_nothing` fallbacks.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            enabled: true,
            exhausted_action: FallbackAction::DoNothing,
            exhausted_message: None,
            max_window_minutes: None,
            max_window_action: FallbackAction::DoNothing,
            max_window_message: None,
            utc_offset_minutes: 0,
        }
    }

    pub fn with_exhausted(mut self, action: FallbackAction, message: Option<&str>) -> Self {
        self.exhausted_action = action;
        self.exhausted_message = message.map(str::to_string);
        self
    }

    pub fn with_max_window(mut self, minutes: u32, action: FallbackAction, message: Option<&str>) -> Self {
        self.max_window_minutes = Some(minutes);
        self.max_window_action = action;
        self.max_window_message = message.map(str::to_string);
        self
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Window gate in this tenant's business timezone.
    pub fn window_gate(&self) -> WindowGate {
        WindowGate::new(self.utc_offset_minutes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ReactivationError::InvalidConfiguration(format!(
                "tenant {} has utc offset {} minutes, maximum is {}",
                self.tenant_id, self.utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
            )));
        }

        if self.max_window_minutes == Some(0) {
            return Err(ReactivationError::InvalidConfiguration(format!(
                "tenant {} has a zero-minute max window",
                self.tenant_id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let settings: ReactivationSettings =
            serde_json::from_str(r#"{"tenantId": "t1", "exhaustedAction": "end_conversation"}"#)
                .unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.exhausted_action, FallbackAction::CloseConversation);
        assert_eq!(settings.max_window_minutes, None);
        assert_eq!(settings.max_window_action, FallbackAction::DoNothing);
        assert_eq!(settings.utc_offset_minutes, 0);
    }

    #[test]
    fn test_validate() {
        assert!(ReactivationSettings::new("t1").validate().is_ok());
        assert!(ReactivationSettings::new("t1").with_utc_offset(-720).validate().is_ok());
        assert!(ReactivationSettings::new("t1").with_utc_offset(900).validate().is_err());
        assert!(ReactivationSettings::new("t1")
            .with_max_window(0, FallbackAction::DoNothing, None)
            .validate()
            .is_err());
    }
}
