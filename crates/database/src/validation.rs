//! Input validation for reactivation configuration written by the editor.
//!
//! Action names, wait bounds, window bounds and the timezone offset range
//! belong to `reactivation_core`; this module applies them to raw records and
//! only adds storage limits such as message length.

use std::fmt;

use reactivation_core::{
    FallbackAction, StepAction, MAX_UTC_OFFSET_MINUTES, MAX_WAIT_MINUTES, MINUTES_PER_DAY,
    MIN_WAIT_MINUTES,
};

use crate::models::{SettingsRecord, StepRecord};

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unknown step or fallback action.
    UnknownAction(String),
    /// Numeric value outside its allowed range.
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },
    /// Only one of the two window bounds is set.
    IncompleteWindow(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownAction(action) => write!(f, "Unknown action: {}", action),
            ValidationError::OutOfRange {
                field,
                min,
                max,
                actual,
            } => write!(f, "{} is {} (allowed {}..={})", field, actual, min, max),
            ValidationError::IncompleteWindow(step) => {
                write!(f, "Step {} has only one time window bound", step)
            }
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for follow-up and fallback messages.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Validate a step before it is stored.
pub fn validate_step(step: &StepRecord) -> Result<(), ValidationError> {
    if step.id.trim().is_empty() {
        return Err(ValidationError::Empty("step id".to_string()));
    }

    if step.action_type.parse::<StepAction>().is_err() {
        return Err(ValidationError::UnknownAction(step.action_type.clone()));
    }

    check_range(
        "wait_minutes",
        step.wait_minutes,
        i64::from(MIN_WAIT_MINUTES),
        i64::from(MAX_WAIT_MINUTES),
    )?;

    let last_minute_of_day = i64::from(MINUTES_PER_DAY) - 1;
    match (step.window_start, step.window_end) {
        (Some(start), Some(end)) => {
            check_range("window_start", start, 0, last_minute_of_day)?;
            check_range("window_end", end, 0, last_minute_of_day)?;
        }
        (None, None) => {}
        _ => return Err(ValidationError::IncompleteWindow(step.id.clone())),
    }

    if let Some(parameter) = &step.action_parameter {
        check_length("action_parameter", parameter)?;
    }

    Ok(())
}

/// Validate tenant settings before they are stored.
pub fn validate_settings(settings: &SettingsRecord) -> Result<(), ValidationError> {
    if settings.tenant_id.trim().is_empty() {
        return Err(ValidationError::Empty("tenant id".to_string()));
    }

    for action in [&settings.exhausted_action, &settings.max_window_action] {
        if action.parse::<FallbackAction>().is_err() {
            return Err(ValidationError::UnknownAction(action.clone()));
        }
    }

    if let Some(minutes) = settings.max_window_minutes {
        check_range("max_window_minutes", minutes, 1, i64::from(u32::MAX))?;
    }

    check_range(
        "utc_offset_minutes",
        settings.utc_offset_minutes,
        -i64::from(MAX_UTC_OFFSET_MINUTES),
        i64::from(MAX_UTC_OFFSET_MINUTES),
    )?;

    for message in [&settings.exhausted_message, &settings.max_window_message]
        .into_iter()
        .flatten()
    {
        check_length("fallback message", message)?;
    }

    Ok(())
}

fn check_range(field: &str, actual: i64, min: i64, max: i64) -> Result<(), ValidationError> {
    if actual < min || actual > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn check_length(field: &str, value: &str) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_MESSAGE_LENGTH,
            actual,
        });
    }
    Ok(())
}
