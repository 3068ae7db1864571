//! Step and fallback action types, and the planned action the executor applies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReactivationError;
use crate::step::ReactivationStep;

/// What a configured step does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Send `action_parameter` (possibly empty) to the contact.
    ///
    /// `send_audio` is a legacy editor value and reads as this variant.
    #[serde(alias = "send_audio")]
    SendMessage,
    /// Close the conversation.
    CloseConversation,
    /// Hand the conversation to a human agent.
    TransferToHuman,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::CloseConversation => "close_conversation",
            Self::TransferToHuman => "transfer_to_human",
        }
    }
}

impl FromStr for StepAction {
    type Err = ReactivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "send_message" | "send_audio" => Ok(Self::SendMessage),
            "close_conversation" => Ok(Self::CloseConversation),
            "transfer_to_human" => Ok(Self::TransferToHuman),
            other => Err(ReactivationError::InvalidConfiguration(format!(
                "unknown step action: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal action applied when steps run out or the max window is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Stop evaluating without any external side effect.
    #[default]
    DoNothing,
    /// Send the fallback message.
    SendMessage,
    /// Close the conversation.
    #[serde(alias = "end_conversation")]
    CloseConversation,
    /// Hand the conversation to a human agent.
    TransferToHuman,
}

impl FallbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoNothing => "do_nothing",
            Self::SendMessage => "send_message",
            Self::CloseConversation => "close_conversation",
            Self::TransferToHuman => "transfer_to_human",
        }
    }
}

impl FromStr for FallbackAction {
    type Err = ReactivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "do_nothing" => Ok(Self::DoNothing),
            "send_message" | "send_audio" => Ok(Self::SendMessage),
            "close_conversation" | "end_conversation" => Ok(Self::CloseConversation),
            "transfer_to_human" => Ok(Self::TransferToHuman),
            other => Err(ReactivationError::InvalidConfiguration(format!(
                "unknown fallback action: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    /// The step at this list position became due.
    Step { index: usize },
    /// Every step has fired and the contact is still silent.
    Exhausted,
    /// Silence exceeded the tenant's maximum reactivation window.
    MaxWindow,
}

impl ActionOrigin {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Step { .. })
    }
}

impl fmt::Display for ActionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { index } => write!(f, "step {}", index),
            Self::Exhausted => f.write_str("exhausted fallback"),
            Self::MaxWindow => f.write_str("max-window fallback"),
        }
    }
}

/// Status change applied to the conversation after messaging and tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEffect {
    None,
    Close,
    TransferToHuman,
}

/// Cursor state written by a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorTarget {
    /// New `last_executed_step_index`, or `None` to keep the current one.
    pub step_index: Option<usize>,
    /// Whether the cursor becomes `resolved`.
    pub resolve: bool,
}

/// A fully resolved action for one conversation, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub origin: ActionOrigin,
    /// Text to send. `Some("")` asks the channel to generate the content.
    pub message: Option<String>,
    /// Tags unioned into the conversation.
    pub tag_ids: Vec<String>,
    pub effect: ConversationEffect,
}

impl PlannedAction {
    /// Build the action for the step at `index`.
    pub fn from_step(index: usize, step: &ReactivationStep) -> Self {
        let (message, effect) = match step.action_type {
            StepAction::SendMessage => (
                Some(step.action_parameter.clone().unwrap_or_default()),
                ConversationEffect::None,
            ),
            StepAction::CloseConversation => (None, ConversationEffect::Close),
            StepAction::TransferToHuman => (None, ConversationEffect::TransferToHuman),
        };

        Self {
            origin: ActionOrigin::Step { index },
            message,
            tag_ids: step.tag_ids.clone(),
            effect,
        }
    }

    /// Build a fallback action.
    ///
    /// `send_message` always sends (empty text when no message is configured).
    /// Close and transfer send the message only when one is configured.
    /// `do_nothing` never sends.
    pub fn from_fallback(origin: ActionOrigin, action: FallbackAction, message: Option<&str>) -> Self {
        let configured = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let (message, effect) = match action {
            FallbackAction::DoNothing => (None, ConversationEffect::None),
            FallbackAction::SendMessage => {
                (Some(configured.unwrap_or_default()), ConversationEffect::None)
            }
            FallbackAction::CloseConversation => (configured, ConversationEffect::Close),
            FallbackAction::TransferToHuman => (configured, ConversationEffect::TransferToHuman),
        };

        Self {
            origin,
            message,
            tag_ids: Vec::new(),
            effect,
        }
    }

    /// Cursor state this action commits.
    ///
    /// Fallbacks always resolve. Steps resolve only when they end automated
    /// handling (close or transfer).
    pub fn cursor_target(&self) -> CursorTarget {
        match self.origin {
            ActionOrigin::Step { index } => CursorTarget {
                step_index: Some(index),
                resolve: self.effect != ConversationEffect::None,
            },
            ActionOrigin::Exhausted | ActionOrigin::MaxWindow => CursorTarget {
                step_index: None,
                resolve: true,
            },
        }
    }

    /// Whether executing this action touches anything outside the cursor.
    pub fn has_side_effects(&self) -> bool {
        self.message.is_some() || !self.tag_ids.is_empty() || self.effect != ConversationEffect::None
    }

    /// Human-readable description for logs.
    pub fn description(&self) -> String {
        let effect = match self.effect {
            ConversationEffect::None if self.message.is_some() => "send message",
            ConversationEffect::None => "no side effect",
            ConversationEffect::Close => "close conversation",
            ConversationEffect::TransferToHuman => "transfer to human",
        };
        format!("{}: {}", self.origin, effect)
    }
}
