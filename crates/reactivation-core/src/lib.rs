//! Core types and decision logic for conversation reactivation.
//!
//! When a contact stops responding, a tenant's reactivation sequence decides
//! whether and when to follow up, hand the conversation to a human, or close
//! it. This crate holds everything that decision needs and nothing that
//! performs it:
//!
//! - [`Silence`] - elapsed silence since the cursor's anchor
//! - [`WindowGate`] - time-of-day windows, including ones that wrap midnight
//! - [`StepSequencer`] - picks the single next step, strictly in list order
//! - [`FallbackResolver`] - max-window and exhausted fallbacks, then the sequencer
//! - [`ConfigurationStore`], [`CursorStore`], [`ConversationStore`],
//!   [`CandidateSource`], [`MessageChannel`] - the collaborators the engine drives
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use reactivation_core::{
//!     Decision, FallbackResolver, ReactivationCursor, ReactivationSettings,
//!     ReactivationStep, StepAction,
//! };
//!
//! let steps = vec![
//!     ReactivationStep::new("nudge", 30, StepAction::SendMessage).with_parameter("Still there?"),
//!     ReactivationStep::new("close", 60, StepAction::CloseConversation),
//! ];
//! let settings = ReactivationSettings::new("tenant-1");
//!
//! let now = Utc::now();
//! let cursor = ReactivationCursor::fresh("conv-1", "tenant-1", now - Duration::minutes(30));
//!
//! match FallbackResolver::new(&settings, &steps).decide(&cursor, now) {
//!     Decision::Execute(action) => assert_eq!(action.message.as_deref(), Some("Still there?")),
//!     Decision::Wait(reason) => panic!("unexpected wait: {:?}", reason),
//! }
//! ```

mod action;
mod channel;
mod cursor;
mod error;
mod fallback;
mod sequencer;
mod settings;
mod silence;
mod step;
mod store;
mod window;

pub use action::{
    ActionOrigin, ConversationEffect, CursorTarget, FallbackAction, PlannedAction, StepAction,
};
pub use channel::MessageChannel;
pub use cursor::{CursorStatus, ReactivationCursor, NO_STEP_EXECUTED};
pub use error::{ReactivationError, Result};
pub use fallback::{Decision, FallbackResolver, WaitReason};
pub use sequencer::{due_at_minutes, StepDecision, StepSequencer};
pub use settings::{ReactivationSettings, MAX_UTC_OFFSET_MINUTES};
pub use silence::Silence;
pub use step::{validate_steps, ReactivationStep, MAX_WAIT_MINUTES, MIN_WAIT_MINUTES};
pub use store::{
    CandidateConversation, CandidateSource, ClaimOutcome, ConfigurationStore,
    ConversationStatus, ConversationStore, CursorStore, TenantConfiguration,
};
pub use window::{format_hhmm, minute_of_day, parse_hhmm, TimeWindow, WindowGate, MINUTES_PER_DAY};

// Re-export async_trait for implementors
pub use async_trait::async_trait;
