//! Drives conversation reactivation: finds silent conversations, decides the
//! next follow-up and executes it at most once.
//!
//! - [`ReactivationEngine`] - facade fed with inbound messages and closures
//! - [`ReactivationScheduler`] - periodic sweep on a bounded worker pool
//! - [`ConversationEvaluator`] - one conversation, one tick
//! - [`ActionExecutor`] - claim-then-commit around the side effects
//! - [`SqliteStore`] and [`InMemoryStore`] - store implementations

mod cache;
mod channel;
mod config;
mod engine;
mod evaluator;
mod executor;
mod memory;
mod scheduler;
mod shard;
mod sqlite;

pub use cache::CachedConfigurationStore;
pub use channel::{LoggingChannel, NoOpChannel, RecordingChannel, SentMessage};
pub use config::{ConfigError, EngineConfig};
pub use engine::ReactivationEngine;
pub use evaluator::{ConversationEvaluator, EvaluationOutcome, SkipReason};
pub use executor::{ActionExecutor, Execution, ExecutionOutcome};
pub use memory::{InMemoryStore, MemoryConversation};
pub use scheduler::{ReactivationScheduler, SweepReport};
pub use shard::{Shard, ShardError};
pub use sqlite::SqliteStore;
