//! SQLite persistence layer for conversation reactivation.
//!
//! This crate provides async database operations for conversations, tenant
//! reactivation configuration, reactivation cursors and the human hand-over
//! queue using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{conversation, models::Conversation, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:reactivation.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Create a conversation
//!     let conv = Conversation {
//!         id: "conv-1".to_string(),
//!         tenant_id: "acme".to_string(),
//!         status: "open".to_string(),
//!         automation_enabled: true,
//!         last_inbound_at_ms: Some(1_767_225_600_000),
//!         created_at_ms: 1_767_225_600_000,
//!         updated_at_ms: 1_767_225_600_000,
//!     };
//!     conversation::create_conversation(db.pool(), &conv).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod conversation;
pub mod cursor;
pub mod error;
pub mod human_queue;
pub mod models;
pub mod settings;
pub mod step;
pub mod validation;

pub use error::{DatabaseError, Result};
pub use models::{
    Candidate, Conversation, CursorRecord, HumanQueueEntry, SettingsRecord, StepRecord,
};
pub use validation::ValidationError;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    /// Set high enough for a full worker pool of concurrent evaluations.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// // File database
    /// let db = database::Database::connect("sqlite:data/reactivation.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing, keep a single connection)
    /// let db = database::Database::connect_with_pool_size("sqlite::memory:", 1).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
