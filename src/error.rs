//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the crate.
//! Subsystems use specific error types via `thiserror`
//! ([`ListenBrainzError`](crate::listenbrainz::ListenBrainzError),
//! [`ConfigError`](crate::config::ConfigError)), while the CLI uses
//! `anyhow` for convenient error propagation.
//!
//! # Example
//!
//! ```ignore
//! use playsync::error::{Result, ResultExt};
//!
//! async fn load(db: &Db, user: UserId) -> Result<Option<User>> {
//!     let mut session = db.read().await?;
//!     session.find_user(user).await.with_context("loading user")
//! }
//! ```

use crate::model::SyncState;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Remote ListenBrainz error
    #[error("ListenBrainz error: {0}")]
    ListenBrainz(#[from] crate::listenbrainz::ListenBrainzError),

    /// A sync state change that the state machine forbids
    #[error("Illegal sync state transition: {from} -> {to}")]
    IllegalTransition { from: SyncState, to: SyncState },

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored or received value that cannot be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
