//! # intercom-etl - Intercom conversation sync
//!
//! Incrementally copies Intercom conversations into a relational schema.
//!
//! intercom-etl provides:
//! - A SQLite schema for conversations and their parts, sources,
//!   statistics, ratings and other nested objects
//! - An Intercom API client with retry and back-off
//! - Flattening of conversation objects into table rows
//! - A step-based pipeline engine and the conversation sync pipeline

pub mod storage;
pub mod records;
pub mod intercom;
pub mod pipeline;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use storage::SqliteStore;
pub use records::{ConversationRecords, TableRow};
pub use intercom::{IntercomClient, RetryPolicy};
pub use pipeline::{Flow, Pipeline, RunSummary};
pub use pipeline::conversation::{conversation_pipeline, ConversationSync};

/// Result type alias for intercom-etl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for intercom-etl operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Intercom API returned {status} for {url}")]
    Api { status: u16, url: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table {0} has no primary key")]
    MissingPrimaryKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline step {step} ran without {input}")]
    MissingStepInput {
        step: &'static str,
        input: &'static str,
    },
}

impl Error {
    /// Whether a failed API request is worth repeating.
    ///
    /// Transport failures and error statuses are; a body that does not
    /// decode will not decode any better on the next attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => !e.is_decode(),
            Error::Api { .. } => true,
            _ => false,
        }
    }
}
