//! Storage Layer - SQLite-backed persistence
//!
//! One row per conversation in `conversations`, plus:
//! - conversation_parts(conversation_id, id, ...) - messages, notes and events
//! - conversation_sources, conversation_statistics, conversation_ratings
//! - conversation_tags, conversation_contacts, conversation_teammates,
//!   conversation_first_contact_replies, conversation_sla_applied

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, DbStats, TableCount};
