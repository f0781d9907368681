//! Intercom API - conversation search and retrieval

pub mod client;
pub mod model;

pub use client::{IntercomClient, RetryPolicy, DEFAULT_BASE_URL};
pub use model::{Conversation, ConversationPart, SearchRequest, SearchResponse};
