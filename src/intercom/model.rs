//! Intercom API object model
//!
//! Only the fields the sync stores are modelled. Nested objects that are
//! stored as JSON text stay `serde_json::Value`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Source type of conversations started by a user message.
/// Search results with any other source type are not synced.
pub const CONVERSATION_SOURCE_TYPE: &str = "conversation";

/// A conversation as returned by `GET /conversations/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: i64,
    pub waiting_since: Option<i64>,
    pub snoozed_until: Option<i64>,
    pub open: Option<bool>,
    pub state: Option<String>,
    pub read: Option<bool>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub admin_assignee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub team_assignee_id: Option<String>,
    pub tags: Option<TagList>,
    pub conversation_rating: Option<ConversationRating>,
    pub source: Option<Source>,
    pub contacts: Option<ContactList>,
    pub teammates: Option<Value>,
    pub first_contact_reply: Option<FirstContactReply>,
    pub sla_applied: Option<SlaApplied>,
    pub statistics: Option<Statistics>,
    pub conversation_parts: Option<ConversationPartList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagList {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactList {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub contacts: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRating {
    pub rating: Option<i64>,
    pub remark: Option<String>,
    pub created_at: Option<i64>,
    pub contact: Option<Value>,
    pub teammate: Option<Value>,
}

/// The message that opened the conversation
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    pub delivered_as: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub author: Option<Value>,
    pub attachments: Option<Value>,
    pub url: Option<String>,
    pub redacted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirstContactReply {
    pub created_at: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlaApplied {
    pub sla_name: Option<String>,
    pub sla_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Statistics {
    pub time_to_assignment: Option<i64>,
    pub time_to_admin_reply: Option<i64>,
    pub time_to_first_close: Option<i64>,
    pub time_to_last_close: Option<i64>,
    pub median_time_to_reply: Option<i64>,
    pub first_contact_reply_at: Option<i64>,
    pub first_assignment_at: Option<i64>,
    pub first_admin_reply_at: Option<i64>,
    pub first_close_at: Option<i64>,
    pub last_assignment_at: Option<i64>,
    pub last_assignment_admin_reply_at: Option<i64>,
    pub last_contact_reply_at: Option<i64>,
    pub last_admin_reply_at: Option<i64>,
    pub last_close_at: Option<i64>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub last_closed_by_id: Option<String>,
    pub count_reopens: Option<i64>,
    pub count_assignments: Option<i64>,
    pub count_conversation_parts: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPartList {
    #[serde(default)]
    pub conversation_parts: Vec<ConversationPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPart {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub part_type: Option<String>,
    pub body: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub notified_at: Option<i64>,
    pub assigned_to: Option<Value>,
    pub author: Option<Value>,
    pub attachments: Option<Value>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub external_id: Option<String>,
    pub redacted: Option<bool>,
}

// ========== Search ==========

/// Response of `POST /conversations/search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    pub pages: Option<Pages>,
}

impl SearchResponse {
    pub fn total_pages(&self) -> u32 {
        self.pages.as_ref().map(|p| p.total_pages).unwrap_or(0)
    }

    /// Results whose source is a user-started conversation
    pub fn synced_conversations(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.conversations.iter().filter(|c| c.is_user_conversation())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pages {
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub updated_at: i64,
    pub source: Option<SourceSummary>,
}

impl ConversationSummary {
    pub fn is_user_conversation(&self) -> bool {
        self.source
            .as_ref()
            .and_then(|s| s.kind.as_deref())
            .is_some_and(|kind| kind == CONVERSATION_SOURCE_TYPE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSummary {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Body of a search request
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub page: u32,
}

/// Intercom search filter: a single field comparison or a boolean
/// combination of nested filters
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchQuery {
    Field {
        field: &'static str,
        operator: &'static str,
        value: i64,
    },
    Compound {
        operator: &'static str,
        value: Vec<SearchQuery>,
    },
}

impl SearchQuery {
    fn updated_at(operator: &'static str, value: i64) -> Self {
        SearchQuery::Field { field: "updated_at", operator, value }
    }
}

impl SearchRequest {
    /// Conversations with `updated_at > start`, first page only
    pub fn updated_after(start: i64) -> Self {
        Self {
            query: SearchQuery::updated_at(">", start),
            pagination: None,
        }
    }

    /// One page of conversations with `start < updated_at <= end`
    pub fn updated_between(start: i64, end: i64, page: u32) -> Self {
        Self {
            query: SearchQuery::Compound {
                operator: "AND",
                value: vec![
                    SearchQuery::updated_at(">", start),
                    SearchQuery::Compound {
                        operator: "OR",
                        value: vec![
                            SearchQuery::updated_at("=", end),
                            SearchQuery::updated_at("<", end),
                        ],
                    },
                ],
            },
            pagination: Some(Pagination { page }),
        }
    }
}

// Intercom sends some ids as strings and others as numbers.

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(value).ok_or_else(|| serde::de::Error::custom("id must not be null"))
}

fn opt_id_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_id))
}
