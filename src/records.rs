//! Table rows - conversation objects flattened for storage
//!
//! A conversation maps onto one row in `conversations`, at most one row in
//! each single-object table, and one row per conversation part.

use rusqlite::types::Value;
use serde::Serialize;

use crate::intercom::model::{Conversation, ConversationPart};

/// A row destined for one table of the schema.
///
/// `values()` yields one value per entry of `COLUMNS`, in the same order.
pub trait TableRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<Value>;
}

/// Compact JSON text for a nested object; JSON null stays NULL
fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRow {
    #[serde(rename = "type")]
    pub kind: Option<String>,
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
    pub admin_assignee_id: Option<String>,
    pub team_assignee_id: Option<String>,
}

impl TableRow for ConversationRow {
    const TABLE: &'static str = "conversations";
    const COLUMNS: &'static [&'static str] = &[
        "type", "id", "title", "created_at", "updated_at", "waiting_since", "snoozed_until",
        "open", "state", "read", "priority", "admin_assignee_id", "team_assignee_id",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.kind.clone().into(),
            self.id.clone().into(),
            self.title.clone().into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.waiting_since.into(),
            self.snoozed_until.into(),
            self.open.into(),
            self.state.clone().into(),
            self.read.into(),
            self.priority.clone().into(),
            self.admin_assignee_id.clone().into(),
            self.team_assignee_id.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationPartRow {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: String,
    pub part_type: Option<String>,
    pub body: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub notified_at: Option<i64>,
    pub assigned_to: Option<String>,
    pub author: Option<String>,
    pub attachments: Option<String>,
    pub external_id: Option<String>,
    pub redacted: Option<bool>,
}

impl ConversationPartRow {
    fn from_api(conversation_id: &str, part: &ConversationPart) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            kind: part.kind.clone(),
            id: part.id.clone(),
            part_type: part.part_type.clone(),
            body: part.body.clone(),
            created_at: part.created_at,
            updated_at: part.updated_at,
            notified_at: part.notified_at,
            assigned_to: json_text(part.assigned_to.as_ref()),
            author: json_text(part.author.as_ref()),
            attachments: json_text(part.attachments.as_ref()),
            external_id: part.external_id.clone(),
            redacted: part.redacted,
        }
    }
}

impl TableRow for ConversationPartRow {
    const TABLE: &'static str = "conversation_parts";
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id", "type", "id", "part_type", "body", "created_at", "updated_at",
        "notified_at", "assigned_to", "author", "attachments", "external_id", "redacted",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.kind.clone().into(),
            self.id.clone().into(),
            self.part_type.clone().into(),
            self.body.clone().into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.notified_at.into(),
            self.assigned_to.clone().into(),
            self.author.clone().into(),
            self.attachments.clone().into(),
            self.external_id.clone().into(),
            self.redacted.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSourceRow {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub delivered_as: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub attachments: Option<String>,
    pub url: Option<String>,
    pub redacted: Option<bool>,
}

impl TableRow for ConversationSourceRow {
    const TABLE: &'static str = "conversation_sources";
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id", "type", "id", "delivered_as", "subject", "body", "author",
        "attachments", "url", "redacted",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.kind.clone().into(),
            self.id.clone().into(),
            self.delivered_as.clone().into(),
            self.subject.clone().into(),
            self.body.clone().into(),
            self.author.clone().into(),
            self.attachments.clone().into(),
            self.url.clone().into(),
            self.redacted.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationStatisticsRow {
    pub conversation_id: String,
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
    pub last_closed_by_id: Option<String>,
    pub count_reopens: Option<i64>,
    pub count_assignments: Option<i64>,
    pub count_conversation_parts: Option<i64>,
}

impl TableRow for ConversationStatisticsRow {
    const TABLE: &'static str = "conversation_statistics";
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id",
        "time_to_assignment",
        "time_to_admin_reply",
        "time_to_first_close",
        "time_to_last_close",
        "median_time_to_reply",
        "first_contact_reply_at",
        "first_assignment_at",
        "first_admin_reply_at",
        "first_close_at",
        "last_assignment_at",
        "last_assignment_admin_reply_at",
        "last_contact_reply_at",
        "last_admin_reply_at",
        "last_close_at",
        "last_closed_by_id",
        "count_reopens",
        "count_assignments",
        "count_conversation_parts",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.time_to_assignment.into(),
            self.time_to_admin_reply.into(),
            self.time_to_first_close.into(),
            self.time_to_last_close.into(),
            self.median_time_to_reply.into(),
            self.first_contact_reply_at.into(),
            self.first_assignment_at.into(),
            self.first_admin_reply_at.into(),
            self.first_close_at.into(),
            self.last_assignment_at.into(),
            self.last_assignment_admin_reply_at.into(),
            self.last_contact_reply_at.into(),
            self.last_admin_reply_at.into(),
            self.last_close_at.into(),
            self.last_closed_by_id.clone().into(),
            self.count_reopens.into(),
            self.count_assignments.into(),
            self.count_conversation_parts.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRatingRow {
    pub conversation_id: String,
    pub rating: Option<i64>,
    pub remark: Option<String>,
    pub created_at: Option<i64>,
    pub contact: Option<String>,
    pub teammate: Option<String>,
}

impl TableRow for ConversationRatingRow {
    const TABLE: &'static str = "conversation_ratings";
    const COLUMNS: &'static [&'static str] =
        &["conversation_id", "rating", "remark", "created_at", "contact", "teammate"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.rating.into(),
            self.remark.clone().into(),
            self.created_at.into(),
            self.contact.clone().into(),
            self.teammate.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTagsRow {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tags: Option<String>,
}

impl TableRow for ConversationTagsRow {
    const TABLE: &'static str = "conversation_tags";
    const COLUMNS: &'static [&'static str] = &["conversation_id", "type", "tags"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.kind.clone().into(),
            self.tags.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationContactsRow {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub contacts: Option<String>,
}

impl TableRow for ConversationContactsRow {
    const TABLE: &'static str = "conversation_contacts";
    const COLUMNS: &'static [&'static str] = &["conversation_id", "type", "contacts"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.kind.clone().into(),
            self.contacts.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTeammatesRow {
    pub conversation_id: String,
    pub teammates: Option<String>,
}

impl TableRow for ConversationTeammatesRow {
    const TABLE: &'static str = "conversation_teammates";
    const COLUMNS: &'static [&'static str] = &["conversation_id", "teammates"];

    fn values(&self) -> Vec<Value> {
        vec![self.conversation_id.clone().into(), self.teammates.clone().into()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstContactReplyRow {
    pub conversation_id: String,
    pub created_at: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

impl TableRow for FirstContactReplyRow {
    const TABLE: &'static str = "conversation_first_contact_replies";
    const COLUMNS: &'static [&'static str] = &["conversation_id", "created_at", "type", "url"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.created_at.into(),
            self.kind.clone().into(),
            self.url.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaAppliedRow {
    pub conversation_id: String,
    pub sla_name: Option<String>,
    pub sla_status: Option<String>,
}

impl TableRow for SlaAppliedRow {
    const TABLE: &'static str = "conversation_sla_applied";
    const COLUMNS: &'static [&'static str] = &["conversation_id", "sla_name", "sla_status"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.conversation_id.clone().into(),
            self.sla_name.clone().into(),
            self.sla_status.clone().into(),
        ]
    }
}

/// Every row one conversation contributes to the schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecords {
    pub conversation: ConversationRow,
    pub parts: Vec<ConversationPartRow>,
    pub source: Option<ConversationSourceRow>,
    pub statistics: Option<ConversationStatisticsRow>,
    pub rating: Option<ConversationRatingRow>,
    pub tags: Option<ConversationTagsRow>,
    pub contacts: Option<ConversationContactsRow>,
    pub teammates: Option<ConversationTeammatesRow>,
    pub first_contact_reply: Option<FirstContactReplyRow>,
    pub sla_applied: Option<SlaAppliedRow>,
}

impl ConversationRecords {
    /// Flatten an API conversation.
    ///
    /// `updated_at` is capped at `end_timestamp`: the stored maximum is the
    /// next run's lower bound, and a later value would make that run skip
    /// conversations updated between this run's window end and now.
    pub fn from_api(api: &Conversation, end_timestamp: i64) -> Self {
        let id = api.id.as_str();

        let conversation = ConversationRow {
            kind: api.kind.clone(),
            id: id.to_string(),
            title: api.title.clone(),
            created_at: api.created_at,
            updated_at: api.updated_at.min(end_timestamp),
            waiting_since: api.waiting_since,
            snoozed_until: api.snoozed_until,
            open: api.open,
            state: api.state.clone(),
            read: api.read,
            priority: api.priority.clone(),
            admin_assignee_id: api.admin_assignee_id.clone(),
            team_assignee_id: api.team_assignee_id.clone(),
        };

        let parts = api
            .conversation_parts
            .as_ref()
            .map(|list| {
                list.conversation_parts
                    .iter()
                    .map(|part| ConversationPartRow::from_api(id, part))
                    .collect()
            })
            .unwrap_or_default();

        let source = api.source.as_ref().map(|s| ConversationSourceRow {
            conversation_id: id.to_string(),
            kind: s.kind.clone(),
            id: s.id.clone(),
            delivered_as: s.delivered_as.clone(),
            subject: s.subject.clone(),
            body: s.body.clone(),
            author: json_text(s.author.as_ref()),
            attachments: json_text(s.attachments.as_ref()),
            url: s.url.clone(),
            redacted: s.redacted,
        });

        let statistics = api.statistics.as_ref().map(|s| ConversationStatisticsRow {
            conversation_id: id.to_string(),
            time_to_assignment: s.time_to_assignment,
            time_to_admin_reply: s.time_to_admin_reply,
            time_to_first_close: s.time_to_first_close,
            time_to_last_close: s.time_to_last_close,
            median_time_to_reply: s.median_time_to_reply,
            first_contact_reply_at: s.first_contact_reply_at,
            first_assignment_at: s.first_assignment_at,
            first_admin_reply_at: s.first_admin_reply_at,
            first_close_at: s.first_close_at,
            last_assignment_at: s.last_assignment_at,
            last_assignment_admin_reply_at: s.last_assignment_admin_reply_at,
            last_contact_reply_at: s.last_contact_reply_at,
            last_admin_reply_at: s.last_admin_reply_at,
            last_close_at: s.last_close_at,
            last_closed_by_id: s.last_closed_by_id.clone(),
            count_reopens: s.count_reopens,
            count_assignments: s.count_assignments,
            count_conversation_parts: s.count_conversation_parts,
        });

        let rating = api.conversation_rating.as_ref().map(|r| ConversationRatingRow {
            conversation_id: id.to_string(),
            rating: r.rating,
            remark: r.remark.clone(),
            created_at: r.created_at,
            contact: json_text(r.contact.as_ref()),
            teammate: json_text(r.teammate.as_ref()),
        });

        let tags = api.tags.as_ref().map(|t| ConversationTagsRow {
            conversation_id: id.to_string(),
            kind: t.kind.clone(),
            tags: json_text(Some(&t.tags)),
        });

        let contacts = api.contacts.as_ref().map(|c| ConversationContactsRow {
            conversation_id: id.to_string(),
            kind: c.kind.clone(),
            contacts: json_text(Some(&c.contacts)),
        });

        let teammates = api.teammates.as_ref().map(|t| ConversationTeammatesRow {
            conversation_id: id.to_string(),
            teammates: json_text(Some(t)),
        });

        let first_contact_reply = api.first_contact_reply.as_ref().map(|f| FirstContactReplyRow {
            conversation_id: id.to_string(),
            created_at: f.created_at,
            kind: f.kind.clone(),
            url: f.url.clone(),
        });

        let sla_applied = api.sla_applied.as_ref().map(|s| SlaAppliedRow {
            conversation_id: id.to_string(),
            sla_name: s.sla_name.clone(),
            sla_status: s.sla_status.clone(),
        });

        Self {
            conversation,
            parts,
            source,
            statistics,
            rating,
            tags,
            contacts,
            teammates,
            first_contact_reply,
            sla_applied,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A conversation as the API returns it, with every nested object set
    pub(crate) fn sample_conversation_json(id: &str, updated_at: i64) -> serde_json::Value {
        json!({
            "type": "conversation",
            "id": id,
            "title": "Billing question",
            "created_at": 1_700_000_000,
            "updated_at": updated_at,
            "waiting_since": null,
            "snoozed_until": null,
            "open": true,
            "state": "open",
            "read": false,
            "priority": "not_priority",
            "admin_assignee_id": 814860,
            "team_assignee_id": null,
            "tags": {"type": "tag.list", "tags": [{"type": "tag", "id": "1", "name": "billing"}]},
            "conversation_rating": {
                "rating": 5,
                "remark": "Great",
                "created_at": 1_700_000_500,
                "contact": {"type": "contact", "id": "c1"},
                "teammate": {"type": "admin", "id": "814860"}
            },
            "source": {
                "type": "conversation",
                "id": "403918330",
                "delivered_as": "customer_initiated",
                "subject": "",
                "body": "<p>Hi, my invoice is wrong</p>",
                "author": {"type": "user", "id": "c1", "name": "Ada"},
                "attachments": [],
                "url": null,
                "redacted": false
            },
            "contacts": {"type": "contact.list", "contacts": [{"type": "contact", "id": "c1"}]},
            "teammates": {"type": "admin.list", "teammates": [{"type": "admin", "id": "814860"}]},
            "first_contact_reply": {"created_at": 1_700_000_000, "type": "conversation", "url": null},
            "sla_applied": {"type": "conversation_sla_summary", "sla_name": "Standard", "sla_status": "hit"},
            "statistics": {
                "type": "conversation_statistics",
                "time_to_assignment": 0,
                "time_to_admin_reply": 120,
                "time_to_first_close": null,
                "time_to_last_close": null,
                "median_time_to_reply": 120,
                "first_contact_reply_at": 1_700_000_000,
                "first_assignment_at": 1_700_000_000,
                "first_admin_reply_at": 1_700_000_120,
                "first_close_at": null,
                "last_assignment_at": 1_700_000_000,
                "last_assignment_admin_reply_at": 1_700_000_120,
                "last_contact_reply_at": 1_700_000_000,
                "last_admin_reply_at": 1_700_000_120,
                "last_close_at": null,
                "last_closed_by_id": null,
                "count_reopens": 0,
                "count_assignments": 1,
                "count_conversation_parts": 2
            },
            "conversation_parts": {
                "type": "conversation_part.list",
                "conversation_parts": [
                    {
                        "type": "conversation_part",
                        "id": "p1",
                        "part_type": "assignment",
                        "body": null,
                        "created_at": 1_700_000_000,
                        "updated_at": 1_700_000_000,
                        "notified_at": 1_700_000_000,
                        "assigned_to": {"type": "admin", "id": "814860"},
                        "author": {"type": "bot", "id": "b1"},
                        "attachments": [],
                        "external_id": null,
                        "redacted": false
                    },
                    {
                        "type": "conversation_part",
                        "id": "p2",
                        "part_type": "comment",
                        "body": "<p>Looking into it</p>",
                        "created_at": 1_700_000_120,
                        "updated_at": 1_700_000_120,
                        "notified_at": 1_700_000_120,
                        "assigned_to": null,
                        "author": {"type": "admin", "id": "814860"},
                        "attachments": [],
                        "external_id": null,
                        "redacted": false
                    }
                ],
                "total_count": 2
            }
        })
    }

    fn parse(value: serde_json::Value) -> Conversation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_conversation_flattens_every_table() {
        let api = parse(sample_conversation_json("101", 1_700_000_200));
        let records = ConversationRecords::from_api(&api, 1_700_000_300);

        assert_eq!(records.conversation_id(), "101");
        assert_eq!(records.conversation.updated_at, 1_700_000_200);
        assert_eq!(records.conversation.admin_assignee_id.as_deref(), Some("814860"));
        assert_eq!(records.parts.len(), 2);
        assert_eq!(records.parts[1].part_type.as_deref(), Some("comment"));
        assert!(records.parts.iter().all(|p| p.conversation_id == "101"));

        let source = records.source.as_ref().unwrap();
        assert_eq!(source.delivered_as.as_deref(), Some("customer_initiated"));
        assert_eq!(source.attachments.as_deref(), Some("[]"));
        assert_eq!(source.url, None);

        assert_eq!(records.rating.as_ref().unwrap().rating, Some(5));
        assert_eq!(records.statistics.as_ref().unwrap().count_conversation_parts, Some(2));
        assert_eq!(records.sla_applied.as_ref().unwrap().sla_status.as_deref(), Some("hit"));
        assert!(records.tags.as_ref().unwrap().tags.as_deref().unwrap().contains("billing"));
        assert!(records.contacts.is_some());
        assert!(records.teammates.is_some());
        assert!(records.first_contact_reply.is_some());
    }

    #[test]
    fn test_updated_at_capped_at_window_end() {
        let api = parse(sample_conversation_json("101", 1_700_000_900));
        let records = ConversationRecords::from_api(&api, 1_700_000_300);
        assert_eq!(records.conversation.updated_at, 1_700_000_300);
    }

    #[test]
    fn test_absent_objects_produce_no_rows() {
        let api = parse(json!({
            "type": "conversation",
            "id": "7",
            "updated_at": 10,
            "tags": null,
            "conversation_rating": null,
            "source": null,
            "statistics": null,
            "conversation_parts": null,
        }));
        let records = ConversationRecords::from_api(&api, 100);

        assert!(records.parts.is_empty());
        assert!(records.source.is_none());
        assert!(records.statistics.is_none());
        assert!(records.rating.is_none());
        assert!(records.tags.is_none());
        assert!(records.contacts.is_none());
        assert!(records.teammates.is_none());
        assert!(records.first_contact_reply.is_none());
        assert!(records.sla_applied.is_none());
    }

    #[test]
    fn test_values_match_columns() {
        let api = parse(sample_conversation_json("101", 5));
        let records = ConversationRecords::from_api(&api, 10);

        assert_eq!(records.conversation.values().len(), ConversationRow::COLUMNS.len());
        assert_eq!(records.parts[0].values().len(), ConversationPartRow::COLUMNS.len());
        assert_eq!(
            records.statistics.unwrap().values().len(),
            ConversationStatisticsRow::COLUMNS.len()
        );
        assert_eq!(records.source.unwrap().values().len(), ConversationSourceRow::COLUMNS.len());
    }
}
