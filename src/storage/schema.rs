//! Database schema definitions
//!
//! Timestamps are Intercom unix seconds. Nested API objects (authors,
//! attachments, tag and contact lists) are kept as JSON text.

/// SQL to create the conversations table
pub const CREATE_CONVERSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    type TEXT,
    id TEXT NOT NULL,
    title TEXT,
    created_at INTEGER,
    updated_at INTEGER,
    waiting_since INTEGER,
    snoozed_until INTEGER,
    open BOOLEAN,
    state TEXT,
    read BOOLEAN,
    priority TEXT,
    admin_assignee_id TEXT,
    team_assignee_id TEXT,
    PRIMARY KEY (id)
)
"#;

/// SQL to create the conversation_parts table
/// Parts are keyed per conversation; the API only ever returns a recent
/// window of them, so rows accumulate across syncs
pub const CREATE_CONVERSATION_PARTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_parts (
    conversation_id TEXT NOT NULL,
    type TEXT,
    id TEXT NOT NULL,
    part_type TEXT,
    body TEXT,
    created_at INTEGER,
    updated_at INTEGER,
    notified_at INTEGER,
    assigned_to TEXT,
    author TEXT,
    attachments TEXT,
    external_id TEXT,
    redacted BOOLEAN,
    PRIMARY KEY (conversation_id, id)
)
"#;

/// SQL to create the conversation_sources table
pub const CREATE_CONVERSATION_SOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_sources (
    conversation_id TEXT NOT NULL,
    type TEXT,
    id TEXT,
    delivered_as TEXT,
    subject TEXT,
    body TEXT,
    author TEXT,
    attachments TEXT,
    url TEXT,
    redacted BOOLEAN,
    PRIMARY KEY (conversation_id)
)
"#;

/// SQL to create the conversation_statistics table
pub const CREATE_CONVERSATION_STATISTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_statistics (
    conversation_id TEXT NOT NULL,
    time_to_assignment INTEGER,
    time_to_admin_reply INTEGER,
    time_to_first_close INTEGER,
    time_to_last_close INTEGER,
    median_time_to_reply INTEGER,
    first_contact_reply_at INTEGER,
    first_assignment_at INTEGER,
    first_admin_reply_at INTEGER,
    first_close_at INTEGER,
    last_assignment_at INTEGER,
    last_assignment_admin_reply_at INTEGER,
    last_contact_reply_at INTEGER,
    last_admin_reply_at INTEGER,
    last_close_at INTEGER,
    last_closed_by_id TEXT,
    count_reopens INTEGER,
    count_assignments INTEGER,
    count_conversation_parts INTEGER,
    PRIMARY KEY (conversation_id)
)
"#;

/// SQL to create the conversation_ratings table
pub const CREATE_CONVERSATION_RATINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_ratings (
    conversation_id TEXT NOT NULL,
    rating INTEGER,
    remark TEXT,
    created_at INTEGER,
    contact TEXT,
    teammate TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

pub const CREATE_CONVERSATION_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_tags (
    conversation_id TEXT NOT NULL,
    type TEXT,
    tags TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

pub const CREATE_CONVERSATION_CONTACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_contacts (
    conversation_id TEXT NOT NULL,
    type TEXT,
    contacts TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

pub const CREATE_CONVERSATION_TEAMMATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_teammates (
    conversation_id TEXT NOT NULL,
    teammates TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

pub const CREATE_CONVERSATION_FIRST_CONTACT_REPLIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_first_contact_replies (
    conversation_id TEXT NOT NULL,
    created_at INTEGER,
    type TEXT,
    url TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

pub const CREATE_CONVERSATION_SLA_APPLIED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_sla_applied (
    conversation_id TEXT NOT NULL,
    sla_name TEXT,
    sla_status TEXT,
    PRIMARY KEY (conversation_id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at)",
];

/// Every table the schema defines, conversations first
pub const TABLES: &[&str] = &[
    "conversations",
    "conversation_parts",
    "conversation_sources",
    "conversation_statistics",
    "conversation_ratings",
    "conversation_tags",
    "conversation_contacts",
    "conversation_teammates",
    "conversation_first_contact_replies",
    "conversation_sla_applied",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_CONVERSATIONS_TABLE,
        CREATE_CONVERSATION_PARTS_TABLE,
        CREATE_CONVERSATION_SOURCES_TABLE,
        CREATE_CONVERSATION_STATISTICS_TABLE,
        CREATE_CONVERSATION_RATINGS_TABLE,
        CREATE_CONVERSATION_TAGS_TABLE,
        CREATE_CONVERSATION_CONTACTS_TABLE,
        CREATE_CONVERSATION_TEAMMATES_TABLE,
        CREATE_CONVERSATION_FIRST_CONTACT_REPLIES_TABLE,
        CREATE_CONVERSATION_SLA_APPLIED_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Column that ties a table's rows to a conversation
pub fn conversation_key(table: &str) -> &'static str {
    if table == "conversations" { "id" } else { "conversation_id" }
}
