//! SQLite storage implementation

use std::path::Path;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use crate::{Error, Result};
use crate::records::{ConversationPartRow, ConversationRecords, ConversationRow, TableRow};
use super::schema;

/// SQLite-backed storage for synced conversations
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Drop every table in the database and recreate the schema
    pub fn reset_schema(&self) -> Result<()> {
        let tables: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };

        for table in &tables {
            tracing::info!("Dropping table {}", table);
            self.conn.execute(&format!("DROP TABLE IF EXISTS \"{}\"", table), [])?;
        }

        tracing::info!("Creating {} table(s)", schema::TABLES.len());
        self.initialize_schema()
    }

    // ========== Transactions ==========

    /// Begin a transaction; everything until commit/rollback is one unit
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    // ========== Generic Row Operations ==========

    /// Names of a table's primary-key columns, in key order.
    /// Empty when the table has no primary key.
    pub fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
        let columns = stmt
            .query_map([table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(columns)
    }

    /// Insert rows into their table.
    ///
    /// A row whose primary key already exists fails with the database's
    /// constraint error.
    pub fn load_rows<R: TableRow>(&self, rows: &[R]) -> Result<usize> {
        if rows.is_empty() {
            tracing::debug!("No rows to load into {}, skipping", R::TABLE);
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len()),
        );
        tracing::debug!("Loading {} row(s) into {}", rows.len(), R::TABLE);

        let mut stmt = self.conn.prepare_cached(&sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.values()))?;
        }
        Ok(rows.len())
    }

    /// Insert rows, updating the existing row in place when the primary key
    /// is already present.
    pub fn merge_rows<R: TableRow>(&self, rows: &[R]) -> Result<usize> {
        if rows.is_empty() {
            tracing::debug!("No rows to merge into {}, skipping", R::TABLE);
            return Ok(0);
        }

        let pk_columns = self.primary_key_columns(R::TABLE)?;
        if pk_columns.is_empty() {
            return Err(Error::MissingPrimaryKey(R::TABLE.to_string()));
        }

        let updates: Vec<String> = R::COLUMNS
            .iter()
            .filter(|col| !pk_columns.iter().any(|pk| pk == *col))
            .map(|col| format!("{col} = excluded.{col}"))
            .collect();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len()),
            pk_columns.join(", "),
            on_conflict,
        );
        tracing::debug!("{}", sql);

        let mut stmt = self.conn.prepare_cached(&sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.values()))?;
        }
        Ok(rows.len())
    }

    /// Delete a conversation's rows from one table
    pub fn delete_conversation_rows(&self, table: &str, conversation_id: &str) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", table, schema::conversation_key(table));
        let deleted = self.conn.execute(&sql, [conversation_id])?;
        Ok(deleted)
    }

    // ========== Conversation Operations ==========

    /// Store everything a conversation maps to.
    ///
    /// Single-object tables are rewritten from scratch so that objects the
    /// API no longer reports disappear. Parts are merged: the API only
    /// returns the latest segment of a conversation, so older parts stay.
    pub fn replace_conversation(&self, records: &ConversationRecords) -> Result<()> {
        let id = records.conversation_id();

        self.replace_rows(id, Some(&records.conversation))?;
        self.replace_rows(id, records.contacts.as_ref())?;
        self.replace_rows(id, records.first_contact_reply.as_ref())?;
        self.replace_rows(id, records.rating.as_ref())?;
        self.replace_rows(id, records.sla_applied.as_ref())?;
        self.replace_rows(id, records.source.as_ref())?;
        self.replace_rows(id, records.statistics.as_ref())?;
        self.replace_rows(id, records.tags.as_ref())?;
        self.replace_rows(id, records.teammates.as_ref())?;

        self.merge_rows(&records.parts)?;
        Ok(())
    }

    fn replace_rows<R: TableRow>(&self, conversation_id: &str, row: Option<&R>) -> Result<()> {
        self.delete_conversation_rows(R::TABLE, conversation_id)?;
        self.load_rows(row.map(std::slice::from_ref).unwrap_or(&[]))?;
        Ok(())
    }

    /// Largest stored `updated_at`, 0 for an empty database.
    ///
    /// Conversations updated strictly after this are due for the next sync.
    pub fn max_conversation_updated_at(&self) -> Result<i64> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(updated_at), 0) FROM conversations",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Get a conversation by id
    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM conversations WHERE id = ?1", ConversationRow::COLUMNS.join(", ")),
                [id],
                |row| self.row_to_conversation(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Stored parts of a conversation, oldest first
    pub fn conversation_parts(&self, conversation_id: &str) -> Result<Vec<ConversationPartRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conversation_parts WHERE conversation_id = ?1 ORDER BY created_at, id",
            ConversationPartRow::COLUMNS.join(", ")
        ))?;

        let parts = stmt
            .query_map(params![conversation_id], |row| self.row_to_part(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(parts)
    }

    /// Helper to convert a row to a ConversationRow
    fn row_to_conversation(&self, row: &rusqlite::Row) -> rusqlite::Result<ConversationRow> {
        Ok(ConversationRow {
            kind: row.get(0)?,
            id: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            waiting_since: row.get(5)?,
            snoozed_until: row.get(6)?,
            open: row.get(7)?,
            state: row.get(8)?,
            read: row.get(9)?,
            priority: row.get(10)?,
            admin_assignee_id: row.get(11)?,
            team_assignee_id: row.get(12)?,
        })
    }

    /// Helper to convert a row to a ConversationPartRow
    fn row_to_part(&self, row: &rusqlite::Row) -> rusqlite::Result<ConversationPartRow> {
        Ok(ConversationPartRow {
            conversation_id: row.get(0)?,
            kind: row.get(1)?,
            id: row.get(2)?,
            part_type: row.get(3)?,
            body: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            notified_at: row.get(7)?,
            assigned_to: row.get(8)?,
            author: row.get(9)?,
            attachments: row.get(10)?,
            external_id: row.get(11)?,
            redacted: row.get(12)?,
        })
    }

    // ========== Statistics ==========

    /// Count rows in one table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let tables = schema::TABLES
            .iter()
            .map(|table| {
                Ok(TableCount {
                    table: table.to_string(),
                    rows: self.count_rows(table)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DbStats {
            tables,
            watermark: self.max_conversation_updated_at()?,
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub tables: Vec<TableCount>,
    /// Largest stored conversation `updated_at`
    pub watermark: i64,
}

#[cfg(test)]
impl DbStats {
    pub fn rows_in(&self, table: &str) -> usize {
        self.tables.iter().find(|t| t.table == table).map(|t| t.rows).unwrap_or(0)
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for count in &self.tables {
            writeln!(f, "  {}: {}", count.table, count.rows)?;
        }
        write!(f, "  Watermark: {}", self.watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercom::model::Conversation;
    use crate::records::tests::sample_conversation_json;
    use rusqlite::types::Value;

    fn sample_records(id: &str, updated_at: i64) -> ConversationRecords {
        let api: Conversation = serde_json::from_value(sample_conversation_json(id, updated_at)).unwrap();
        ConversationRecords::from_api(&api, i64::MAX)
    }

    fn is_constraint_violation(err: &Error) -> bool {
        matches!(
            err,
            Error::Storage(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    #[test]
    fn test_schema_creates_all_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        for table in schema::TABLES {
            assert_eq!(store.count_rows(table).unwrap(), 0);
        }
    }

    #[test]
    fn test_primary_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.primary_key_columns("conversations").unwrap(), vec!["id"]);
        assert_eq!(
            store.primary_key_columns("conversation_parts").unwrap(),
            vec!["conversation_id", "id"]
        );
        for table in &schema::TABLES[2..] {
            assert_eq!(store.primary_key_columns(table).unwrap(), vec!["conversation_id"], "{}", table);
        }
    }

    #[test]
    fn test_every_table_rejects_duplicate_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        for table in schema::TABLES {
            let pk = store.primary_key_columns(table).unwrap();
            let sql = format!("INSERT INTO {} ({}) VALUES ({})", table, pk.join(", "), placeholders(pk.len()));
            let key: Vec<String> = pk.iter().map(|c| format!("{}-1", c)).collect();

            store.conn.execute(&sql, params_from_iter(&key)).unwrap();
            let other: Vec<String> = pk.iter().map(|c| format!("{}-2", c)).collect();
            store.conn.execute(&sql, params_from_iter(&other)).unwrap();

            let err: Error = store.conn.execute(&sql, params_from_iter(&key)).unwrap_err().into();
            assert!(is_constraint_violation(&err), "{} accepted a duplicate key", table);
            assert_eq!(store.count_rows(table).unwrap(), 2);
        }
    }

    #[test]
    fn test_load_rows_rejects_duplicate_conversation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = sample_records("1", 100);

        store.load_rows(std::slice::from_ref(&records.conversation)).unwrap();
        let err = store.load_rows(std::slice::from_ref(&records.conversation)).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_load_empty_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let none: Vec<ConversationRow> = Vec::new();
        assert_eq!(store.load_rows(&none).unwrap(), 0);
        assert_eq!(store.merge_rows(&none).unwrap(), 0);
    }

    #[test]
    fn test_merge_updates_on_key_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut records = sample_records("1", 100);
        store.merge_rows(&records.parts).unwrap();

        records.parts[1].body = Some("<p>Edited</p>".to_string());
        store.merge_rows(&records.parts).unwrap();

        let parts = store.conversation_parts("1").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].body.as_deref(), Some("<p>Edited</p>"));
    }

    #[test]
    fn test_merge_requires_primary_key() {
        struct Unkeyed(String);

        impl TableRow for Unkeyed {
            const TABLE: &'static str = "unkeyed";
            const COLUMNS: &'static [&'static str] = &["name"];

            fn values(&self) -> Vec<Value> {
                vec![self.0.clone().into()]
            }
        }

        let store = SqliteStore::open_in_memory().unwrap();
        store.conn.execute("CREATE TABLE unkeyed (name TEXT)", []).unwrap();

        let err = store.merge_rows(&[Unkeyed("a".to_string())]).unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey(t) if t == "unkeyed"));
        assert_eq!(store.load_rows(&[Unkeyed("a".to_string())]).unwrap(), 1);
    }

    #[test]
    fn test_replace_conversation_rewrites_single_rows_and_keeps_parts() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_conversation(&sample_records("1", 100)).unwrap();

        let mut next = sample_records("1", 200);
        next.rating = None;
        next.conversation.state = Some("closed".to_string());
        next.parts.remove(0);
        store.replace_conversation(&next).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.rows_in("conversations"), 1);
        assert_eq!(stats.rows_in("conversation_ratings"), 0);
        assert_eq!(stats.rows_in("conversation_sources"), 1);
        assert_eq!(stats.rows_in("conversation_statistics"), 1);
        assert_eq!(stats.rows_in("conversation_parts"), 2);

        let stored = store.get_conversation("1").unwrap().unwrap();
        assert_eq!(stored.state.as_deref(), Some("closed"));
        assert_eq!(stored.updated_at, 200);
        assert_eq!(stored.open, Some(true));
    }

    #[test]
    fn test_replace_leaves_other_conversations_alone() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_conversation(&sample_records("1", 100)).unwrap();
        store.replace_conversation(&sample_records("2", 150)).unwrap();
        store.replace_conversation(&sample_records("1", 120)).unwrap();

        assert_eq!(store.count_rows("conversations").unwrap(), 2);
        assert_eq!(store.count_rows("conversation_sources").unwrap(), 2);
        assert_eq!(store.conversation_parts("2").unwrap().len(), 2);
    }

    #[test]
    fn test_watermark() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.max_conversation_updated_at().unwrap(), 0);

        store.replace_conversation(&sample_records("1", 100)).unwrap();
        store.replace_conversation(&sample_records("2", 300)).unwrap();
        assert_eq!(store.max_conversation_updated_at().unwrap(), 300);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.begin_transaction().unwrap();
        assert!(store.in_transaction());
        store.replace_conversation(&sample_records("1", 100)).unwrap();
        store.rollback().unwrap();

        assert!(!store.in_transaction());
        assert!(store.get_conversation("1").unwrap().is_none());
    }

    #[test]
    fn test_reset_schema_drops_data() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_conversation(&sample_records("1", 100)).unwrap();
        store.conn.execute("CREATE TABLE leftover (x TEXT)", []).unwrap();

        store.reset_schema().unwrap();

        assert_eq!(store.count_rows("conversations").unwrap(), 0);
        assert!(store.count_rows("leftover").is_err());

        let index: Option<String> = store
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_conversations_updated_at'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap();
        assert_eq!(index.as_deref(), Some("idx_conversations_updated_at"));
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intercom.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.replace_conversation(&sample_records("9", 100)).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_conversation("9").unwrap().is_some());
    }
}
