//! SQLite context store.
//!
//! One table, `context`, holds every entry of every session. Indexes on
//! `timestamp`, `entry_type`, and `session_id` back the three access paths
//! (chronological replay, type filters, per-session windows). Each append is
//! a single `INSERT`, so a write either lands completely or not at all.

use crate::clock::MonotonicClock;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use stepwise_core::context::{
    format_timestamp, ContextEntry, ContextQuery, ContextStore, EntryType, NewEntry, SessionId,
};
use stepwise_core::error::ContextError;
use tracing::{debug, info};

/// A durable context store backed by a single SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
    clock: MonotonicClock,
}

impl SqliteStore {
    /// Open a store from a connection string.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, ContextError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ContextError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open (or create) a store at a filesystem path.
    pub async fn open(path: &Path) -> Result<Self, ContextError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ContextError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, ContextError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ContextError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::run_migrations(&pool).await?;
        let last = Self::latest_timestamp(&pool).await?;
        info!("SQLite context store initialized at {label}");
        Ok(Self {
            pool,
            clock: MonotonicClock::seeded(last),
        })
    }

    /// Create the table and indexes if absent. Safe to run on every open.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), ContextError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS context (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp    TEXT NOT NULL,
                data         TEXT NOT NULL,
                entry_type   TEXT NOT NULL,
                session_id   TEXT NOT NULL,
                annotations  TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| ContextError::MigrationFailed(format!("context table: {e}")))?;

        // Databases written before annotations existed lack the column
        let columns = sqlx::query("PRAGMA table_info(context)")
            .fetch_all(pool)
            .await
            .map_err(|e| ContextError::MigrationFailed(format!("table_info: {e}")))?;
        let has_annotations = columns
            .iter()
            .any(|row| row.try_get::<String, _>("name").is_ok_and(|n| n == "annotations"));
        if !has_annotations {
            sqlx::query("ALTER TABLE context ADD COLUMN annotations TEXT")
                .execute(pool)
                .await
                .map_err(|e| ContextError::MigrationFailed(format!("annotations column: {e}")))?;
        }

        for (name, column) in [
            ("idx_timestamp", "timestamp"),
            ("idx_entry_type", "entry_type"),
            ("idx_session_id", "session_id"),
        ] {
            sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {name} ON context ({column})"))
                .execute(pool)
                .await
                .map_err(|e| ContextError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn latest_timestamp(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>, ContextError> {
        let row = sqlx::query("SELECT MAX(timestamp) AS ts FROM context")
            .fetch_one(pool)
            .await
            .map_err(|e| ContextError::QueryFailed(format!("MAX(timestamp): {e}")))?;
        let ts: Option<String> = row
            .try_get("ts")
            .map_err(|e| ContextError::QueryFailed(format!("ts column: {e}")))?;
        Ok(ts.as_deref().and_then(parse_timestamp))
    }

    /// Parse a `ContextEntry` from a SQLite row.
    fn row_to_entry(row: &SqliteRow) -> Result<ContextEntry, ContextError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| ContextError::QueryFailed(format!("id column: {e}")))?;
        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| ContextError::QueryFailed(format!("timestamp column: {e}")))?;
        let data_json: String = row
            .try_get("data")
            .map_err(|e| ContextError::QueryFailed(format!("data column: {e}")))?;
        let entry_type_str: String = row
            .try_get("entry_type")
            .map_err(|e| ContextError::QueryFailed(format!("entry_type column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| ContextError::QueryFailed(format!("session_id column: {e}")))?;
        let annotations_json: Option<String> = row.try_get("annotations").unwrap_or(None);

        let timestamp = parse_timestamp(&timestamp_str).ok_or_else(|| {
            ContextError::QueryFailed(format!("Unreadable timestamp '{timestamp_str}' on entry {id}"))
        })?;
        let entry_type = entry_type_str
            .parse::<EntryType>()
            .map_err(|e| ContextError::QueryFailed(format!("entry {id}: {e}")))?;
        let data = serde_json::from_str(&data_json)
            .map_err(|e| ContextError::QueryFailed(format!("entry {id} data: {e}")))?;
        let annotations = annotations_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ContextError::QueryFailed(format!("entry {id} annotations: {e}")))?;

        Ok(ContextEntry {
            id,
            timestamp,
            entry_type,
            data,
            session_id: SessionId(session_id),
            annotations,
        })
    }

    async fn fetch(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<ContextEntry>, ContextError> {
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ContextError::QueryFailed(format!("SELECT failed: {e}")))?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}

/// Accepts our own RFC 3339 form and the zone-less ISO form of older databases.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[async_trait]
impl ContextStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, entry: NewEntry) -> Result<i64, ContextError> {
        let data_json = serde_json::to_string(&entry.data)
            .map_err(|e| ContextError::Storage(format!("Data serialization: {e}")))?;
        let annotations_json = entry
            .annotations
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ContextError::Storage(format!("Annotation serialization: {e}")))?;
        let timestamp = format_timestamp(&self.clock.next());

        let result = sqlx::query(
            r#"
            INSERT INTO context (timestamp, data, entry_type, session_id, annotations)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&timestamp)
        .bind(&data_json)
        .bind(entry.entry_type.as_str())
        .bind(entry.session_id.as_str())
        .bind(annotations_json.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| ContextError::Storage(format!("INSERT failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, entry_type = %entry.entry_type, session_id = %entry.session_id, "Stored context entry");
        Ok(id)
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: Option<usize>,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<ContextEntry>, ContextError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM context WHERE session_id = ");
        qb.push_bind(session_id.0.clone());
        if let Some(t) = entry_type {
            qb.push(" AND entry_type = ").push_bind(t.as_str());
        }
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        self.fetch(qb).await
    }

    async fn query(&self, query: ContextQuery) -> Result<Vec<ContextEntry>, ContextError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM context WHERE 1 = 1");
        if let Some(s) = &query.session_id {
            qb.push(" AND session_id = ").push_bind(s.0.clone());
        }
        if let Some(t) = query.entry_type {
            qb.push(" AND entry_type = ").push_bind(t.as_str());
        }
        if let Some(start) = &query.start_time {
            qb.push(" AND timestamp >= ").push_bind(format_timestamp(start));
        }
        if let Some(end) = &query.end_time {
            qb.push(" AND timestamp <= ").push_bind(format_timestamp(end));
        }
        qb.push(" ORDER BY timestamp ASC, id ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        self.fetch(qb).await
    }

    async fn sessions(&self) -> Result<Vec<SessionId>, ContextError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id FROM context
            GROUP BY session_id
            ORDER BY MIN(timestamp), MIN(id)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ContextError::QueryFailed(format!("sessions: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("session_id")
                    .map(SessionId)
                    .map_err(|e| ContextError::QueryFailed(format!("session_id column: {e}")))
            })
            .collect()
    }

    async fn clear(&self, session_id: Option<&SessionId>) -> Result<u64, ContextError> {
        let result = match session_id {
            Some(s) => {
                sqlx::query("DELETE FROM context WHERE session_id = ?1")
                    .bind(s.as_str())
                    .execute(&self.pool)
                    .await
            }
            None => sqlx::query("DELETE FROM context").execute(&self.pool).await,
        }
        .map_err(|e| ContextError::Storage(format!("DELETE failed: {e}")))?;

        info!(removed = result.rows_affected(), "Cleared context entries");
        Ok(result.rows_affected())
    }

    async fn count(&self, session_id: Option<&SessionId>) -> Result<usize, ContextError> {
        let row = match session_id {
            Some(s) => {
                sqlx::query("SELECT COUNT(*) AS cnt FROM context WHERE session_id = ?1")
                    .bind(s.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS cnt FROM context")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| ContextError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| ContextError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn add_then_recent_returns_payload() {
        let db = test_store().await;
        let s = db.new_session();
        db.add(json!({"a": 1}), "general", &s).await.unwrap();

        let entries = db.recent(&s, None, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, json!({"a": 1}));
        assert_eq!(entries[0].entry_type, EntryType::General);
        assert_eq!(entries[0].session_id, s);
    }

    #[tokio::test]
    async fn invalid_entry_type_writes_nothing() {
        let db = test_store().await;
        let s = db.new_session();
        db.add(json!("ok"), "general", &s).await.unwrap();

        let err = db.add(json!("bad"), "custom_type", &s).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(db.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let db = test_store().await;
        let s = db.new_session();
        for i in 0..5 {
            db.add(json!(i), "general", &s).await.unwrap();
        }

        let all = db.recent(&s, None, None).await.unwrap();
        let values: Vec<_> = all.iter().map(|e| e.data.clone()).collect();
        assert_eq!(values, vec![json!(4), json!(3), json!(2), json!(1), json!(0)]);

        let window = db.recent(&s, Some(2), None).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].data, json!(4));
        assert_eq!(window[1].data, json!(3));
    }

    #[tokio::test]
    async fn recent_filters_by_type_and_session() {
        let db = test_store().await;
        let s1 = db.new_session();
        let s2 = db.new_session();
        db.add(json!({"error": "x"}), "error", &s1).await.unwrap();
        db.add(json!({"tool": "t"}), "tool_result", &s1).await.unwrap();
        db.add(json!({"error": "y"}), "error", &s2).await.unwrap();

        let errors = db.recent(&s1, None, Some(EntryType::Error)).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].data["error"], "x");
    }

    #[tokio::test]
    async fn query_is_oldest_first_across_sessions() {
        let db = test_store().await;
        let s1 = db.new_session();
        let s2 = db.new_session();
        db.add(json!(1), "general", &s1).await.unwrap();
        db.add(json!(2), "general", &s2).await.unwrap();
        db.add(json!(3), "stop", &s1).await.unwrap();

        let all = db.query(ContextQuery::default()).await.unwrap();
        let values: Vec<_> = all.iter().map(|e| e.data.clone()).collect();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);

        let s1_only = db
            .query(ContextQuery {
                session_id: Some(s1.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(s1_only.len(), 2);

        let stops = db
            .query(ContextQuery {
                entry_type: Some(EntryType::Stop),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].data, json!(3));

        let first = db
            .query(ContextQuery {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first[0].data, json!(1));
    }

    #[tokio::test]
    async fn query_time_range_is_inclusive() {
        let db = test_store().await;
        let s = db.new_session();
        for i in 0..3 {
            db.add(json!(i), "general", &s).await.unwrap();
        }
        let all = db.query(ContextQuery::default()).await.unwrap();

        let middle = db
            .query(ContextQuery {
                start_time: Some(all[1].timestamp),
                end_time: Some(all[1].timestamp),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(middle.len(), 1);
        assert_eq!(middle[0].id, all[1].id);

        let tail = db
            .query(ContextQuery {
                start_time: Some(all[1].timestamp),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn sessions_ordered_by_first_entry() {
        let db = test_store().await;
        let s1 = db.new_session();
        let s2 = db.new_session();
        db.add(json!("a"), "general", &s2).await.unwrap();
        db.add(json!("b"), "general", &s1).await.unwrap();
        db.add(json!("c"), "general", &s2).await.unwrap();

        assert_eq!(db.sessions().await.unwrap(), vec![s2, s1]);
    }

    #[tokio::test]
    async fn clear_one_session_then_all() {
        let db = test_store().await;
        let s1 = db.new_session();
        let s2 = db.new_session();
        db.add(json!(1), "general", &s1).await.unwrap();
        db.add(json!(2), "general", &s1).await.unwrap();
        db.add(json!(3), "general", &s2).await.unwrap();

        assert_eq!(db.clear(Some(&s1)).await.unwrap(), 2);
        assert_eq!(db.count(Some(&s1)).await.unwrap(), 0);
        assert_eq!(db.count(Some(&s2)).await.unwrap(), 1);

        assert_eq!(db.clear(None).await.unwrap(), 1);
        assert_eq!(db.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn annotations_round_trip_outside_data() {
        let db = test_store().await;
        let s = db.new_session();
        db.insert(
            NewEntry::new(&s, EntryType::Stop, json!({"result": 4}))
                .with_annotations(Some(json!({"usage": {"total_tokens": 15}}))),
        )
        .await
        .unwrap();

        let entry = &db.recent(&s, None, None).await.unwrap()[0];
        assert_eq!(entry.data, json!({"result": 4}));
        assert_eq!(entry.annotations.as_ref().unwrap()["usage"]["total_tokens"], 15);
    }

    #[tokio::test]
    async fn reopening_file_keeps_entries_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("context.db");
        let s = SessionId::new();

        {
            let db = SqliteStore::open(&path).await.unwrap();
            db.add(json!("first"), "general", &s).await.unwrap();
        }

        let db = SqliteStore::open(&path).await.unwrap();
        db.add(json!("second"), "general", &s).await.unwrap();

        let entries = db.query(ContextQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data, json!("first"));
        assert!(entries[0].timestamp < entries[1].timestamp);
    }

    #[test]
    fn parses_legacy_timestamps() {
        let ts = parse_timestamp("2024-05-01T10:20:30.123456").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-01T10:20:30.123456Z");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
