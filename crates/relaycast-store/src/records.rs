//! SQLite-backed record store: one row per identity.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycast_core::error::{RelayError, Result};
use relaycast_core::traits::RecordStore;
use relaycast_core::types::{StatusCounts, SubmissionRecord, SubmissionStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{from_micros, has_column, store_err, to_micros};

const SELECT_COLUMNS: &str =
    "identity, text, status, report, last_sent, last_update, created_at, updated_at, reply_to";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open or create the submissions database.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(busy_timeout).map_err(store_err)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the table, then add columns introduced after the first release.
    /// Only nullable or defaulted columns are ever added, so older binaries
    /// keep working against a migrated file.
    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS submissions (
                identity TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,   -- 0 pending, 1 approved, -1 rejected
                report TEXT,
                last_sent INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);",
        )
        .map_err(store_err)?;

        if !has_column(conn, "submissions", "last_update").map_err(store_err)? {
            tracing::info!("🔧 Adding column submissions.last_update");
            conn.execute(
                "ALTER TABLE submissions ADD COLUMN last_update INTEGER NOT NULL DEFAULT 0",
                [],
            )
            .map_err(store_err)?;
        }
        if !has_column(conn, "submissions", "reply_to").map_err(store_err)? {
            tracing::info!("🔧 Adding column submissions.reply_to");
            conn.execute("ALTER TABLE submissions ADD COLUMN reply_to TEXT", [])
                .map_err(store_err)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Store(format!("connection poisoned: {e}")))
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SubmissionRecord> {
        Ok(SubmissionRecord {
            identity: row.get(0)?,
            text: row.get(1)?,
            status: SubmissionStatus::from_code(row.get(2)?),
            report: row.get(3)?,
            last_sent: row.get::<_, Option<i64>>(4)?.map(from_micros),
            last_update: from_micros(row.get(5)?),
            created_at: from_micros(row.get(6)?),
            updated_at: from_micros(row.get(7)?),
            reply_to: row.get(8)?,
        })
    }

    fn select_one(conn: &Connection, identity: &str) -> Result<Option<SubmissionRecord>> {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM submissions WHERE identity = ?1"),
            params![identity],
            Self::row_to_record,
        )
        .optional()
        .map_err(store_err)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert_with_reply_to(
        &self,
        identity: &str,
        text: &str,
        reply_to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO submissions
                (identity, text, status, report, last_sent, last_update, created_at, updated_at,
                 reply_to)
             VALUES (?1, ?2, 0, NULL, NULL, ?3, ?3, ?3, ?4)
             ON CONFLICT(identity) DO UPDATE SET
                text = excluded.text,
                status = 0,
                report = NULL,
                last_sent = NULL,
                last_update = excluded.last_update,
                updated_at = excluded.updated_at,
                reply_to = COALESCE(excluded.reply_to, submissions.reply_to)",
            params![identity, text, to_micros(now), reply_to],
        )
        .map_err(store_err)?;

        Self::select_one(&conn, identity)?
            .ok_or_else(|| RelayError::Store(format!("record for {identity} vanished after upsert")))
    }

    async fn get(&self, identity: &str) -> Result<Option<SubmissionRecord>> {
        let conn = self.lock()?;
        Self::select_one(&conn, identity)
    }

    async fn update_if_current(
        &self,
        identity: &str,
        expected_text: &str,
        not_newer_than: DateTime<Utc>,
        status: SubmissionStatus,
        report: &str,
    ) -> Result<bool> {
        if !SubmissionStatus::Pending.can_transition_to(status) {
            return Err(RelayError::InvalidTransition(format!(
                "a verdict cannot set status {status}"
            )));
        }
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE submissions SET status = ?4, report = ?5, updated_at = ?6
                 WHERE identity = ?1 AND text = ?2 AND last_update <= ?3 AND status = 0",
                params![
                    identity,
                    expected_text,
                    to_micros(not_newer_than),
                    status.code(),
                    report,
                    to_micros(Utc::now()),
                ],
            )
            .map_err(store_err)?;
        Ok(changed == 1)
    }

    async fn mark_sent(&self, identity: &str, expected_text: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE submissions SET last_sent = ?3, updated_at = ?3
                 WHERE identity = ?1 AND text = ?2 AND status = 1",
                params![identity, expected_text, to_micros(at)],
            )
            .map_err(store_err)?;
        Ok(changed == 1)
    }

    async fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<SubmissionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM submissions WHERE status = ?1 ORDER BY created_at"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![status.code()], Self::row_to_record)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    async fn count_by_status(&self) -> Result<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM submissions GROUP BY status")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .map_err(store_err)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (code, n) = row.map_err(store_err)?;
            let n = n as usize;
            match SubmissionStatus::from_code(code) {
                SubmissionStatus::Pending => counts.pending += n,
                SubmissionStatus::Approved => counts.approved += n,
                SubmissionStatus::Rejected => counts.rejected += n,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn store() -> SqliteRecordStore {
        SqliteRecordStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_record() {
        let store = store();
        let t0 = Utc::now();
        let first = store.upsert("alice", "first text", t0).await.unwrap();
        assert!(!first.was_replaced());

        for (i, text) in ["second", "third", "fourth"].iter().enumerate() {
            let at = t0 + ChronoDuration::seconds(i as i64 + 1);
            store.upsert("alice", text, at).await.unwrap();
        }

        let record = store.get("alice").await.unwrap().unwrap();
        assert_eq!(record.text, "fourth");
        assert!(record.was_replaced());
        assert_eq!(store.count_by_status().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_upsert_resets_verdict_and_last_sent() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("bob", "text", t0).await.unwrap();
        assert!(store
            .update_if_current("bob", "text", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap());
        assert!(store.mark_sent("bob", "text", t0).await.unwrap());

        let t1 = t0 + ChronoDuration::seconds(5);
        let record = store.upsert("bob", "new text", t1).await.unwrap();
        assert_eq!(record.status, SubmissionStatus::Pending);
        assert_eq!(record.report, None);
        assert_eq!(record.last_sent, None);
        assert_eq!(record.last_update.timestamp_micros(), t1.timestamp_micros());
    }

    #[tokio::test]
    async fn test_reply_to_is_kept_across_upserts() {
        let store = store();
        let t0 = Utc::now();
        let record = store
            .upsert_with_reply_to("ivy", "text", Some("4242"), t0)
            .await
            .unwrap();
        assert_eq!(record.reply_to.as_deref(), Some("4242"));

        let record = store
            .upsert("ivy", "newer", t0 + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert_eq!(record.reply_to.as_deref(), Some("4242"));

        let record = store
            .upsert_with_reply_to("ivy", "newest", Some("77"), t0 + ChronoDuration::seconds(2))
            .await
            .unwrap();
        assert_eq!(record.reply_to.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_update_if_current_applies_matching_verdict() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("carol", "text", t0).await.unwrap();

        let applied = store
            .update_if_current("carol", "text", t0, SubmissionStatus::Rejected, "too short")
            .await
            .unwrap();
        assert!(applied);

        let record = store.get("carol").await.unwrap().unwrap();
        assert_eq!(record.status, SubmissionStatus::Rejected);
        assert_eq!(record.report.as_deref(), Some("too short"));
    }

    #[tokio::test]
    async fn test_update_if_current_rejects_changed_text() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("dave", "A", t0).await.unwrap();
        store.upsert("dave", "B", t0 + ChronoDuration::seconds(1)).await.unwrap();

        let applied = store
            .update_if_current("dave", "A", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap();
        assert!(!applied);
        let record = store.get("dave").await.unwrap().unwrap();
        assert_eq!(record.text, "B");
        assert_eq!(record.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_if_current_rejects_older_submission_of_same_text() {
        let store = store();
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(1);
        store.upsert("erin", "same", t0).await.unwrap();
        store.upsert("erin", "same", t1).await.unwrap();

        assert!(!store
            .update_if_current("erin", "same", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap());
        assert!(store
            .update_if_current("erin", "same", t1, SubmissionStatus::Approved, "ok")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_if_current_only_from_pending() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("frank", "text", t0).await.unwrap();
        assert!(store
            .update_if_current("frank", "text", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap());
        // A redelivered verdict for the same submission is a no-op.
        assert!(!store
            .update_if_current("frank", "text", t0, SubmissionStatus::Rejected, "late")
            .await
            .unwrap());
        let record = store.get("frank").await.unwrap().unwrap();
        assert_eq!(record.status, SubmissionStatus::Approved);
        assert_eq!(record.report.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_update_if_current_refuses_pending_target() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("gina", "text", t0).await.unwrap();
        let err = store
            .update_if_current("gina", "text", t0, SubmissionStatus::Pending, "")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_update_if_current_missing_identity() {
        let store = store();
        assert!(!store
            .update_if_current("nobody", "text", Utc::now(), SubmissionStatus::Approved, "ok")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mark_sent_requires_approved_same_text() {
        let store = store();
        let t0 = Utc::now();
        store.upsert("hank", "text", t0).await.unwrap();
        assert!(!store.mark_sent("hank", "text", t0).await.unwrap());

        store
            .update_if_current("hank", "text", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap();
        assert!(!store.mark_sent("hank", "other", t0).await.unwrap());
        assert!(store.mark_sent("hank", "text", t0).await.unwrap());
        let record = store.get("hank").await.unwrap().unwrap();
        assert_eq!(
            record.last_sent.map(|t| t.timestamp_micros()),
            Some(t0.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_list_and_count_by_status() {
        let store = store();
        let t0 = Utc::now();
        for id in ["a", "b", "c"] {
            store.upsert(id, "text", t0).await.unwrap();
        }
        store
            .update_if_current("a", "text", t0, SubmissionStatus::Approved, "ok")
            .await
            .unwrap();
        store
            .update_if_current("b", "text", t0, SubmissionStatus::Rejected, "no")
            .await
            .unwrap();

        let approved = store.list_by_status(SubmissionStatus::Approved).await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].identity, "a");

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                approved: 1,
                rejected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_migrates_legacy_table_without_last_update() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE submissions (
                identity TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                report TEXT,
                last_sent INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            INSERT INTO submissions (identity, text, status, created_at, updated_at)
            VALUES ('legacy', 'old text', 1, 1, 1);",
        )
        .unwrap();

        let store = SqliteRecordStore::from_connection(conn).unwrap();
        let record = store.get("legacy").await.unwrap().unwrap();
        assert_eq!(record.status, SubmissionStatus::Approved);
        assert_eq!(record.last_update.timestamp_micros(), 0);
        assert_eq!(record.reply_to, None);

        // Running the migration twice is harmless.
        let conn = store.conn.into_inner().unwrap();
        assert!(SqliteRecordStore::from_connection(conn).is_ok());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = std::env::temp_dir().join("relaycast-store-test");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("nested").join("submissions.db");
        {
            let store = SqliteRecordStore::open(&path, Duration::from_secs(1)).unwrap();
            store.upsert("ivy", "persisted", Utc::now()).await.unwrap();
        }
        let reopened = SqliteRecordStore::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(reopened.get("ivy").await.unwrap().unwrap().text, "persisted");
        std::fs::remove_dir_all(&dir).ok();
    }
}
