//! Durable intake queue on SQLite.
//!
//! Claiming a row pushes its `visible_at` forward by the visibility timeout.
//! Ack deletes the row; a consumer that dies mid-way simply lets the claim
//! lapse and the row becomes claimable again.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycast_core::error::{RelayError, Result};
use relaycast_core::traits::IntakeQueue;
use relaycast_core::types::{Delivery, IntakeMessage};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::sync::Notify;

use crate::{from_micros, has_column, queue_err, to_micros};

pub struct SqliteQueue {
    conn: Mutex<Connection>,
    /// Wakes a waiting consumer when this process enqueues.
    notify: Notify,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl SqliteQueue {
    pub fn open(
        path: &Path,
        busy_timeout: Duration,
        visibility_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(queue_err)?;
        conn.busy_timeout(busy_timeout).map_err(queue_err)?;
        Self::from_connection(conn, visibility_timeout, poll_interval)
    }

    pub fn open_in_memory(visibility_timeout: Duration, poll_interval: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(queue_err)?;
        Self::from_connection(conn, visibility_timeout, poll_interval)
    }

    fn from_connection(
        conn: Connection,
        visibility_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            notify: Notify::new(),
            visibility_timeout,
            poll_interval,
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS intake_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL,
                text TEXT NOT NULL,
                submitted_at INTEGER NOT NULL,
                enqueued_at INTEGER NOT NULL,
                visible_at INTEGER NOT NULL,     -- claimable once now >= visible_at
                attempts INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_intake_queue_visible ON intake_queue(visible_at, id);",
        )
        .map_err(queue_err)?;

        if !has_column(conn, "intake_queue", "reply_to").map_err(queue_err)? {
            tracing::info!("🔧 Adding column intake_queue.reply_to");
            conn.execute("ALTER TABLE intake_queue ADD COLUMN reply_to TEXT", [])
                .map_err(queue_err)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Queue(format!("connection poisoned: {e}")))
    }

    /// Claim the oldest visible message as of `now`, if any.
    pub fn try_claim(&self, now: DateTime<Utc>) -> Result<Option<Delivery>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(queue_err)?;

        let now_us = to_micros(now);
        let row = tx
            .query_row(
                "SELECT id, identity, text, submitted_at, reply_to, attempts
                 FROM intake_queue WHERE visible_at <= ?1 ORDER BY id LIMIT 1",
                params![now_us],
                |row| {
                    Ok(Delivery {
                        id: row.get(0)?,
                        message: IntakeMessage {
                            identity: row.get(1)?,
                            text: row.get(2)?,
                            submitted_at: from_micros(row.get(3)?),
                            reply_to: row.get(4)?,
                        },
                        attempts: row.get::<_, u32>(5)? + 1,
                    })
                },
            )
            .optional()
            .map_err(queue_err)?;

        if let Some(delivery) = &row {
            let visible_at = now_us + self.visibility_timeout.as_micros() as i64;
            tx.execute(
                "UPDATE intake_queue SET visible_at = ?2, attempts = attempts + 1 WHERE id = ?1",
                params![delivery.id, visible_at],
            )
            .map_err(queue_err)?;
        }
        tx.commit().map_err(queue_err)?;
        Ok(row)
    }

    fn release_at(&self, id: i64, visible_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE intake_queue SET visible_at = ?2 WHERE id = ?1",
            params![id, to_micros(visible_at)],
        )
        .map_err(queue_err)?;
        Ok(())
    }
}

#[async_trait]
impl IntakeQueue for SqliteQueue {
    async fn enqueue(&self, message: &IntakeMessage) -> Result<i64> {
        let id = {
            let conn = self.lock()?;
            let now = to_micros(Utc::now());
            conn.execute(
                "INSERT INTO intake_queue
                    (identity, text, submitted_at, enqueued_at, visible_at, attempts, reply_to)
                 VALUES (?1, ?2, ?3, ?4, ?4, 0, ?5)",
                params![
                    message.identity,
                    message.text,
                    to_micros(message.submitted_at),
                    now,
                    message.reply_to,
                ],
            )
            .map_err(queue_err)?;
            conn.last_insert_rowid()
        };
        tracing::debug!("📥 Enqueued #{id} from {}", message.identity);
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.try_claim(Utc::now())? {
                tracing::debug!(
                    "📤 Claimed #{} from {} (attempt {})",
                    delivery.id,
                    delivery.message.identity,
                    delivery.attempts
                );
                return Ok(delivery);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM intake_queue WHERE id = ?1", params![id])
            .map_err(queue_err)?;
        Ok(())
    }

    async fn release(&self, id: i64, delay: Duration) -> Result<()> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| RelayError::Queue(format!("release delay out of range: {e}")))?;
        self.release_at(id, Utc::now() + delay)?;
        self.notify.notify_one();
        Ok(())
    }

    async fn depth(&self) -> Result<usize> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM intake_queue", [], |r| r.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(queue_err)
    }
}
