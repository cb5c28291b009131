//! Record store trait: one submission record per identity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{StatusCounts, SubmissionRecord, SubmissionStatus};

/// Durable keyed storage for submission records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create or replace the identity's submission.
    ///
    /// Replacing resets the record to pending, clears `report` and
    /// `last_sent`, and moves `last_update` to `now`. A `None` reply target
    /// keeps the one already stored.
    async fn upsert_with_reply_to(
        &self,
        identity: &str,
        text: &str,
        reply_to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecord>;

    async fn upsert(&self, identity: &str, text: &str, now: DateTime<Utc>)
    -> Result<SubmissionRecord> {
        self.upsert_with_reply_to(identity, text, None, now).await
    }

    async fn get(&self, identity: &str) -> Result<Option<SubmissionRecord>>;

    /// Apply a verdict only if the record is still the one it was computed
    /// for: same text, `last_update <= not_newer_than`, and still pending.
    ///
    /// Returns `false` when the gate rejects the write. Must be atomic with
    /// respect to concurrent upserts of the same identity.
    async fn update_if_current(
        &self,
        identity: &str,
        expected_text: &str,
        not_newer_than: DateTime<Utc>,
        status: SubmissionStatus,
        report: &str,
    ) -> Result<bool>;

    /// Record a successful broadcast while the record is still approved with
    /// `expected_text`.
    async fn mark_sent(&self, identity: &str, expected_text: &str, at: DateTime<Utc>)
    -> Result<bool>;

    async fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<SubmissionRecord>>;

    async fn count_by_status(&self) -> Result<StatusCounts>;
}
