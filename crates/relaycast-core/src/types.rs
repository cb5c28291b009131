//! Data model: submission records, verdicts and queue messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a submission.
///
/// Persisted as an integer: 0 = pending, 1 = approved, -1 = rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn code(self) -> i64 {
        match self {
            SubmissionStatus::Pending => 0,
            SubmissionStatus::Approved => 1,
            SubmissionStatus::Rejected => -1,
        }
    }

    /// Decode a persisted status. Unknown codes read as pending so the
    /// record gets checked again rather than broadcast.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SubmissionStatus::Approved,
            -1 => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Pending,
        }
    }

    /// Whether a verdict may move a record from `self` to `next`.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        self == SubmissionStatus::Pending && next != SubmissionStatus::Pending
    }

    pub fn from_verdict(approved: bool) -> Self {
        if approved {
            SubmissionStatus::Approved
        } else {
            SubmissionStatus::Rejected
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStatus::Pending => write!(f, "pending"),
            SubmissionStatus::Approved => write!(f, "approved"),
            SubmissionStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// The single active submission of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Transport-supplied handle; natural key.
    pub identity: String,
    pub text: String,
    pub status: SubmissionStatus,
    /// Explanation attached to the last applied verdict.
    pub report: Option<String>,
    /// Last successful broadcast.
    pub last_sent: Option<DateTime<Utc>>,
    /// When `text` last changed. Verdicts older than this are stale.
    pub last_update: DateTime<Utc>,
    /// Chat the submission arrived on; verdict notifications go there.
    #[serde(default)]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// True when this upsert replaced an earlier submission.
    pub fn was_replaced(&self) -> bool {
        self.last_update > self.created_at
    }
}

/// Outcome of checking a submission text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    pub report: String,
}

impl Verdict {
    pub fn approve(report: impl Into<String>) -> Self {
        Self {
            approved: true,
            report: report.into(),
        }
    }

    pub fn reject(report: impl Into<String>) -> Self {
        Self {
            approved: false,
            report: report.into(),
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        SubmissionStatus::from_verdict(self.approved)
    }
}

/// Work item carried by the intake queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeMessage {
    pub identity: String,
    pub text: String,
    /// Same instant written to the record's `last_update` by the upsert.
    pub submitted_at: DateTime<Utc>,
    /// Chat to notify about the verdict; falls back to `identity`.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl IntakeMessage {
    pub fn notify_target(&self) -> &str {
        self.reply_to.as_deref().unwrap_or(&self.identity)
    }
}

/// A claimed queue entry awaiting ack or release.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: i64,
    pub message: IntakeMessage,
    /// Number of times this entry has been claimed, this claim included.
    pub attempts: u32,
}

/// A message received from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel: String,
    /// Chat the reply goes to.
    pub thread_id: String,
    /// Stable sender handle (username, or numeric id when absent).
    pub identity: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Record counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}
