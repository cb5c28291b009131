//! Submission intake: store the text, then queue it for verification.

use chrono::Utc;
use relaycast_core::error::Result;
use relaycast_core::types::{IntakeMessage, SubmissionStatus};

use crate::context::AppContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored and queued. `replaced` is set when an earlier submission was overwritten.
    Accepted { replaced: bool },
    /// Refused before storing; the text is too short to be a submission.
    TooShort { min_chars: usize },
}

pub struct IntakeService {
    ctx: AppContext,
}

impl IntakeService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Accept a new submission for `identity`.
    ///
    /// The record is upserted first so `/status` shows it as pending right
    /// away; the queue message carries the same `last_update` the upsert wrote.
    pub async fn submit(
        &self,
        identity: &str,
        reply_to: Option<&str>,
        text: &str,
    ) -> Result<SubmitOutcome> {
        let min_chars = self.ctx.config.checks.min_intake_chars;
        if text.trim().chars().count() <= min_chars {
            return Ok(SubmitOutcome::TooShort {
                min_chars: min_chars + 1,
            });
        }

        let record = self
            .ctx
            .store
            .upsert_with_reply_to(identity, text, reply_to, Utc::now())
            .await?;
        let replaced = record.was_replaced();
        if replaced {
            tracing::info!("🔄 @{identity} replaced their submission");
        } else {
            tracing::info!("📝 New submission from @{identity}");
        }

        let message = IntakeMessage {
            identity: identity.to_string(),
            text: record.text,
            submitted_at: record.last_update,
            reply_to: record.reply_to,
        };
        let id = self.ctx.queue.enqueue(&message).await?;
        tracing::debug!("Queued submission of @{identity} as #{id}");

        Ok(SubmitOutcome::Accepted { replaced })
    }

    /// Queue every PENDING record again. Covers submissions whose enqueue
    /// never happened; duplicates are absorbed by the staleness fence.
    pub async fn requeue_pending(&self) -> Result<usize> {
        let pending = self.ctx.store.list_by_status(SubmissionStatus::Pending).await?;
        for record in &pending {
            self.ctx
                .queue
                .enqueue(&IntakeMessage {
                    identity: record.identity.clone(),
                    text: record.text.clone(),
                    submitted_at: record.last_update,
                    reply_to: record.reply_to.clone(),
                })
                .await?;
        }
        if !pending.is_empty() {
            tracing::info!("📥 Requeued {} pending submission(s)", pending.len());
        }
        Ok(pending.len())
    }
}
