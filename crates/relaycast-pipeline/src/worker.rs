//! Verification worker: consumes the intake queue and applies verdicts.
//!
//! A verdict is written through `update_if_current`, so it lands only if the
//! record still holds the text it was computed for and is still pending. A
//! newer submission, or a redelivery of an already decided message, simply
//! fails the gate and is acked as superseded.

use std::sync::Arc;
use std::time::Duration;

use relaycast_core::error::Result;
use relaycast_core::types::{Delivery, IntakeMessage, Verdict};
use relaycast_providers::{ContentFilter, HeuristicChecker};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::context::AppContext;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(Verdict),
    /// The record moved on; the verdict was discarded.
    Superseded,
}

pub struct VerificationWorker {
    ctx: AppContext,
    filter: ContentFilter,
    /// Answers when the configured provider itself errors.
    heuristic: HeuristicChecker,
}

impl VerificationWorker {
    pub fn new(ctx: AppContext) -> Self {
        let filter = ContentFilter::from_config(&ctx.config.checks);
        let heuristic = HeuristicChecker::from_config(&ctx.config.checks);
        Self {
            ctx,
            filter,
            heuristic,
        }
    }

    async fn verdict_for(&self, text: &str) -> Verdict {
        if let Some(rejection) = self.filter.screen(text) {
            return rejection;
        }
        match self.ctx.provider.check(text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Provider {} failed: {e}, using local heuristic",
                    self.ctx.provider.name()
                );
                self.heuristic.evaluate(text)
            }
        }
    }

    /// Verify one queued submission. Errors come from the record store;
    /// notification failures are logged and do not fail the message.
    pub async fn process(&self, message: &IntakeMessage) -> Result<Outcome> {
        let identity = message.identity.as_str();
        let verdict = self.verdict_for(&message.text).await;

        let applied = self
            .ctx
            .store
            .update_if_current(
                identity,
                &message.text,
                message.submitted_at,
                verdict.status(),
                &verdict.report,
            )
            .await?;
        if !applied {
            tracing::info!("⏭️ Verdict for @{identity} superseded, discarded");
            return Ok(Outcome::Superseded);
        }

        tracing::info!("⚖️ @{identity} → {}", verdict.status());
        let target = message.notify_target();
        if verdict.approved {
            let note = format!(
                "✅ Your submission passed the check and will be posted to the channel!\n\n\
                 Check results:\n{}",
                verdict.report
            );
            self.notify(target, &note).await;
            self.ctx
                .scheduler
                .register(identity, self.ctx.config.schedule.approval_delay());
        } else {
            let note = format!(
                "❌ Your submission did not pass the check and will not be posted.\n\n\
                 Check results:\n{}\n\nPlease fix it and send it again.",
                verdict.report
            );
            self.notify(target, &note).await;
        }
        Ok(Outcome::Applied(verdict))
    }

    async fn notify(&self, target: &str, text: &str) {
        if let Err(e) = self.ctx.notifier.notify(target, text).await {
            tracing::warn!("⚠️ Could not notify {target}: {e}");
        }
    }

    async fn handle(&self, delivery: Delivery) {
        match self.process(&delivery.message).await {
            Ok(_) => {
                if let Err(e) = self.ctx.queue.ack(delivery.id).await {
                    tracing::warn!("⚠️ Ack of #{} failed, it will be redelivered: {e}", delivery.id);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "⚠️ Processing #{} for @{} failed (attempt {}): {e}",
                    delivery.id,
                    delivery.message.identity,
                    delivery.attempts
                );
                let delay = self.ctx.config.queue.retry_delay();
                if let Err(e) = self.ctx.queue.release(delivery.id, delay).await {
                    tracing::warn!("⚠️ Release of #{} failed, claim will expire: {e}", delivery.id);
                }
            }
            Err(e) => {
                // Retrying cannot help; the record stays pending for the next requeue.
                tracing::error!(
                    "❌ Dropping #{} for @{} after a permanent failure: {e}",
                    delivery.id,
                    delivery.message.identity
                );
                if let Err(e) = self.ctx.queue.ack(delivery.id).await {
                    tracing::warn!("⚠️ Ack of #{} failed, it will be redelivered: {e}", delivery.id);
                }
            }
        }
    }

    /// Consume until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("🔍 Verification worker {worker_id} started");
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.ctx.queue.receive() => received,
            };

            match received {
                Ok(delivery) => {
                    backoff = INITIAL_BACKOFF;
                    self.handle(delivery).await;
                }
                Err(e) => {
                    tracing::error!("Queue receive failed, retrying in {backoff:?}: {e}");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        tracing::info!("🔍 Verification worker {worker_id} stopped");
    }
}

/// Start `count` workers sharing one queue.
pub fn spawn_workers(
    ctx: &AppContext,
    count: usize,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let worker = Arc::new(VerificationWorker::new(ctx.clone()));
    (0..count.max(1))
        .map(|id| {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(id, shutdown).await })
        })
        .collect()
}
