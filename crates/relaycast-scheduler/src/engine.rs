//! Redelivery engine: job registry plus the per-identity timer loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use relaycast_core::config::{MAX_INTERVAL_HOURS, ScheduleConfig};
use relaycast_core::error::Result;
use relaycast_core::traits::{Broadcaster, RecordStore};
use relaycast_core::types::SubmissionStatus;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Pause between publish attempts within one firing.
const PUBLISH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Text posted to the broadcast channel for an approved submission.
pub fn broadcast_text(identity: &str, text: &str) -> String {
    format!("Message from @{identity}:\n\n{text}")
}

/// Result of one timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Broadcast went out and `last_sent` was recorded.
    Published,
    /// Every publish attempt failed; the firing is consumed.
    PublishFailed,
    /// Record missing or no longer approved; the timer stops.
    Cancelled,
}

struct Job {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Shared {
    store: Arc<dyn RecordStore>,
    broadcaster: Arc<dyn Broadcaster>,
    interval: Duration,
    publish_retries: u32,
    jobs: Mutex<HashMap<String, Job>>,
}

impl Shared {
    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        // A poisoned map is still consistent: every mutation is a single insert or remove.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn fire(&self, identity: &str) -> Result<FireOutcome> {
        let record = match self.store.get(identity).await? {
            Some(r) if r.status == SubmissionStatus::Approved => r,
            Some(r) => {
                tracing::info!("🛑 Timer for @{identity} cancelled (status {})", r.status);
                return Ok(FireOutcome::Cancelled);
            }
            None => {
                tracing::info!("🛑 Timer for @{identity} cancelled (no record)");
                return Ok(FireOutcome::Cancelled);
            }
        };

        let message = broadcast_text(identity, &record.text);
        let attempts = self.publish_retries + 1;
        for attempt in 1..=attempts {
            match self.broadcaster.publish(&message).await {
                Ok(()) => {
                    if !self.store.mark_sent(identity, &record.text, Utc::now()).await? {
                        tracing::debug!("Record for @{identity} changed during broadcast");
                    }
                    tracing::info!("📣 Rebroadcast @{identity}");
                    return Ok(FireOutcome::Published);
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Broadcast for @{identity} failed (attempt {attempt}/{attempts}): {e}"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(PUBLISH_RETRY_DELAY).await;
                    }
                }
            }
        }
        Ok(FireOutcome::PublishFailed)
    }

    /// Drop the registry entry only if it still belongs to `generation`.
    fn forget(&self, identity: &str, generation: u64) {
        let mut jobs = self.jobs();
        if jobs.get(identity).is_some_and(|j| j.generation == generation) {
            jobs.remove(identity);
        }
    }
}

async fn run_job(shared: Arc<Shared>, identity: String, generation: u64, first_delay: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match shared.fire(&identity).await {
            Ok(FireOutcome::Cancelled) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("⚠️ Timer for @{identity} could not read the store: {e}");
            }
        }
    }
    shared.forget(&identity, generation);
}

/// Keeps at most one recurring rebroadcast timer per identity.
#[derive(Clone)]
pub struct RedeliveryScheduler {
    shared: Arc<Shared>,
    generation: Arc<AtomicU64>,
    startup_grace: Duration,
}

impl RedeliveryScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        broadcaster: Arc<dyn Broadcaster>,
        config: &ScheduleConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                broadcaster,
                interval: config
                    .interval()
                    .clamp(Duration::from_secs(1), Duration::from_secs(MAX_INTERVAL_HOURS * 3600)),
                publish_retries: config.publish_retries,
                jobs: Mutex::new(HashMap::new()),
            }),
            generation: Arc::new(AtomicU64::new(0)),
            startup_grace: config.startup_grace(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Start the timer for `identity`, replacing any existing one.
    /// The first firing happens after `first_delay`, then every interval.
    pub fn register(&self, identity: &str, first_delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut jobs = self.shared.jobs();
        let handle = tokio::spawn(run_job(
            self.shared.clone(),
            identity.to_string(),
            generation,
            first_delay,
        ));
        if let Some(old) = jobs.insert(identity.to_string(), Job { generation, handle }) {
            old.handle.abort();
            tracing::debug!("Replaced timer for @{identity}");
        }
        tracing::info!("⏰ Timer registered for @{identity} (first in {first_delay:?})");
    }

    /// Stop the timer for `identity`. Returns whether one was running.
    pub fn cancel(&self, identity: &str) -> bool {
        match self.shared.jobs().remove(identity) {
            Some(job) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Run one firing for `identity` immediately, outside its timer.
    pub async fn fire(&self, identity: &str) -> Result<FireOutcome> {
        self.shared.fire(identity).await
    }

    /// Rebuild timers from durable state: one per APPROVED record, each first
    /// firing after the startup grace period.
    pub async fn restore(&self) -> Result<usize> {
        let approved = self
            .shared
            .store
            .list_by_status(SubmissionStatus::Approved)
            .await?;
        for record in &approved {
            self.register(&record.identity, self.startup_grace);
        }
        tracing::info!(
            "🔁 Restored {} rebroadcast timer(s), first firing in {:?}",
            approved.len(),
            self.startup_grace
        );
        Ok(approved.len())
    }

    pub fn is_scheduled(&self, identity: &str) -> bool {
        self.shared.jobs().contains_key(identity)
    }

    pub fn job_count(&self) -> usize {
        self.shared.jobs().len()
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut jobs = self.shared.jobs();
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use relaycast_core::error::RelayError;
    use relaycast_store::SqliteRecordStore;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingBroadcaster {
        published: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl RecordingBroadcaster {
        fn published(&self) -> Vec<String> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn publish(&self, text: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RelayError::Channel("channel unavailable".into()));
            }
            self.published.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    async fn approved(store: &SqliteRecordStore, identity: &str, text: &str) {
        store.upsert(identity, text, t0()).await.unwrap();
        assert!(
            store
                .update_if_current(identity, text, t0(), SubmissionStatus::Approved, "ok")
                .await
                .unwrap()
        );
    }

    fn setup() -> (
        Arc<SqliteRecordStore>,
        Arc<RecordingBroadcaster>,
        RedeliveryScheduler,
    ) {
        let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let scheduler =
            RedeliveryScheduler::new(store.clone(), broadcaster.clone(), &ScheduleConfig::default());
        (store, broadcaster, scheduler)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_every_interval() {
        let (store, broadcaster, scheduler) = setup();
        approved(&store, "alice", "hello").await;

        scheduler.register("alice", Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(broadcaster.published(), vec!["Message from @alice:\n\nhello"]);
        assert!(store.get("alice").await.unwrap().unwrap().last_sent.is_some());

        tokio::time::sleep(8 * HOUR).await;
        assert_eq!(broadcaster.published().len(), 2);
        assert!(scheduler.is_scheduled("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_replaces_existing_job() {
        let (store, broadcaster, scheduler) = setup();
        approved(&store, "alice", "hello").await;

        scheduler.register("alice", HOUR);
        scheduler.register("alice", HOUR);
        scheduler.register("alice", HOUR);
        assert_eq!(scheduler.job_count(), 1);

        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        assert_eq!(broadcaster.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_record_cancels_without_broadcast() {
        let (store, broadcaster, scheduler) = setup();
        store.upsert("bob", "spam", t0()).await.unwrap();
        store
            .update_if_current("bob", "spam", t0(), SubmissionStatus::Rejected, "no")
            .await
            .unwrap();

        scheduler.register("bob", Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(broadcaster.published().is_empty());
        assert_eq!(scheduler.job_count(), 0);
        assert!(store.get("bob").await.unwrap().unwrap().last_sent.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmission_cancels_at_next_firing() {
        let (store, broadcaster, scheduler) = setup();
        approved(&store, "alice", "v1").await;
        scheduler.register("alice", HOUR);

        store
            .upsert("alice", "v2", t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        assert!(broadcaster.published().is_empty());
        assert!(!scheduler.is_scheduled("alice"));
    }

    #[tokio::test]
    async fn test_missing_record_cancels() {
        let (_, _, scheduler) = setup();
        assert_eq!(scheduler.fire("ghost").await.unwrap(), FireOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_waits_for_grace_period() {
        let (store, broadcaster, scheduler) = setup();
        for name in ["a", "b", "c"] {
            approved(&store, name, "text").await;
        }
        store.upsert("pending", "text", t0()).await.unwrap();

        assert_eq!(scheduler.restore().await.unwrap(), 3);
        assert_eq!(scheduler.job_count(), 3);
        assert!(!scheduler.is_scheduled("pending"));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(broadcaster.published().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let mut published = broadcaster.published();
        published.sort();
        assert_eq!(
            published,
            vec![
                "Message from @a:\n\ntext",
                "Message from @b:\n\ntext",
                "Message from @c:\n\ntext",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_keeps_last_sent_and_timer() {
        let (store, broadcaster, scheduler) = setup();
        approved(&store, "alice", "hello").await;
        broadcaster.failing.store(true, Ordering::SeqCst);

        assert_eq!(
            scheduler.fire("alice").await.unwrap(),
            FireOutcome::PublishFailed
        );
        assert!(store.get("alice").await.unwrap().unwrap().last_sent.is_none());

        scheduler.register("alice", Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(scheduler.is_scheduled("alice"));

        broadcaster.failing.store(false, Ordering::SeqCst);
        tokio::time::sleep(8 * HOUR).await;
        assert_eq!(broadcaster.published().len(), 1);
        assert!(store.get("alice").await.unwrap().unwrap().last_sent.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_shutdown() {
        let (store, broadcaster, scheduler) = setup();
        approved(&store, "alice", "hello").await;
        approved(&store, "bob", "hello").await;
        scheduler.register("alice", HOUR);
        scheduler.register("bob", HOUR);

        assert!(scheduler.cancel("alice"));
        assert!(!scheduler.cancel("alice"));
        scheduler.shutdown();
        assert_eq!(scheduler.job_count(), 0);

        tokio::time::sleep(2 * HOUR).await;
        assert!(broadcaster.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_interval_is_clamped() {
        let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let config = ScheduleConfig {
            interval_hours: u64::MAX,
            ..ScheduleConfig::default()
        };
        let scheduler = RedeliveryScheduler::new(store.clone(), broadcaster.clone(), &config);
        assert_eq!(scheduler.interval(), MAX_INTERVAL_HOURS as u32 * HOUR);

        approved(&store, "alice", "hello").await;
        scheduler.register("alice", Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(broadcaster.published().len(), 1);
        assert!(scheduler.is_scheduled("alice"));
        scheduler.shutdown();
    }
}
