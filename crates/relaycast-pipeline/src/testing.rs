//! In-memory fixtures shared by the pipeline tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relaycast_core::config::RelayConfig;
use relaycast_core::error::Result;
use relaycast_core::traits::{Broadcaster, Notifier, VerdictProvider};
use relaycast_providers::{FallbackProvider, HeuristicChecker};
use relaycast_store::{SqliteQueue, SqliteRecordStore};

use crate::context::AppContext;

/// Collects every outbound message instead of sending it.
#[derive(Default)]
pub struct Outbox {
    pub notes: Mutex<Vec<(String, String)>>,
    pub posts: Mutex<Vec<String>>,
}

impl Outbox {
    pub fn notes(&self) -> Vec<(String, String)> {
        self.notes.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn notify(&self, target: &str, text: &str) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for Outbox {
    async fn publish(&self, text: &str) -> Result<()> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub const GOOD: &str = "#resume Backend developer with five years of experience building \
    payment systems in Rust and Go. Skills: PostgreSQL, Kafka, Kubernetes, tokio. \
    Looking for a remote role in a product team.";

pub struct Fixture {
    pub ctx: AppContext,
    pub outbox: Arc<Outbox>,
}

/// Context over in-memory SQLite with the heuristic as the only provider.
pub fn fixture() -> Fixture {
    let heuristic = HeuristicChecker::from_config(&RelayConfig::default().checks);
    fixture_with(Arc::new(FallbackProvider::heuristic_only(heuristic)))
}

pub fn fixture_with(provider: Arc<dyn VerdictProvider>) -> Fixture {
    let outbox = Arc::new(Outbox::default());
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let queue = Arc::new(
        SqliteQueue::open_in_memory(Duration::from_secs(300), Duration::from_millis(100)).unwrap(),
    );
    let ctx = AppContext::new(
        RelayConfig::default(),
        store,
        queue,
        provider,
        outbox.clone(),
        outbox.clone(),
    );
    Fixture { ctx, outbox }
}
