//! Shared handles passed to every pipeline component at construction.

use std::sync::Arc;

use relaycast_core::config::RelayConfig;
use relaycast_core::traits::{Broadcaster, IntakeQueue, Notifier, RecordStore, VerdictProvider};
use relaycast_scheduler::RedeliveryScheduler;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<RelayConfig>,
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<dyn IntakeQueue>,
    pub provider: Arc<dyn VerdictProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub scheduler: RedeliveryScheduler,
}

impl AppContext {
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn IntakeQueue>,
        provider: Arc<dyn VerdictProvider>,
        notifier: Arc<dyn Notifier>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let scheduler =
            RedeliveryScheduler::new(store.clone(), broadcaster.clone(), &config.schedule);
        Self {
            config: Arc::new(config),
            store,
            queue,
            provider,
            notifier,
            broadcaster,
            scheduler,
        }
    }
}
