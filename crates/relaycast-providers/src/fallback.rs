//! Provider fallback: remote classifier first, local heuristic on any failure.
//!
//! The remote slot keeps a consecutive-failure counter. Once it reaches
//! `max_failures` the remote is skipped until `cooldown_secs` have passed
//! since the last failure, so an outage does not cost a timeout per message.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relaycast_core::config::ClassifierConfig;
use relaycast_core::error::{RelayError, Result};
use relaycast_core::traits::VerdictProvider;
use relaycast_core::types::Verdict;

use crate::heuristic::HeuristicChecker;

/// Per-provider health tracking.
struct RemoteSlot {
    provider: Box<dyn VerdictProvider>,
    failures: AtomicU32,
    /// Unix secs of the last failure, 0 = never failed.
    last_failure: AtomicU64,
    max_failures: u32,
    cooldown_secs: u64,
    timeout: Duration,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl RemoteSlot {
    fn is_healthy(&self) -> bool {
        let fails = self.failures.load(Ordering::Relaxed);
        if fails < self.max_failures {
            return true;
        }
        let last = self.last_failure.load(Ordering::Relaxed);
        unix_now().saturating_sub(last) > self.cooldown_secs
    }

    fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(unix_now(), Ordering::Relaxed);
    }

    async fn check(&self, text: &str) -> Result<Verdict> {
        match tokio::time::timeout(self.timeout, self.provider.check(text)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Provider(format!(
                "{} timed out after {:?}",
                self.provider.name(),
                self.timeout
            ))),
        }
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Remote,
    Heuristic,
}

pub struct FallbackProvider {
    remote: Option<RemoteSlot>,
    heuristic: HeuristicChecker,
}

impl FallbackProvider {
    pub fn new(
        remote: Box<dyn VerdictProvider>,
        heuristic: HeuristicChecker,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            remote: Some(RemoteSlot {
                provider: remote,
                failures: AtomicU32::new(0),
                last_failure: AtomicU64::new(0),
                max_failures: config.max_failures.max(1),
                cooldown_secs: config.cooldown_secs,
                timeout: config.timeout(),
            }),
            heuristic,
        }
    }

    pub fn heuristic_only(heuristic: HeuristicChecker) -> Self {
        Self {
            remote: None,
            heuristic,
        }
    }

    /// Check `text`, reporting which provider answered. Never fails.
    pub async fn check_with_source(&self, text: &str) -> (Verdict, VerdictSource) {
        if let Some(slot) = &self.remote {
            if slot.is_healthy() {
                match slot.check(text).await {
                    Ok(verdict) => {
                        slot.record_success();
                        return (verdict, VerdictSource::Remote);
                    }
                    Err(e) => {
                        slot.record_failure();
                        tracing::warn!(
                            "⚠️ Classifier {} failed (attempt {}): {e}, using local heuristic",
                            slot.provider.name(),
                            slot.failures.load(Ordering::Relaxed)
                        );
                    }
                }
            } else {
                tracing::debug!(
                    "⏭️ Skipping unhealthy classifier {} ({} failures)",
                    slot.provider.name(),
                    slot.failures.load(Ordering::Relaxed)
                );
            }
        }
        (self.heuristic.evaluate(text), VerdictSource::Heuristic)
    }
}

#[async_trait]
impl VerdictProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.remote
            .as_ref()
            .map(|s| s.provider.name())
            .unwrap_or("heuristic")
    }

    async fn check(&self, text: &str) -> Result<Verdict> {
        Ok(self.check_with_source(text).await.0)
    }
}
