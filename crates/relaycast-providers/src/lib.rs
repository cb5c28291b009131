//! # Relaycast Providers
//!
//! Verdict providers. The remote classifier is always tried first; the local
//! heuristic answers whenever the remote is missing, unhealthy, slow or
//! returns something unusable. `FallbackProvider` is the single entry point
//! the worker talks to.

pub mod fallback;
pub mod filter;
pub mod heuristic;
pub mod remote;

pub use fallback::FallbackProvider;
pub use filter::ContentFilter;
pub use heuristic::HeuristicChecker;
pub use remote::RemoteClassifier;

use relaycast_core::config::RelayConfig;
use relaycast_core::error::Result;

/// Build the provider chain from configuration.
pub fn create_provider(config: &RelayConfig) -> Result<FallbackProvider> {
    let heuristic = HeuristicChecker::from_config(&config.checks);
    if !config.classifier.is_configured() {
        tracing::info!("🧮 No remote classifier configured, using local heuristic only");
        return Ok(FallbackProvider::heuristic_only(heuristic));
    }
    let remote = RemoteClassifier::from_config(&config.classifier)?;
    tracing::info!(
        "🌐 Remote classifier: {} ({:?})",
        config.classifier.endpoint,
        config.classifier.protocol
    );
    Ok(FallbackProvider::new(Box::new(remote), heuristic, &config.classifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycast_core::traits::VerdictProvider;

    #[test]
    fn test_create_provider_without_remote() {
        let provider = create_provider(&RelayConfig::default()).unwrap();
        assert_eq!(provider.name(), "heuristic");
    }

    #[test]
    fn test_create_provider_with_remote() {
        let mut config = RelayConfig::default();
        config.classifier.endpoint = "https://classifier.local/check".into();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "remote");
    }
}
