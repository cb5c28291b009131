//! Outbound transport traits.

use async_trait::async_trait;

use crate::error::Result;

/// Direct messages to a single user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &str, text: &str) -> Result<()>;
}

/// The broadcast channel approved submissions are republished to.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;
}
