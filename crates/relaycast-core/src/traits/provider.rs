//! Verdict provider trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Verdict;

/// Anything that can decide whether a submission text is acceptable.
#[async_trait]
pub trait VerdictProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, text: &str) -> Result<Verdict>;
}
