//! Intake queue trait: durable, at-least-once.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Delivery, IntakeMessage};

/// Work queue between intake and verification.
///
/// A received delivery stays invisible to other consumers until it is
/// acked, released, or its claim expires. Expired claims are delivered again.
#[async_trait]
pub trait IntakeQueue: Send + Sync {
    async fn enqueue(&self, message: &IntakeMessage) -> Result<i64>;

    /// Wait until a message can be claimed.
    async fn receive(&self) -> Result<Delivery>;

    /// Processing finished; remove the message.
    async fn ack(&self, id: i64) -> Result<()>;

    /// Processing failed; make the message visible again after `delay`.
    async fn release(&self, id: i64, delay: Duration) -> Result<()>;

    /// Messages not yet acked.
    async fn depth(&self) -> Result<usize>;
}
