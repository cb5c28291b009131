//! Seams between Relaycast components.
//!
//! Every long-lived component receives its collaborators as trait objects,
//! so the worker and scheduler never reach for process-wide singletons.

pub mod channel;
pub mod provider;
pub mod queue;
pub mod store;

pub use channel::{Broadcaster, Notifier};
pub use provider::VerdictProvider;
pub use queue::IntakeQueue;
pub use store::RecordStore;
