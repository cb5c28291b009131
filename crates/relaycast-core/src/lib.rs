//! # Relaycast Core
//!
//! Shared vocabulary for every Relaycast crate: the submission record and its
//! status machine, the seams between components (store, queue, verdict
//! provider, transport) and the configuration tree.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use types::{IncomingMessage, IntakeMessage, SubmissionRecord, SubmissionStatus, Verdict};
