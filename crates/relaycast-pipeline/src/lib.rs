//! # Relaycast Pipeline
//!
//! Wires the components into the submission flow:
//!
//! ```text
//! chat message ─▶ MessageHandler ─┬─ /start /help /status → reply
//!                                 └─ text → IntakeService: upsert + enqueue
//! IntakeQueue ─▶ VerificationWorker × N
//!                  ├── pre-filter → provider (remote, heuristic fallback)
//!                  ├── update_if_current (staleness fence)
//!                  └── notify user; approved → RedeliveryScheduler.register
//! ```

pub mod commands;
pub mod context;
pub mod intake;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::{Command, MessageHandler};
pub use context::AppContext;
pub use intake::{IntakeService, SubmitOutcome};
pub use worker::{Outcome, VerificationWorker, spawn_workers};
