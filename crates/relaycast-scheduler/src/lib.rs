//! # Relaycast Scheduler
//!
//! One recurring tokio timer per approved identity.
//!
//! ```text
//! register(identity, first_delay)
//!   └── job task: sleep first_delay, then every interval
//!         └── fire(identity)
//!               ├── record gone / not approved → cancel, job exits
//!               └── approved → publish to channel → mark_sent
//! ```
//!
//! Jobs hold no state besides their identity; every firing re-reads the
//! record, so a timer left over from an older approval cannot broadcast
//! anything but the current approved text.

pub mod engine;

pub use engine::{FireOutcome, RedeliveryScheduler, broadcast_text};
