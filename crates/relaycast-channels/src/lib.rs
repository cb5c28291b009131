//! # Relaycast Channels
//! Chat transport implementations.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramPollingStream};
