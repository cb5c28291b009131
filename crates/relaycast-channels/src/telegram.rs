//! Telegram Bot channel: long polling plus message sending via the Bot API.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use relaycast_core::config::TelegramSection;
use relaycast_core::error::{RelayError, Result};
use relaycast_core::traits::{Broadcaster, Notifier};
use relaycast_core::types::IncomingMessage;
use serde::{Deserialize, Serialize};

/// Seconds Telegram holds a `getUpdates` request open.
const LONG_POLL_SECS: u64 = 30;

/// Telegram Bot channel. Cheap to clone; clones share the HTTP pool.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramSection,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramSection) -> Result<Self> {
        // Long polling keeps the request open, so the client timeout must exceed it.
        let timeout = Duration::from_secs(config.request_timeout_secs.max(LONG_POLL_SECS + 5));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Channel(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Get updates after `offset` using long polling.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid Telegram response: {e}")))?;
        body.into_result("getUpdates")
    }

    /// Send a plain-text message. `chat_id` is a numeric id or `@channelname`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let chat: serde_json::Value = match chat_id.parse::<i64>() {
            Ok(id) => id.into(),
            Err(_) => chat_id.into(),
        };
        let body = serde_json::json!({
            "chat_id": chat,
            "text": text,
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid send response: {e}")))?;
        result.into_result("sendMessage").map(|_| ())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid getMe response: {e}")))?;
        body.into_result("getMe")
    }

    /// Start the polling loop; returns a stream of incoming messages.
    /// The loop stops once the stream is dropped.
    pub fn start_polling(&self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");
            let mut offset = 0i64;

            loop {
                match channel.get_updates(offset).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(msg) = update.to_incoming() else {
                                continue;
                            };
                            if tx.send(msg).is_err() {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }

                if tx.is_closed() {
                    tracing::info!("Telegram polling stopped (receiver dropped)");
                    return;
                }
                tokio::time::sleep(Duration::from_secs(channel.config.poll_interval)).await;
            }
        });

        TelegramPollingStream { rx }
    }
}

#[async_trait]
impl Notifier for TelegramChannel {
    async fn notify(&self, target: &str, text: &str) -> Result<()> {
        self.send_message(target, text).await
    }
}

#[async_trait]
impl Broadcaster for TelegramChannel {
    async fn publish(&self, text: &str) -> Result<()> {
        if self.config.channel_id.is_empty() {
            return Err(RelayError::Channel("No broadcast channel configured".into()));
        }
        self.send_message(&self.config.channel_id, text).await
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if !self.ok {
            return Err(RelayError::Channel(format!(
                "Telegram {method} error: {}",
                self.description.unwrap_or_default()
            )));
        }
        self.result
            .ok_or_else(|| RelayError::Channel(format!("Telegram {method} returned no result")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUser {
    /// Username when set, numeric id otherwise.
    pub fn identity(&self) -> String {
        self.username
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.id.to_string())
    }
}

impl TelegramUpdate {
    /// Convert to a Relaycast IncomingMessage. Only private text messages
    /// from humans count as submissions or commands.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot || msg.chat.chat_type != "private" {
            return None;
        }

        Some(IncomingMessage {
            channel: "telegram".into(),
            thread_id: msg.chat.id.to_string(),
            identity: from.identity(),
            sender_name: Some(format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            )),
            content: text.clone(),
            timestamp: chrono::DateTime::from_timestamp(msg.date, 0)
                .unwrap_or_else(chrono::Utc::now),
        })
    }
}
