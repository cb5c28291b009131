//! Relaycast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub checks: CheckConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl RelayConfig {
    /// Load config from the default path (~/.relaycast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = non_empty("CHANNEL_ID") {
            self.telegram.channel_id = v;
        }
        if let Some(v) = non_empty("CLASSIFIER_URL") {
            self.classifier.endpoint = v;
        }
        if let Some(v) = non_empty("CLASSIFIER_API_KEY") {
            self.classifier.api_key = v;
        }
        if let Some(v) = non_empty("CLASSIFIER_MODEL") {
            self.classifier.model = v;
        }
        if let Some(v) = non_empty("DATABASE_PATH") {
            self.storage.database_path = v;
        }
    }

    /// Check the settings the bot cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            return Err(RelayError::Config("telegram.bot_token is not set".into()));
        }
        if self.telegram.channel_id.is_empty() {
            return Err(RelayError::Config("telegram.channel_id is not set".into()));
        }
        if self.schedule.interval_hours == 0 {
            return Err(RelayError::Config("schedule.interval_hours must be positive".into()));
        }
        if self.schedule.interval_hours > MAX_INTERVAL_HOURS {
            return Err(RelayError::Config(format!(
                "schedule.interval_hours must be at most {MAX_INTERVAL_HOURS}"
            )));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Relaycast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relaycast")
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn bool_true() -> bool { true }

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_token: String,
    /// Broadcast target: numeric chat id or `@channelname`.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 { 1 }
fn default_request_timeout() -> u64 { 40 }

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: String::new(),
            poll_interval: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// SQLite locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_queue_path")]
    pub queue_path: String,
    /// How long a store operation waits on a locked database.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String { "~/.relaycast/submissions.db".into() }
fn default_queue_path() -> String { "~/.relaycast/queue.db".into() }
fn default_busy_timeout() -> u64 { 5000 }

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            queue_path: default_queue_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Intake queue and consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Concurrent verification workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// How long a claimed message stays invisible before redelivery.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// Idle wait between claim attempts when nothing was enqueued locally.
    #[serde(default = "default_queue_poll")]
    pub poll_interval_ms: u64,
    /// Delay before a released message becomes visible again.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_workers() -> usize { 1 }
fn default_visibility_timeout() -> u64 { 300 }
fn default_queue_poll() -> u64 { 1000 }
fn default_retry_delay() -> u64 { 5 }

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            visibility_timeout_secs: default_visibility_timeout(),
            poll_interval_ms: default_queue_poll(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Wire format spoken by the remote classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierProtocol {
    /// POST `{content}` → `{approved, report}`.
    Verdict,
    /// OpenAI-compatible `/chat/completions`; the answer is scanned for an
    /// approval phrase.
    Chat,
}

/// Remote classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_protocol")]
    pub protocol: ClassifierProtocol,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_approval_phrases")]
    pub approval_phrases: Vec<String>,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    /// Consecutive failures before the remote is skipped.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_protocol() -> ClassifierProtocol { ClassifierProtocol::Verdict }
fn default_model() -> String { "deepseek-chat".into() }
fn default_temperature() -> f32 { 0.7 }
fn default_approval_phrases() -> Vec<String> {
    vec!["approved: yes", "submission approved"]
        .into_iter().map(String::from).collect()
}
fn default_classifier_timeout() -> u64 { 30 }
fn default_max_failures() -> u32 { 3 }
fn default_cooldown() -> u64 { 60 }

impl ClassifierConfig {
    /// The remote is only attempted when switched on and pointed somewhere.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.endpoint.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            api_key: String::new(),
            protocol: default_protocol(),
            model: default_model(),
            temperature: default_temperature(),
            approval_phrases: default_approval_phrases(),
            timeout_secs: default_classifier_timeout(),
            max_failures: default_max_failures(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// A topical section detected by keyword membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl SectionRule {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Local content checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Token every submission must carry.
    #[serde(default = "default_marker")]
    pub marker_token: String,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_min_sections")]
    pub min_sections: usize,
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionRule>,
    /// Intake refuses texts of this many characters or fewer.
    #[serde(default = "default_min_intake_chars")]
    pub min_intake_chars: usize,
    #[serde(default = "default_forbidden_words")]
    pub forbidden_words: Vec<String>,
    #[serde(default = "default_spam_symbols")]
    pub spam_symbols: Vec<String>,
}

fn default_marker() -> String { "#resume".into() }
fn default_min_words() -> usize { 20 }
fn default_min_sections() -> usize { 2 }
fn default_min_intake_chars() -> usize { 5 }
fn default_sections() -> Vec<SectionRule> {
    vec![
        SectionRule::new(
            "experience",
            &["experience", "worked", "work history", "employment", "position", "job"],
        ),
        SectionRule::new(
            "education",
            &["education", "university", "degree", "college", "graduated", "courses"],
        ),
        SectionRule::new(
            "skills",
            &["skills", "proficient", "technologies", "tools", "languages", "stack"],
        ),
        SectionRule::new(
            "contact",
            &["contact", "email", "phone", "telegram", "linkedin"],
        ),
    ]
}
fn default_forbidden_words() -> Vec<String> {
    vec!["spam", "advertising", "casino", "betting", "bookmaker"]
        .into_iter().map(String::from).collect()
}
fn default_spam_symbols() -> Vec<String> {
    vec!["$$$", "!!!", "???", "###"]
        .into_iter().map(String::from).collect()
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            marker_token: default_marker(),
            min_words: default_min_words(),
            min_sections: default_min_sections(),
            sections: default_sections(),
            min_intake_chars: default_min_intake_chars(),
            forbidden_words: default_forbidden_words(),
            spam_symbols: default_spam_symbols(),
        }
    }
}

/// Rebroadcast timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Delay before the first firing of timers rebuilt at startup.
    #[serde(default = "default_startup_grace")]
    pub startup_grace_secs: u64,
    /// Delay before the first firing after an approval.
    #[serde(default)]
    pub approval_delay_secs: u64,
    /// Extra publish attempts per firing.
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
}

/// One year; longer intervals are treated as a configuration mistake.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;

fn default_interval_hours() -> u64 { 8 }
fn default_startup_grace() -> u64 { 60 }
fn default_publish_retries() -> u32 { 1 }

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn approval_delay(&self) -> Duration {
        Duration::from_secs(self.approval_delay_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            startup_grace_secs: default_startup_grace(),
            approval_delay_secs: 0,
            publish_retries: default_publish_retries(),
        }
    }
}
