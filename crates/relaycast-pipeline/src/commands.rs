//! Chat commands and reply texts.

use chrono::{DateTime, Utc};
use relaycast_core::config::RelayConfig;
use relaycast_core::error::Result;
use relaycast_core::types::{IncomingMessage, SubmissionRecord, SubmissionStatus};

use crate::context::AppContext;
use crate::intake::{IntakeService, SubmitOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    Status,
    /// Any other `/command`; ignored.
    Unknown(&'a str),
    Submission(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(content: &'a str) -> Self {
        let trimmed = content.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Submission(content);
        };
        // "/status@my_bot extra" → "status"
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "status" => Command::Status,
            _ => Command::Unknown(name),
        }
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%d.%m.%Y %H:%M:%S UTC").to_string()
}

pub fn start_text(first_name: &str, config: &RelayConfig) -> String {
    format!(
        "👋 Hi, {first_name}!\n\n\
         🤖 I post resumes to the channel.\n\n\
         📝 Send me the text of your resume with the hashtag {marker} and I will check it.\n\
         ✅ If it passes, it will be posted to the channel every {hours} hours.\n\n\
         📊 Check the state of your submission with /status\n\n\
         📋 Commands:\n\
         /start - Show this message\n\
         /status - Check your submission\n\
         /help - How to use the bot",
        marker = config.checks.marker_token,
        hours = config.schedule.interval_hours,
    )
}

pub fn help_text(config: &RelayConfig) -> String {
    let checks = &config.checks;
    format!(
        "📚 How to use the bot\n\n\
         1. Send your resume as a message with the hashtag {marker}\n\
         2. It is checked against the channel rules\n\
         3. Once approved it is posted to the channel\n\
         4. Approved resumes are reposted every {hours} hours\n\n\
         ❗ Requirements:\n\
         - at least {chars} characters and {words} words\n\
         - the hashtag {marker}\n\
         - at least {sections} of these sections: {section_names}\n\
         - no forbidden words or spam symbols\n\n\
         Sending a new message replaces your previous submission.\n\n\
         📊 Statuses:\n\
         ⏳ Pending - waiting for the check\n\
         ✅ Approved - posted to the channel on schedule\n\
         ❌ Rejected - did not pass the check\n\n\
         📋 Commands:\n\
         /start - Start\n\
         /status - Check your submission\n\
         /help - Show this message",
        marker = checks.marker_token,
        hours = config.schedule.interval_hours,
        chars = checks.min_intake_chars + 1,
        words = checks.min_words,
        sections = checks.min_sections,
        section_names = checks
            .sections
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// `/status` reply for `record`.
pub fn render_status(record: Option<&SubmissionRecord>, interval: std::time::Duration) -> String {
    let Some(record) = record else {
        return "❌ You have no submission yet. Send a message to have it checked.".into();
    };

    let mut out = format!("📊 Your submission:\n\n📝 {}\n\n", record.text);
    match record.status {
        SubmissionStatus::Pending => out.push_str("⏳ Status: pending\n"),
        SubmissionStatus::Approved => {
            out.push_str("✅ Status: approved\n");
            if let Some(sent) = record.last_sent {
                out.push_str(&format!("🕒 Last sent: {}\n", format_time(sent)));
                if let Ok(step) = chrono::Duration::from_std(interval) {
                    out.push_str(&format!("⏰ Next send: {}\n", format_time(sent + step)));
                }
            }
        }
        SubmissionStatus::Rejected => {
            out.push_str("❌ Status: rejected\n");
            if let Some(report) = record.report.as_deref().filter(|r| !r.is_empty()) {
                out.push_str(&format!("\n📋 Check results:\n{report}\n"));
            }
            out.push_str("\nPlease fix your submission and send it again.");
        }
    }
    out
}

fn submit_reply(outcome: &SubmitOutcome, config: &RelayConfig) -> String {
    match outcome {
        SubmitOutcome::TooShort { min_chars } => {
            format!("❌ The message is too short. Minimum length is {min_chars} characters.")
        }
        SubmitOutcome::Accepted { replaced } => {
            let lead = if *replaced {
                "🔄 Your previous submission was replaced with this one!\n\n"
            } else {
                ""
            };
            format!(
                "{lead}⏳ Your submission is queued for checking!\n\n\
                 You will be notified about the result.\n\
                 Once approved it will be posted to the channel every {} hours.",
                config.schedule.interval_hours
            )
        }
    }
}

/// Turns chat messages into replies.
pub struct MessageHandler {
    ctx: AppContext,
    intake: IntakeService,
}

impl MessageHandler {
    pub fn new(ctx: AppContext) -> Self {
        let intake = IntakeService::new(ctx.clone());
        Self { ctx, intake }
    }

    pub fn intake(&self) -> &IntakeService {
        &self.intake
    }

    /// Status reply for `identity`, as `/status` renders it.
    pub async fn status(&self, identity: &str) -> Result<String> {
        let record = self.ctx.store.get(identity).await?;
        Ok(render_status(record.as_ref(), self.ctx.scheduler.interval()))
    }

    /// Reply for `msg`, or `None` when the message is ignored.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<Option<String>> {
        let config = &self.ctx.config;
        let reply = match Command::parse(&msg.content) {
            Command::Start => start_text(msg.sender_name.as_deref().unwrap_or("there"), config),
            Command::Help => help_text(config),
            Command::Status => self.status(&msg.identity).await?,
            Command::Unknown(name) => {
                tracing::debug!("Ignoring unknown command /{name} from @{}", msg.identity);
                return Ok(None);
            }
            Command::Submission(text) => {
                let outcome = self
                    .intake
                    .submit(&msg.identity, Some(&msg.thread_id), text)
                    .await?;
                submit_reply(&outcome, config)
            }
        };
        Ok(Some(reply))
    }
}
