//! Remote classifier client.
//!
//! Two wire formats share one struct:
//! - `verdict`: POST `{"content": text}` → `{"approved": bool, "report": str}`
//! - `chat`: OpenAI-compatible `/chat/completions`; approval is read from the
//!   answer by phrase matching.
//!
//! Every failure (transport, timeout, non-2xx, unparsable body) is returned as
//! `RelayError::Provider` so the fallback chain can take over.

use async_trait::async_trait;
use relaycast_core::config::{ClassifierConfig, ClassifierProtocol};
use relaycast_core::error::{RelayError, Result};
use relaycast_core::traits::VerdictProvider;
use relaycast_core::types::Verdict;
use serde::Deserialize;
use serde_json::{Value, json};

const SYSTEM_PROMPT: &str = "You review job-seeker resumes posted to a public channel. \
Check spelling and grammar, structure and content, and that the text really is a resume.";

pub struct RemoteClassifier {
    endpoint: String,
    api_key: String,
    protocol: ClassifierProtocol,
    model: String,
    temperature: f32,
    approval_phrases: Vec<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    approved: bool,
    #[serde(default)]
    report: String,
}

impl RemoteClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RelayError::Provider(format!("HTTP client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            protocol: config.protocol,
            model: config.model.clone(),
            temperature: config.temperature,
            approval_phrases: config
                .approval_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            client,
        })
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn request_body(&self, text: &str) -> Value {
        match self.protocol {
            ClassifierProtocol::Verdict => json!({ "content": text }),
            ClassifierProtocol::Chat => json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": chat_prompt(text) },
                ],
            }),
        }
    }

    fn parse_body(&self, body: &Value) -> Result<Verdict> {
        match self.protocol {
            ClassifierProtocol::Verdict => parse_verdict_body(body),
            ClassifierProtocol::Chat => parse_chat_body(body, &self.approval_phrases),
        }
    }
}

fn chat_prompt(text: &str) -> String {
    format!(
        "Review the following resume:\n\
         1. Spelling and grammar\n\
         2. Structure and content\n\
         3. Whether it is really a resume\n\n\
         Resume:\n{text}\n\n\
         Give a short report and finish with a line \"Approved: yes\" or \"Approved: no\". \
         If not approved, explain what to fix."
    )
}

/// Decode a `verdict`-protocol response.
pub fn parse_verdict_body(body: &Value) -> Result<Verdict> {
    let parsed: VerdictResponse = serde_json::from_value(body.clone())
        .map_err(|e| RelayError::Provider(format!("Malformed verdict response: {e}")))?;
    Ok(Verdict {
        approved: parsed.approved,
        report: parsed.report,
    })
}

/// Decode a chat completion and look for an approval phrase in the answer.
pub fn parse_chat_body(body: &Value, approval_phrases: &[String]) -> Result<Verdict> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| RelayError::Provider("Chat response has no content".into()))?;
    let lower = content.to_lowercase();
    let approved = approval_phrases.iter().any(|p| lower.contains(p.as_str()));
    Ok(Verdict {
        approved,
        report: format!("📋 Review report:\n\n{content}"),
    })
}

#[async_trait]
impl VerdictProvider for RemoteClassifier {
    fn name(&self) -> &str {
        "remote"
    }

    async fn check(&self, text: &str) -> Result<Verdict> {
        let req = self.client.post(&self.endpoint).json(&self.request_body(text));
        let response = self
            .apply_auth(req)
            .send()
            .await
            .map_err(|e| RelayError::Provider(format!("Classifier request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Provider(format!(
                "Classifier returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::Provider(format!("Classifier body is not JSON: {e}")))?;
        self.parse_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        ClassifierConfig::default().approval_phrases
    }

    #[test]
    fn test_parse_verdict_body() {
        let verdict =
            parse_verdict_body(&json!({"approved": true, "report": "looks fine"})).unwrap();
        assert_eq!(verdict, Verdict::approve("looks fine"));

        let verdict = parse_verdict_body(&json!({"approved": false})).unwrap();
        assert!(!verdict.approved);
        assert!(verdict.report.is_empty());
    }

    #[test]
    fn test_parse_verdict_body_malformed() {
        let err = parse_verdict_body(&json!({"result": "ok"})).unwrap_err();
        assert!(matches!(err, RelayError::Provider(_)));
        assert!(parse_verdict_body(&json!({"approved": "yes"})).is_err());
    }

    #[test]
    fn test_parse_chat_body_approved() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "Well structured.\nApproved: Yes"}}]
        });
        let verdict = parse_chat_body(&body, &phrases()).unwrap();
        assert!(verdict.approved);
        assert!(verdict.report.contains("Well structured."));
    }

    #[test]
    fn test_parse_chat_body_rejected() {
        let body = json!({
            "choices": [{"message": {"content": "Missing contacts.\nApproved: no"}}]
        });
        assert!(!parse_chat_body(&body, &phrases()).unwrap().approved);
    }

    #[test]
    fn test_parse_chat_body_without_content() {
        assert!(parse_chat_body(&json!({"choices": []}), &phrases()).is_err());
        assert!(parse_chat_body(&json!({"error": "rate limited"}), &phrases()).is_err());
    }

    #[test]
    fn test_request_body_per_protocol() {
        let mut config = ClassifierConfig {
            endpoint: "https://classifier.local/check/".into(),
            ..Default::default()
        };
        let remote = RemoteClassifier::from_config(&config).unwrap();
        assert_eq!(remote.endpoint, "https://classifier.local/check");
        assert_eq!(remote.request_body("hi"), json!({"content": "hi"}));

        config.protocol = ClassifierProtocol::Chat;
        let remote = RemoteClassifier::from_config(&config).unwrap();
        let body = remote.request_body("my resume");
        assert_eq!(body["model"], "deepseek-chat");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("my resume"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let config = ClassifierConfig {
            endpoint: "http://127.0.0.1:9/check".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        let remote = RemoteClassifier::from_config(&config).unwrap();
        let err = remote.check("text").await.unwrap_err();
        assert!(matches!(err, RelayError::Provider(_)));
    }
}
