//! Content pre-filter: forbidden words, spam symbols and the required marker.
//! Runs before any provider; a hit is a final rejection whichever provider
//! would have answered.

use relaycast_core::config::CheckConfig;
use relaycast_core::types::Verdict;

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    forbidden_words: Vec<String>,
    spam_symbols: Vec<String>,
    marker: String,
}

impl ContentFilter {
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            forbidden_words: config.forbidden_words.clone(),
            spam_symbols: config.spam_symbols.clone(),
            marker: config.marker_token.clone(),
        }
    }

    /// `Some(rejection)` when the text trips a rule.
    pub fn screen(&self, text: &str) -> Option<Verdict> {
        let lower = text.to_lowercase();
        if let Some(word) = self
            .forbidden_words
            .iter()
            .find(|w| lower.contains(&w.to_lowercase()))
        {
            return Some(Verdict::reject(format!(
                "❌ The message contains a forbidden word: {word}"
            )));
        }
        if let Some(symbol) = self.spam_symbols.iter().find(|s| text.contains(s.as_str())) {
            return Some(Verdict::reject(format!(
                "❌ The message contains spam symbols: {symbol}"
            )));
        }
        if !self.marker.is_empty() && !lower.contains(&self.marker.to_lowercase()) {
            return Some(Verdict::reject(format!(
                "❌ The message is missing required marker {}. Add it and send again.",
                self.marker
            )));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_word() {
        let filter = ContentFilter::from_config(&CheckConfig::default());
        let verdict = filter.screen("#resume Best CASINO bonuses").unwrap();
        assert!(!verdict.approved);
        assert!(verdict.report.contains("casino"));
    }

    #[test]
    fn test_spam_symbols() {
        let filter = ContentFilter::from_config(&CheckConfig::default());
        let verdict = filter.screen("#resume hire me now!!!").unwrap();
        assert!(verdict.report.contains("!!!"));
    }

    #[test]
    fn test_missing_marker() {
        let filter = ContentFilter::from_config(&CheckConfig::default());
        let verdict = filter.screen("Rust developer, five years").unwrap();
        assert!(!verdict.approved);
        assert!(verdict.report.contains("missing required marker #resume"));
        assert!(filter.screen("#RESUME Rust developer").is_none());
    }

    #[test]
    fn test_empty_marker_disables_check() {
        let config = CheckConfig {
            marker_token: String::new(),
            ..Default::default()
        };
        assert!(ContentFilter::from_config(&config).screen("plain text").is_none());
    }

    #[test]
    fn test_clean_text_passes() {
        let filter = ContentFilter::from_config(&CheckConfig::default());
        assert!(filter.screen("#resume Rust developer, five years").is_none());
    }
}
