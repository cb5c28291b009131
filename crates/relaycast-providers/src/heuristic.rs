//! Deterministic local checker.
//!
//! Three checks, all required:
//! 1. the marker token is present (case-insensitive)
//! 2. at least `min_words` whitespace-separated words
//! 3. keyword hits from at least `min_sections` topical sections

use async_trait::async_trait;
use relaycast_core::config::{CheckConfig, SectionRule};
use relaycast_core::error::Result;
use relaycast_core::traits::VerdictProvider;
use relaycast_core::types::Verdict;

#[derive(Debug, Clone)]
pub struct HeuristicChecker {
    marker: String,
    min_words: usize,
    min_sections: usize,
    sections: Vec<SectionRule>,
}

impl HeuristicChecker {
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            marker: config.marker_token.clone(),
            min_words: config.min_words,
            min_sections: config.min_sections,
            sections: config.sections.clone(),
        }
    }

    /// Names of the sections with at least one keyword in `text`.
    pub fn sections_found(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.sections
            .iter()
            .filter(|s| s.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn evaluate(&self, text: &str) -> Verdict {
        let lower = text.to_lowercase();
        let words = text.split_whitespace().count();
        let found = self.sections_found(text);
        let mut problems = Vec::new();

        if !self.marker.is_empty() && !lower.contains(&self.marker.to_lowercase()) {
            problems.push(format!("missing required marker {}", self.marker));
        }
        if words < self.min_words {
            problems.push(format!(
                "too short: {words} words, at least {} required",
                self.min_words
            ));
        }
        if found.len() < self.min_sections {
            let missing: Vec<&str> = self
                .sections
                .iter()
                .map(|s| s.name.as_str())
                .filter(|name| !found.contains(name))
                .collect();
            problems.push(format!(
                "only {} of {} required sections found; missing: {}",
                found.len(),
                self.min_sections,
                missing.join(", ")
            ));
        }

        if problems.is_empty() {
            Verdict::approve(format!(
                "✅ Local check passed: {words} words, sections found: {}.",
                found.join(", ")
            ))
        } else {
            let lines: Vec<String> = problems.iter().map(|p| format!("- {p}")).collect();
            Verdict::reject(format!("❌ Local check failed:\n{}", lines.join("\n")))
        }
    }
}

#[async_trait]
impl VerdictProvider for HeuristicChecker {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn check(&self, text: &str) -> Result<Verdict> {
        Ok(self.evaluate(text))
    }
}
