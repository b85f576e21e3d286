use anyhow::{Context, Result};
use regex::Regex;

use crate::config::RuleConfig;

/// The accept/reject gate for candidate motto text.
pub struct MottoRules {
    min_chars: usize,
    max_chars: usize,
    min_words: usize,
    matching: Vec<Regex>,
    excluding: Vec<Regex>,
    triggers: Vec<Regex>,
}

impl MottoRules {
    /// Compile the configured rule patterns. `triggers` are the new-motto
    /// trigger matchers; a trigger phrase is never itself a valid motto.
    pub fn compile(rules: &RuleConfig, triggers: &[Regex]) -> Result<Self> {
        let compile = |sources: &[String]| -> Result<Vec<Regex>> {
            sources
                .iter()
                .map(|s| {
                    Regex::new(&format!("(?i){}", s))
                        .with_context(|| format!("failed to compile rule pattern {:?}", s))
                })
                .collect()
        };
        Ok(Self {
            min_chars: rules.min_chars,
            max_chars: rules.max_chars,
            min_words: rules.min_words,
            matching: compile(&rules.matching)?,
            excluding: compile(&rules.excluding)?,
            triggers: triggers.to_vec(),
        })
    }

    /// Whether the text is acceptable as a motto. Bounds are inclusive.
    pub fn is_valid(&self, text: &str) -> bool {
        let length = text.chars().count();
        if length < self.min_chars || length > self.max_chars {
            return false;
        }
        if text.split_whitespace().count() < self.min_words {
            return false;
        }
        if !self.matching.iter().all(|r| r.is_match(text)) {
            return false;
        }
        if self.excluding.iter().any(|r| r.is_match(text)) {
            return false;
        }
        if self.triggers.iter().any(|r| r.is_match(text)) {
            return false;
        }
        true
    }
}
