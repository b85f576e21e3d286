use anyhow::{Context, Result};
use regex::Regex;

use crate::platforms::ChatTransport;

/// Canonicalization used by the duplicate rule: token rewriting for display
/// (`clean`) and the normalized form used for equality testing (`normalize`).
pub struct Normalizer {
    channel_token: Regex,
    custom_emoji_token: Regex,
    strip: Regex,
    collapse: Regex,
}

impl Normalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            channel_token: Regex::new(r"<#(\d+)>").context("channel token pattern")?,
            custom_emoji_token: Regex::new(r"<a?:(\w+):\d+>").context("emoji token pattern")?,
            strip: Regex::new(r"[^\w ]+").context("strip pattern")?,
            collapse: Regex::new(r"\s+").context("collapse pattern")?,
        })
    }

    /// Rewrite channel-mention tokens to `#channel-name` and guild-custom-emoji
    /// tokens to `:name:` shorthand. Idempotent: the rewritten forms no longer
    /// match the token patterns.
    pub async fn clean(&self, text: &str, transport: &dyn ChatTransport) -> String {
        let mut cleaned = text.to_string();

        let channel_ids: Vec<String> = self
            .channel_token
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect();
        for channel_id in channel_ids {
            if let Some(name) = transport.channel_name(&channel_id).await {
                cleaned = cleaned.replace(&format!("<#{}>", channel_id), &format!("#{}", name));
            }
        }

        self.custom_emoji_token.replace_all(&cleaned, ":$1:").into_owned()
    }

    /// The canonical form used for duplicate detection: fold case, trim,
    /// strip everything but word characters and spaces, collapse whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let folded = text.to_lowercase();
        let stripped = self.strip.replace_all(folded.trim(), "");
        self.collapse.replace_all(&stripped, " ").trim().to_string()
    }

    /// The remote-store filter formula implementing `normalize` equality
    /// against the stored motto text, optionally ORed with an exact
    /// message-ID match.
    pub fn matching_formula(&self, cleaned: &str, message_id: Option<&str>) -> String {
        let candidate = cleaned.replace('\'', r"\'");
        let formula = format!(
            r"TRIM(REGEX_REPLACE(REGEX_REPLACE(LOWER(TRIM('{}')), '[^\w ]+', ''), '\s+', ' ')) = TRIM(REGEX_REPLACE(REGEX_REPLACE(LOWER(TRIM({{Motto}})), '[^\w ]+', ''), '\s+', ' '))",
            candidate
        );
        match message_id {
            Some(id) => format!("OR({}, '{}' = {{Message ID}})", formula, id),
            None => formula,
        }
    }
}
