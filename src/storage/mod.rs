use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use regex::Regex;
use thiserror::Error;

use crate::types::{Member, Motto, UserRef};

pub mod airtable;

/// Error raised when the remote tabular store rejects an operation.
#[derive(Debug, Error)]
#[error("remote store returned {status} for {url}: {kind}: {message}")]
pub struct AirtableError {
    pub status: u16,
    pub url: String,
    pub kind: String,
    pub message: String,
}

/// Optional filter for random-motto requests. A user-supplied partial is
/// tried as a case-insensitive regex; if it fails to compile, matching
/// degrades to plain substring search.
#[derive(Debug, Clone)]
pub struct RandomFilter {
    raw: String,
    regex: Option<Regex>,
}

impl RandomFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let regex = match Regex::new(&format!("(?i){}", raw)) {
            Ok(regex) => Some(regex),
            Err(err) => {
                debug!("Filter {:?} is not a regex, falling back to substring: {}", raw, err);
                None
            }
        };
        Some(Self { raw: raw.to_string(), regex })
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(text),
            None => text.to_lowercase().contains(&self.raw.to_lowercase()),
        }
    }
}

/// The interface the core requires from the remote tabular store.
#[async_trait]
pub trait MottoStorage: Send + Sync {
    /// Persist a new motto record.
    async fn insert_motto(&self, motto: &Motto) -> Result<()>;

    /// Write the final motto text and the author-approval flag.
    async fn update_motto_text(
        &self,
        primary_key: &str,
        text: &str,
        approved_by_author: bool,
    ) -> Result<()>;

    /// Fetch a motto by its originating message ID.
    async fn get_motto(&self, message_id: &str) -> Result<Option<Motto>>;

    /// Whether any stored motto matches the cleaned candidate text under the
    /// normalized-equality rule; when `message_id` is given, a record whose
    /// message ID equals it exactly also counts as a match.
    async fn has_matching_motto(&self, cleaned: &str, message_id: Option<&str>) -> Result<bool>;

    /// One random motto from the approved view, with its author resolved.
    async fn get_random_motto(&self, filter: Option<&RandomFilter>)
        -> Result<Option<(Motto, Member)>>;

    /// Batch-delete motto records by primary key.
    async fn delete_mottos(&self, primary_keys: &[String]) -> Result<()>;

    /// Fetch the member for a platform user, creating the record on first
    /// sight.
    async fn get_or_add_member(&self, user: &UserRef) -> Result<Member>;

    async fn get_member_by_key(&self, primary_key: &str) -> Result<Option<Member>>;

    async fn get_member_by_user_id(&self, user_id: &str) -> Result<Option<Member>>;

    /// Erase all data owned by a platform user: their mottos, then their
    /// member record.
    async fn remove_all_data(&self, user_id: &str) -> Result<()>;

    /// Toggle the leaderboard nickname preference; turning it off clears any
    /// stored nickname.
    async fn set_nick_option(&self, user: &UserRef, on: bool) -> Result<()>;

    /// Opportunistically refresh a member's stored names from the platform
    /// profile.
    async fn update_name(&self, member: &Member, user: &UserRef) -> Result<()>;

    /// Set or clear the member's leaderboard emoji.
    async fn update_emoji(&self, member: &Member, emoji: &str) -> Result<()>;

    /// Members flagged as support agents, sorted by name.
    async fn get_support_members(&self) -> Result<Vec<Member>>;

    /// Top members by motto count, descending.
    async fn get_leaders(&self, count: usize) -> Result<Vec<Member>>;

    /// Delete unconfirmed mottos older than the retention window.
    async fn remove_unapproved_mottos(&self, retention_hours: i64) -> Result<()>;
}
