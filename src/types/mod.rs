use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat-platform user as seen on an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    pub username: String,
    pub nickname: Option<String>,
    pub is_bot: bool,
}

impl UserRef {
    /// The name the guild shows for this user: nickname when set, else username.
    pub fn preferred_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }
}

/// Reply reference carried on a message event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// A message-received event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: UserRef,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reference: Option<MessageRef>,
    pub is_dm: bool,
}

/// One reaction on a fetched message, with whether the bot itself placed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub me: bool,
}

/// A message resolved by ID, including its current reaction set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedMessage {
    pub message: MessageEvent,
    pub reactions: Vec<ReactionSummary>,
}

impl FetchedMessage {
    /// Whether the bot's own reaction with the given emoji is present.
    pub fn has_own_reaction(&self, emoji: &str) -> bool {
        self.reactions.iter().any(|r| r.me && r.emoji == emoji)
    }
}

/// A reaction-added event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub emoji: String,
    pub user_id: String,
    pub member: Option<UserRef>,
    pub channel_id: String,
    pub message_id: String,
    pub guild_id: Option<String>,
}

/// Events that flow from the transport into the bot core.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
}

/// A candidate or accepted motto submission backed by the remote store.
///
/// `primary_key` is absent until the record is first persisted. The text is
/// empty exactly while the nomination awaits author confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motto {
    pub primary_key: Option<String>,
    pub motto: String,
    pub message_id: String,
    pub date: DateTime<Utc>,
    pub member: Option<String>,
    pub nominated_by: Option<String>,
    pub approved: bool,
    pub approved_by_author: bool,
    pub bot_id: Option<String>,
}

/// A tracked chat-platform user with leaderboard metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub primary_key: String,
    pub username: String,
    pub emoji: Option<String>,
    pub user_id: String,
    pub support: bool,
    pub nickname: Option<String>,
    pub use_nickname: bool,
    pub motto_count: u32,
    pub bot_id: Option<String>,
    pub mottos: Vec<String>,
}

impl Member {
    /// Leaderboard display name: emoji prefix if set, then nickname when the
    /// member opted in and one is stored, otherwise the platform username.
    pub fn display_name(&self) -> String {
        let name = match &self.nickname {
            Some(nick) if self.use_nickname && !nick.is_empty() => nick,
            _ => &self.username,
        };
        match &self.emoji {
            Some(emoji) if !emoji.is_empty() => format!("{} {}", emoji, name),
            _ => name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(emoji: Option<&str>, nickname: Option<&str>, use_nickname: bool) -> Member {
        Member {
            primary_key: "rec1".to_string(),
            username: "ada".to_string(),
            emoji: emoji.map(String::from),
            user_id: "100".to_string(),
            support: false,
            nickname: nickname.map(String::from),
            use_nickname,
            motto_count: 0,
            bot_id: None,
            mottos: Vec::new(),
        }
    }

    #[test]
    fn test_display_name_prefers_emoji() {
        assert_eq!(member(Some("🦄"), None, false).display_name(), "🦄 ada");
    }

    #[test]
    fn test_display_name_uses_nickname_only_when_opted_in() {
        assert_eq!(member(None, Some("The Countess"), true).display_name(), "The Countess");
        assert_eq!(member(None, Some("The Countess"), false).display_name(), "ada");
        assert_eq!(member(None, Some(""), true).display_name(), "ada");
    }

    #[test]
    fn test_own_pending_reaction_lookup() {
        let fetched = FetchedMessage {
            message: MessageEvent {
                message_id: "1".to_string(),
                channel_id: "2".to_string(),
                guild_id: None,
                author: UserRef {
                    id: "3".to_string(),
                    username: "bot".to_string(),
                    nickname: None,
                    is_bot: true,
                },
                content: String::new(),
                timestamp: Utc::now(),
                reference: None,
                is_dm: false,
            },
            reactions: vec![
                ReactionSummary { emoji: "⏳".to_string(), me: false },
                ReactionSummary { emoji: "⏳".to_string(), me: true },
            ],
        };
        assert!(fetched.has_own_reaction("⏳"));
        assert!(!fetched.has_own_reaction("📥"));
    }
}
