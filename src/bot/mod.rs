use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::BotConfig;
use crate::patterns::SuggestionPatterns;
use crate::platforms::ChatTransport;
use crate::storage::MottoStorage;
use crate::types::{GatewayEvent, MessageEvent};

pub mod approvals;
pub mod dedup;
pub mod dm;
pub mod rate_limit;
pub mod reactions;
pub mod suggestions;
pub mod validation;

use dedup::Normalizer;
use rate_limit::RandomRateLimiter;
use reactions::Responder;
use validation::MottoRules;

// Fraction of processed guild messages that trigger the retention sweep,
// bounding the load the sweep puts on the remote store.
const SWEEP_PROBABILITY: f64 = 0.1;

/// Core bot engine: classifies every inbound event and drives the
/// suggestion, approval and DM workflows against the storage adapter.
pub struct MottoBot {
    pub(crate) config: Arc<BotConfig>,
    pub(crate) patterns: SuggestionPatterns,
    pub(crate) rules: MottoRules,
    pub(crate) normalizer: Normalizer,
    pub(crate) storage: Arc<dyn MottoStorage>,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) responder: Responder,
    pub(crate) rate_limiter: RandomRateLimiter,
}

impl MottoBot {
    /// Build the bot against a connected transport; all patterns compile
    /// here, once.
    pub fn new(
        config: Arc<BotConfig>,
        storage: Arc<dyn MottoStorage>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let patterns = SuggestionPatterns::compile(&transport.bot_user_id(), &config)?;
        let rules = MottoRules::compile(&config.rules, &patterns.new_motto)?;
        let responder = Responder::new(Arc::clone(&transport), Arc::clone(&config));
        let rate_limiter = RandomRateLimiter::new(
            config.minimum_random_interval_minutes,
            config.minimum_random_interval_minutes_per_user,
        );
        info!(
            "Replies are {}",
            if config.should_reply { "enabled" } else { "disabled" }
        );
        info!("Responding to {} motto trigger(s)", patterns.new_motto.len());
        Ok(Self {
            config,
            patterns,
            rules,
            normalizer: Normalizer::new()?,
            storage,
            transport,
            responder,
            rate_limiter,
        })
    }

    /// Consume the transport's event stream until it closes. Each event is
    /// handled in its own task; a handler error aborts only that event.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut receiver = self
            .transport
            .event_receiver()
            .context("transport has no event stream; connect first")?;
        info!("Bot event loop started");
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let bot = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = bot.handle_event(event).await {
                            error!("Event handling failed: {:#}", e);
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event stream closed");
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::Message(message) => self.on_message(&message).await,
            GatewayEvent::ReactionAdded(reaction) => self.on_reaction_add(&reaction).await,
        }
    }

    async fn on_message(&self, message: &MessageEvent) -> Result<()> {
        if message.is_dm {
            return self.process_dm(message).await;
        }
        if !self.channel_allowed(&message.channel_id).await {
            return Ok(());
        }
        self.process_suggestion(message).await?;
        self.maybe_sweep().await;
        Ok(())
    }

    /// Channel include/exclude filtering, by display name.
    async fn channel_allowed(&self, channel_id: &str) -> bool {
        let channels = &self.config.channels;
        if channels.include.is_empty() && channels.exclude.is_empty() {
            return true;
        }
        let Some(name) = self.transport.channel_name(channel_id).await else {
            return channels.include.is_empty();
        };
        if !channels.include.is_empty() && !channels.include.contains(&name) {
            return false;
        }
        !channels.exclude.contains(&name)
    }

    /// Occasionally reclaim nominations that were never confirmed.
    async fn maybe_sweep(&self) {
        if rand::random::<f64>() >= SWEEP_PROBABILITY {
            return;
        }
        if let Err(e) = self
            .storage
            .remove_unapproved_mottos(self.config.delete_unapproved_after_hours)
            .await
        {
            warn!("Retention sweep failed: {:#}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::platforms::testing::FakeTransport;
    use crate::storage::testing::FakeStorage;
    use crate::types::{FetchedMessage, MessageRef, Motto, ReactionSummary, UserRef};
    use chrono::{TimeZone, Utc};

    pub const BOT_ID: &str = "42";

    pub fn user(id: &str, username: &str) -> UserRef {
        UserRef {
            id: id.to_string(),
            username: username.to_string(),
            nickname: None,
            is_bot: false,
        }
    }

    pub fn bot_user() -> UserRef {
        UserRef {
            id: BOT_ID.to_string(),
            username: "mottobot".to_string(),
            nickname: None,
            is_bot: true,
        }
    }

    pub fn guild_message(
        id: &str,
        author: UserRef,
        content: &str,
        reference: Option<&str>,
    ) -> MessageEvent {
        MessageEvent {
            message_id: id.to_string(),
            channel_id: "555".to_string(),
            guild_id: Some("g1".to_string()),
            author,
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            reference: reference.map(|mid| MessageRef {
                channel_id: "555".to_string(),
                message_id: mid.to_string(),
            }),
            is_dm: false,
        }
    }

    pub fn dm_message(id: &str, author: UserRef, content: &str) -> MessageEvent {
        MessageEvent {
            message_id: id.to_string(),
            channel_id: "dm-1".to_string(),
            guild_id: None,
            author,
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            reference: None,
            is_dm: true,
        }
    }

    pub fn fetched(message: MessageEvent, reactions: &[(&str, bool)]) -> FetchedMessage {
        FetchedMessage {
            message,
            reactions: reactions
                .iter()
                .map(|(emoji, me)| ReactionSummary { emoji: emoji.to_string(), me: *me })
                .collect(),
        }
    }

    pub fn stored_motto(primary_key: &str, text: &str, message_id: &str) -> Motto {
        Motto {
            primary_key: Some(primary_key.to_string()),
            motto: text.to_string(),
            message_id: message_id.to_string(),
            date: Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap(),
            member: Some("memberX".to_string()),
            nominated_by: Some("memberY".to_string()),
            approved: true,
            approved_by_author: !text.is_empty(),
            bot_id: None,
        }
    }

    pub fn build_bot(
        config: BotConfig,
        storage: Arc<FakeStorage>,
        transport: Arc<FakeTransport>,
    ) -> MottoBot {
        MottoBot::new(Arc::new(config), storage, transport).expect("bot construction")
    }
}
