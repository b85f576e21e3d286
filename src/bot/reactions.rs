use log::{debug, info, warn};
use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::config::BotConfig;
use crate::patterns::food::{FoodLookups, ResponseAction};
use crate::platforms::ChatTransport;
use crate::types::MessageEvent;

/// All user-visible signaling: reaction emoji, plus replies where the
/// configuration allows them. Failures here are logged and swallowed; a
/// missing reaction never aborts event processing.
pub struct Responder {
    transport: Arc<dyn ChatTransport>,
    config: Arc<BotConfig>,
}

fn pick(choices: &[String]) -> Option<&String> {
    choices.choose(&mut rand::thread_rng())
}

impl Responder {
    pub fn new(transport: Arc<dyn ChatTransport>, config: Arc<BotConfig>) -> Self {
        Self { transport, config }
    }

    async fn react(&self, message: &MessageEvent, emoji: &str) {
        if emoji.is_empty() {
            return;
        }
        if let Err(e) = self
            .transport
            .add_reaction(&message.channel_id, &message.message_id, emoji)
            .await
        {
            warn!("Failed to add {} to message {}: {}", emoji, message.message_id, e);
        }
    }

    async fn react_one_of(&self, message: &MessageEvent, choices: &[String]) {
        if let Some(emoji) = pick(choices) {
            self.react(message, emoji).await;
        }
    }

    async fn unreact(&self, message: &MessageEvent, emoji: &str) {
        if let Err(e) = self
            .transport
            .remove_own_reaction(&message.channel_id, &message.message_id, emoji)
            .await
        {
            debug!("Failed to remove {} from message {}: {}", emoji, message.message_id, e);
        }
    }

    async fn maybe_reply(&self, message: &MessageEvent, text: &str) {
        if !self.config.should_reply {
            return;
        }
        if let Err(e) = self
            .transport
            .reply(&message.channel_id, &message.message_id, text)
            .await
        {
            warn!("Failed to reply to message {}: {}", message.message_id, e);
        }
    }

    pub async fn skynet_prevention(&self, message: &MessageEvent) {
        info!("{} attempted to activate Skynet!", message.author.username);
        self.react(message, &self.config.reactions.reject).await;
        self.react(message, &self.config.reactions.skynet).await;
        self.maybe_reply(message, "Skynet prevention").await;
    }

    pub async fn not_reply(&self, message: &MessageEvent) {
        info!(
            "Suggestion from {} was not a reply (message ID {})",
            message.author.username, message.message_id
        );
        self.react(message, &self.config.reactions.unknown).await;
        self.maybe_reply(message, "I see no motto!").await;
    }

    pub async fn fishing(&self, message: &MessageEvent) {
        info!("Motto fishing from: {}", message.author.username);
        self.react(message, &self.config.reactions.reject).await;
        self.react(message, &self.config.reactions.fishing).await;
    }

    pub async fn invalid(&self, message: &MessageEvent) {
        info!("Motto from {} is invalid according to rules", message.author.username);
        self.react(message, &self.config.reactions.reject).await;
        self.react(message, &self.config.reactions.invalid).await;
    }

    pub async fn duplicate(&self, message: &MessageEvent) {
        debug!("Ignoring motto, it's a duplicate");
        self.react(message, &self.config.reactions.repeat).await;
        self.unreact(message, &self.config.reactions.pending).await;
    }

    pub async fn deleted(&self, message: &MessageEvent) {
        debug!("Ignoring motto, it's been deleted");
        self.react(message, &self.config.reactions.deleted).await;
        self.react(message, &self.config.reactions.reject).await;
        self.unreact(message, &self.config.reactions.pending).await;
    }

    pub async fn pending(&self, message: &MessageEvent) {
        self.react(message, &self.config.reactions.pending).await;
        debug!("Pending reaction added");
    }

    /// Success signaling after storage or confirmation. `nominee_id` selects
    /// any configured special reaction; `motto_text` feeds the reply.
    pub async fn stored(&self, message: &MessageEvent, nominee_id: &str, motto_text: &str) {
        self.unreact(message, &self.config.reactions.pending).await;
        self.react(message, &self.config.reactions.success).await;
        if let Some(special) = self.config.special_reactions.get(nominee_id) {
            if let Some(emoji) = pick(special) {
                info!("Special reaction {} triggered for motto from {}", emoji, nominee_id);
                self.react(message, emoji).await;
            }
        }
        self.maybe_reply(message, &format!("\"{}\" will be considered!", motto_text))
            .await;
    }

    pub async fn rate_limited(&self, message: &MessageEvent) {
        info!("Rate limit response: {}", message.author.username);
        self.react(message, &self.config.reactions.rate_limit).await;
    }

    pub async fn shrug(&self, message: &MessageEvent) {
        self.react(message, &self.config.reactions.shrug).await;
    }

    pub async fn wave(&self, message: &MessageEvent) {
        info!("Waving to {}", message.author.username);
        self.react(message, &self.config.reactions.wave).await;
    }

    pub async fn sleep(&self, message: &MessageEvent) {
        info!("Sleeping on {}'s announcement", message.author.username);
        self.react(message, &self.config.reactions.sleep).await;
    }

    pub async fn poke(&self, message: &MessageEvent) {
        info!("Poke from: {}", message.author.username);
        self.react_one_of(message, &self.config.reactions.poke).await;
    }

    pub async fn love(&self, message: &MessageEvent) {
        info!("Apology/love from: {}", message.author.username);
        self.react_one_of(message, &self.config.reactions.love).await;
    }

    pub async fn hug(&self, message: &MessageEvent) {
        info!("Hug from: {}", message.author.username);
        self.react_one_of(message, &self.config.reactions.hug).await;
    }

    pub async fn cow(&self, message: &MessageEvent) {
        info!("Cow from: {}", message.author.username);
        self.react_one_of(message, &self.config.reactions.cow).await;
    }

    pub async fn off_topic(&self, message: &MessageEvent) {
        self.react_one_of(message, &self.config.reactions.off_topic).await;
    }

    pub async fn favorite_band(&self, message: &MessageEvent) {
        for letter in &self.config.reactions.favorite_band {
            self.react(message, letter).await;
        }
        info!("Someone asked for the favorite band");
    }

    /// Five celebratory reactions, chosen at random with repetition.
    pub async fn party(&self, message: &MessageEvent) {
        info!("Party from: {}", message.author.username);
        for _ in 0..5 {
            self.react_one_of(message, &self.config.reactions.party).await;
        }
    }

    /// Run the response actions configured for a recognized food emoji.
    pub async fn food(&self, message: &MessageEvent, food_char: char, lookups: &FoodLookups) {
        let Some(actions) = lookups.actions(food_char) else {
            warn!("No food actions for {:?}", food_char);
            return;
        };
        for action in actions {
            match action {
                ResponseAction::Emoji(emoji) => self.react(message, emoji).await,
                ResponseAction::Echo => self.react(message, &food_char.to_string()).await,
                ResponseAction::Party => self.party(message).await,
            }
        }
    }

    pub async fn unrecognised_food(&self, message: &MessageEvent) {
        self.react(message, &self.config.reactions.confused_food).await;
    }

    pub async fn valid_emoji(&self, message: &MessageEvent) {
        info!("Valid emoji requested by {}", message.author.username);
        self.react(message, &self.config.reactions.valid_emoji).await;
    }

    pub async fn invalid_emoji(&self, message: &MessageEvent) {
        info!("Invalid emoji requested by {}", message.author.username);
        self.react(message, &self.config.reactions.invalid_emoji).await;
    }

    pub async fn unknown_dm(&self, message: &MessageEvent) {
        info!(
            "I don't know how to handle {:?} from {}",
            message.content, message.author.username
        );
        self.react(message, &self.config.reactions.unknown).await;
    }
}
