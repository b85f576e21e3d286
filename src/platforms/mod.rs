use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::{FetchedMessage, GatewayEvent};

pub mod discord;

/// The interface the bot core requires from a chat transport. Inbound events
/// arrive over a broadcast channel; everything outbound is a method call.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Connect to the platform and start receiving events.
    async fn connect(&mut self) -> Result<()>;

    /// The connected bot's own user ID.
    fn bot_user_id(&self) -> String;

    /// A receiver for inbound events, available once connected.
    fn event_receiver(&self) -> Option<broadcast::Receiver<GatewayEvent>>;

    /// Send a message to a channel.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()>;

    /// Send a reply to a specific message; returns the new message's ID.
    async fn reply(&self, channel_id: &str, message_id: &str, content: &str) -> Result<String>;

    /// Open (or reuse) a direct-message channel with a user; returns its ID.
    async fn create_dm(&self, user_id: &str) -> Result<String>;

    /// Add the bot's reaction to a message.
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Remove the bot's own reaction from a message.
    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()>;

    /// Resolve a message by ID. `None` means the message no longer exists.
    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<FetchedMessage>>;

    /// Resolve a channel ID to its display name, when it has one.
    async fn channel_name(&self, channel_id: &str) -> Option<String>;

    /// Show the typing indicator in a channel.
    async fn trigger_typing(&self, channel_id: &str) -> Result<()>;
}
