//! # Motto-collecting chat bot
//!
//! A chat moderation bot that watches a stream of messages, recognizes a
//! small set of trigger phrases and reply patterns, validates and
//! deduplicates user-nominated mottos, and persists accepted submissions
//! plus leaderboard metadata to a remote tabular store over HTTP.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mottobot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(BotConfig::load(std::path::Path::new("config.yaml"))?);
//!
//!     let storage = Arc::new(AirtableStorage::new(
//!         &config.authentication.airtable_base,
//!         &config.authentication.airtable_key,
//!         config.bot_id.clone(),
//!         config.random_source_view.clone(),
//!     )?);
//!
//!     let mut transport =
//!         DiscordTransport::new(&config.authentication.discord_token, &config.watching_status);
//!     transport.connect().await?;
//!
//!     let bot = Arc::new(MottoBot::new(config, storage, Arc::new(transport))?);
//!     bot.run().await
//! }
//! ```

pub mod bot;
pub mod config;
pub mod patterns;
pub mod platforms;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::MottoBot;
    pub use crate::config::BotConfig;
    pub use crate::platforms::{discord::DiscordTransport, ChatTransport};
    pub use crate::storage::{airtable::AirtableStorage, MottoStorage, RandomFilter};
    pub use crate::types::{
        FetchedMessage, GatewayEvent, Member, MessageEvent, Motto, ReactionEvent, UserRef,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
