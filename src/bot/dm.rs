use anyhow::Result;
use log::{debug, info};
use std::env;

use crate::patterns::food::is_single_emoji;
use crate::storage::RandomFilter;
use crate::types::{Member, MessageEvent};
use crate::VERSION;

use super::MottoBot;

const LEADERBOARD_COUNT: usize = 5;

const NUMBERS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Render the leaderboard as a numbered list, spelling out rank words and
/// re-using the same rank for tied motto counts.
pub(crate) fn render_leaderboard(leaders: &[Member]) -> String {
    let mut lines = String::new();
    let mut previous_count: Option<u32> = None;
    let mut previous_position = 1;
    for (index, leader) in leaders.iter().enumerate() {
        let position = index + 1;
        let rank = if previous_count == Some(leader.motto_count) {
            previous_position
        } else {
            position
        };
        let plural = if leader.motto_count == 1 { "" } else { "s" };
        lines.push_str(&format!(
            ":{}: <@{}> {} ({} motto{})\n",
            NUMBERS[rank.min(9)],
            leader.user_id,
            leader.display_name(),
            leader.motto_count,
            plural,
        ));
        if previous_count != Some(leader.motto_count) {
            previous_count = Some(leader.motto_count);
            previous_position = position;
        }
    }
    lines
}

impl MottoBot {
    /// Dispatch a direct message to the small account-management command
    /// language. Anything unrecognized gets the "unknown" reaction.
    pub(crate) async fn process_dm(&self, message: &MessageEvent) -> Result<()> {
        if message.author.id == self.transport.bot_user_id() {
            return Ok(());
        }
        info!(
            "Received direct message (ID: {}) from {}: {:?}",
            message.message_id, message.author.username, message.content
        );
        let _ = self.transport.trigger_typing(&message.channel_id).await;

        let content = message.content.trim().to_lowercase();

        match content.as_str() {
            "!help" | "help" | "help!" | "halp" | "halp!" | "!halp" => {
                return self.send_help(message).await;
            }
            "!leaderboard" => return self.send_leaderboard(message).await,
            "!version" => return self.send_version(message).await,
            "!delete" => return self.send_delete_prompt(message).await,
            _ => {}
        }

        if content.starts_with("!random") {
            return self.send_random(message, &content).await;
        }
        if content == "!link" {
            if let Some(link) = &self.config.leaderboard_link {
                self.transport.send_message(&message.channel_id, link).await?;
                return Ok(());
            }
        }
        if content.starts_with("!nick") {
            return self.set_nickname_option(message, &content).await;
        }
        if self.patterns.emoji_command.is_match(&content) {
            return self.set_member_emoji(message, &content).await;
        }

        self.responder.unknown_dm(message).await;
        Ok(())
    }

    async fn send_help(&self, message: &MessageEvent) -> Result<()> {
        let trigger = if self.config.trigger_on_mention {
            format!("<@{}>", self.transport.bot_user_id())
        } else {
            "a trigger word".to_string()
        };

        let mut help = format!(
            "Reply to a great motto in the supported channels with {trigger} to tell me about \
             it! You can nominate a section of a message with \"{trigger} <excerpt>\". (Note: \
             you can't nominate yourself.)\n\n\
             To get inspired, tag me in a supported channel with `{trigger} !random`. I'll reply \
             with a hand-selected motto from our database. You can only do this once every \
             {per_user} minutes, though, and others will have to wait {global} minutes before \
             they can do it too.\n\n\
             You can DM me the following commands:\n\
             `!random`: Get a random motto.\n\
             `!leaderboard`: Display the top motto authors.\n\
             `!link`: Get a link to the leaderboard.\n\
             `!emoji <emoji>`: Set your emoji on the leaderboard. A response of {invalid_emoji} \
             means the emoji you requested is not valid.\n\
             `!emoji`: Clear your emoji from the leaderboard.\n\
             `!nick on`: Use your server-specific nickname on the leaderboard instead of your \
             Discord username. Nickname changes will auto-update the next time you approve a \
             motto.\n\
             `!nick off`: Use your Discord username on the leaderboard instead of your \
             server-specific nickname.\n\
             `!delete`: Remove all your data from the bot. Confirmation is required.",
            trigger = trigger,
            per_user = self.config.minimum_random_interval_minutes_per_user,
            global = self.config.minimum_random_interval_minutes,
            invalid_emoji = self.config.reactions.invalid_emoji,
        );

        let supporters = self.storage.get_support_members().await?;
        let users = supporters
            .iter()
            .map(|m| format!("<@{}>", m.user_id))
            .collect::<Vec<_>>()
            .join(", ");
        if self.config.support_channel.is_some() || !users.is_empty() {
            let mut addition = "\nIf your question was not answered here, please".to_string();
            if let Some(channel) = &self.config.support_channel {
                addition.push_str(&format!(" ask for help in #{}", channel));
                if !users.is_empty() {
                    addition.push_str(", or");
                }
            }
            if !users.is_empty() {
                addition.push_str(&format!(
                    " DM one of the following users: {}. They are happy to receive your DMs \
                     about the bot without prior permission but otherwise usual rules apply",
                    users
                ));
            }
            help = format!("{}\n{}.", help, addition);
        }

        self.transport.send_message(&message.channel_id, &help).await?;
        Ok(())
    }

    async fn send_leaderboard(&self, message: &MessageEvent) -> Result<()> {
        let leaders = self.storage.get_leaders(LEADERBOARD_COUNT).await?;
        if leaders.is_empty() {
            self.transport
                .send_message(
                    &message.channel_id,
                    "There doesn't appear to be anybody on the leaderboard!",
                )
                .await?;
            return Ok(());
        }
        self.transport
            .send_message(&message.channel_id, &render_leaderboard(&leaders))
            .await?;
        Ok(())
    }

    async fn send_version(&self, message: &MessageEvent) -> Result<()> {
        let version = env::var("MOTTOBOT_VERSION").unwrap_or_else(|_| VERSION.to_string());
        let response = match &self.config.bot_id {
            Some(bot_id) => format!("Version: {} ({})", version, bot_id),
            None => format!("Version: {}", version),
        };
        self.transport.send_message(&message.channel_id, &response).await?;
        Ok(())
    }

    async fn send_random(&self, message: &MessageEvent, content: &str) -> Result<()> {
        let partial = content
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or("");
        let filter = RandomFilter::parse(partial);
        match self.storage.get_random_motto(filter.as_ref()).await? {
            Some((motto, author)) => {
                self.transport
                    .send_message(
                        &message.channel_id,
                        &format!("{}—{}", motto.motto, author.display_name()),
                    )
                    .await?;
            }
            None => {
                self.transport
                    .send_message(&message.channel_id, "Sorry mate, I'm all out.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_nickname_option(&self, message: &MessageEvent, content: &str) -> Result<()> {
        let option = content
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim());
        match option {
            Some("on") => {
                self.storage.set_nick_option(&message.author, true).await?;
                self.transport
                    .send_message(
                        &message.channel_id,
                        "The leaderboard will now display your server-specific nickname instead \
                         of your Discord username. To return to your username, type `!nick off`.",
                    )
                    .await?;
            }
            Some("off") => {
                self.storage.set_nick_option(&message.author, false).await?;
                self.transport
                    .send_message(
                        &message.channel_id,
                        "The leaderboard will now display your Discord username instead of your \
                         server-specific nickname. To return to your nickname, type `!nick on`.",
                    )
                    .await?;
            }
            _ => {
                self.transport
                    .send_message(
                        &message.channel_id,
                        "To display your server-specific nickname on the leaderboard, type \
                         `!nick on`. To use your Discord username, type `!nick off`.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_delete_prompt(&self, message: &MessageEvent) -> Result<()> {
        let prompt = format!(
            "Are you sure you want to delete all your data from the leaderboard? This will \
             include any mottos of yours that were nominated by other people. If so, react to \
             this message with {}. Otherwise, ignore this message.",
            self.config.confirm_delete_reaction
        );
        let prompt_id = self
            .transport
            .reply(&message.channel_id, &message.message_id, &prompt)
            .await?;
        self.transport
            .add_reaction(&message.channel_id, &prompt_id, &self.config.reactions.pending)
            .await?;
        Ok(())
    }

    async fn set_member_emoji(&self, message: &MessageEvent, content: &str) -> Result<()> {
        let argument = self
            .patterns
            .emoji_command
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().trim_matches('\u{FE0F}'))
            .unwrap_or("");
        debug!("User {} wants to change emoji: {:?}", message.author.username, argument);

        if argument.is_empty() {
            let member = self.storage.get_or_add_member(&message.author).await?;
            self.storage.update_emoji(&member, "").await?;
            self.responder.valid_emoji(message).await;
        } else if is_single_emoji(argument) {
            let member = self.storage.get_or_add_member(&message.author).await?;
            self.storage.update_emoji(&member, argument).await?;
            self.responder.valid_emoji(message).await;
        } else {
            self.responder.invalid_emoji(message).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::*;
    use crate::config::BotConfig;
    use crate::platforms::testing::{FakeTransport, TransportAction};
    use crate::storage::testing::FakeStorage;
    use std::sync::Arc;

    fn leader(user_id: &str, username: &str, count: u32) -> Member {
        Member {
            primary_key: format!("rec-{}", user_id),
            username: username.to_string(),
            emoji: None,
            user_id: user_id.to_string(),
            support: false,
            nickname: None,
            use_nickname: false,
            motto_count: count,
            bot_id: None,
            mottos: Vec::new(),
        }
    }

    #[test]
    fn test_leaderboard_ties_share_rank_words() {
        let leaders = vec![leader("1", "ada", 10), leader("2", "bab", 10), leader("3", "cy", 5)];
        let rendered = render_leaderboard(&leaders);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with(":one: <@1> ada (10 mottos)"));
        assert!(lines[1].starts_with(":one: <@2> bab (10 mottos)"));
        assert!(lines[2].starts_with(":three: <@3> cy (5 mottos)"));
    }

    #[test]
    fn test_leaderboard_singular_motto() {
        let rendered = render_leaderboard(&[leader("1", "ada", 1)]);
        assert!(rendered.contains("(1 motto)"));
    }

    #[tokio::test]
    async fn test_nick_on_records_preference() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!nick on")).await.unwrap();
        bot.process_dm(&dm_message("901", user("2", "bob"), "!nick off")).await.unwrap();

        assert_eq!(
            *storage.nick_options.lock().unwrap(),
            vec![("2".to_string(), true), ("2".to_string(), false)]
        );
        assert_eq!(transport.sent_texts().len(), 2);
    }

    #[tokio::test]
    async fn test_nick_without_option_sends_usage() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!nick")).await.unwrap();

        assert!(storage.nick_options.lock().unwrap().is_empty());
        assert!(transport.sent_texts()[0].contains("`!nick on`"));
    }

    #[tokio::test]
    async fn test_delete_prompt_carries_pending_marker() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), storage, Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!delete")).await.unwrap();

        let actions = transport.actions.lock().unwrap();
        let replied_id = actions.iter().find_map(|a| match a {
            TransportAction::Replied { message_id, .. } if message_id == "900" => Some(()),
            _ => None,
        });
        assert!(replied_id.is_some());
        assert!(actions.iter().any(|a| matches!(
            a,
            TransportAction::Reacted { emoji, message_id } if emoji == "⏳" && message_id.starts_with("sent")
        )));
    }

    #[tokio::test]
    async fn test_emoji_set_and_clear() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!emoji 🦄")).await.unwrap();
        bot.process_dm(&dm_message("901", user("2", "bob"), "!emoji")).await.unwrap();

        assert_eq!(
            *storage.emoji_updates.lock().unwrap(),
            vec![("2".to_string(), "🦄".to_string()), ("2".to_string(), "".to_string())]
        );
        let reactions = transport.reactions_added();
        assert_eq!(reactions.iter().filter(|r| *r == "👍").count(), 2);
    }

    #[tokio::test]
    async fn test_emoji_rejects_non_emoji() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!emoji nope")).await.unwrap();

        assert!(storage.emoji_updates.lock().unwrap().is_empty());
        assert!(transport.reactions_added().contains(&"⚠️".to_string()));
    }

    #[tokio::test]
    async fn test_version_includes_bot_id() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let mut config = BotConfig::default();
        config.bot_id = Some("botto-prime".to_string());
        let bot = build_bot(config, storage, Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!version")).await.unwrap();

        let texts = transport.sent_texts();
        assert!(texts[0].starts_with("Version: "));
        assert!(texts[0].ends_with("(botto-prime)"));
    }

    #[tokio::test]
    async fn test_unknown_dm_reaction() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), storage, Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "good morning")).await.unwrap();

        assert!(transport.reactions_added().contains(&"❓".to_string()));
    }

    #[tokio::test]
    async fn test_link_requires_configuration() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), storage, Arc::clone(&transport));
        bot.process_dm(&dm_message("900", user("2", "bob"), "!link")).await.unwrap();
        assert!(transport.reactions_added().contains(&"❓".to_string()));

        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let mut config = BotConfig::default();
        config.leaderboard_link = Some("https://example.com/board".to_string());
        let bot = build_bot(config, storage, Arc::clone(&transport));
        bot.process_dm(&dm_message("901", user("2", "bob"), "!link")).await.unwrap();
        assert_eq!(transport.sent_texts(), vec!["https://example.com/board".to_string()]);
    }

    #[tokio::test]
    async fn test_leaderboard_empty_message() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), storage, Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!leaderboard")).await.unwrap();

        assert!(transport.sent_texts()[0].contains("anybody on the leaderboard"));
    }

    #[tokio::test]
    async fn test_help_lists_support_channel_and_users() {
        let storage = Arc::new(FakeStorage::new());
        *storage.canned_support.lock().unwrap() = vec![leader("9", "helper", 0)];
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let mut config = BotConfig::default();
        config.support_channel = Some("bot-help".to_string());
        let bot = build_bot(config, Arc::clone(&storage), Arc::clone(&transport));

        bot.process_dm(&dm_message("900", user("2", "bob"), "!help")).await.unwrap();

        let help = &transport.sent_texts()[0];
        assert!(help.contains("#bot-help"));
        assert!(help.contains("<@9>"));
        assert!(help.contains("`!delete`"));
    }

    #[tokio::test]
    async fn test_random_dm_attribution_and_empty() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));
        bot.process_dm(&dm_message("900", user("2", "bob"), "!random")).await.unwrap();
        assert_eq!(transport.sent_texts(), vec!["Sorry mate, I'm all out.".to_string()]);

        *storage.canned_random.lock().unwrap() = Some((
            stored_motto("rec9", "Fortune favors the bold.", "77"),
            leader("9", "ada", 3),
        ));
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));
        bot.process_dm(&dm_message("901", user("2", "bob"), "!random fortune")).await.unwrap();
        assert_eq!(
            transport.sent_texts(),
            vec!["Fortune favors the bold.—ada".to_string()]
        );
    }
}
