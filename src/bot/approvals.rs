use anyhow::Result;
use log::{debug, info};

use crate::types::{FetchedMessage, ReactionEvent};

use super::MottoBot;

impl MottoBot {
    /// Only two emoji identities matter on a reaction-add: the approval
    /// emoji and the confirm-delete emoji. Everything else is ignored.
    pub(crate) async fn on_reaction_add(&self, reaction: &ReactionEvent) -> Result<()> {
        if reaction.emoji != self.config.approval_reaction
            && reaction.emoji != self.config.confirm_delete_reaction
        {
            return Ok(());
        }
        info!(
            "Reaction {} received on message {} from user {}",
            reaction.emoji, reaction.message_id, reaction.user_id
        );

        let Some(trigger_message) = self
            .transport
            .fetch_message(&reaction.channel_id, &reaction.message_id)
            .await?
        else {
            debug!("Reacted-to message no longer exists");
            return Ok(());
        };

        if reaction.emoji == self.config.approval_reaction {
            self.process_approval(reaction, &trigger_message).await
        } else {
            self.process_delete_confirmation(reaction, &trigger_message).await
        }
    }

    /// The nominee confirms their nomination by reacting on the bot-marked
    /// trigger message. Resolves the stored record, re-derives the final
    /// text, and re-runs the duplicate rule before committing.
    async fn process_approval(
        &self,
        reaction: &ReactionEvent,
        trigger_message: &FetchedMessage,
    ) -> Result<()> {
        if !trigger_message.has_own_reaction(&self.config.reactions.pending) {
            info!("Ignoring message not pending approval");
            return Ok(());
        }

        let Some(reference) = &trigger_message.message.reference else {
            info!("Ignoring approval on a message with no reply reference");
            return Ok(());
        };

        let Some(nominated) = self
            .transport
            .fetch_message(&reference.channel_id, &reference.message_id)
            .await?
        else {
            info!("Ignoring approval for a message that's been deleted");
            self.responder.deleted(&trigger_message.message).await;
            return Ok(());
        };
        let nominated = nominated.message;

        // Only the nominee may confirm their own nomination.
        if nominated.author.id != reaction.user_id {
            info!("Ignoring approval from somebody other than the motto author");
            return Ok(());
        }

        let Some(motto) = self.storage.get_motto(&nominated.message_id).await? else {
            info!("Couldn't find a matching record to confirm");
            return Ok(());
        };
        let Some(primary_key) = motto.primary_key else {
            return Ok(());
        };

        let Some(trigger) = self.patterns.matching_trigger(&trigger_message.message.content)
        else {
            info!("Ignoring approval on a non-trigger message");
            return Ok(());
        };

        let excerpt = self
            .patterns
            .strip_trigger(trigger, &trigger_message.message.content);
        let candidate = if excerpt.is_empty() {
            nominated.content.clone()
        } else {
            if !nominated.content.contains(&excerpt) {
                info!(
                    "Ignoring approval; quoted excerpt {:?} not found in {:?}",
                    excerpt, nominated.content
                );
                return Ok(());
            }
            excerpt
        };
        let actual = self.normalizer.clean(&candidate, self.transport.as_ref()).await;

        // Other submissions may have landed since the nomination.
        if self.storage.has_matching_motto(&actual, None).await? {
            self.storage
                .delete_mottos(std::slice::from_ref(&primary_key))
                .await?;
            self.responder.duplicate(&trigger_message.message).await;
            return Ok(());
        }

        self.storage.update_motto_text(&primary_key, &actual, true).await?;
        self.responder
            .stored(&trigger_message.message, &nominated.author.id, &nominated.content)
            .await;

        let reactor = reaction
            .member
            .clone()
            .unwrap_or_else(|| nominated.author.clone());
        let (nominee, nominator) = tokio::try_join!(
            self.storage.get_or_add_member(&reactor),
            self.storage.get_or_add_member(&trigger_message.message.author),
        )?;
        tokio::try_join!(
            self.storage.update_name(&nominee, &reactor),
            self.storage.update_name(&nominator, &trigger_message.message.author),
        )?;
        Ok(())
    }

    /// Completion of the DM `!delete` round-trip: the bot's own prompt, in a
    /// DM channel, replying to a `!delete` request, still marked pending.
    async fn process_delete_confirmation(
        &self,
        reaction: &ReactionEvent,
        trigger_message: &FetchedMessage,
    ) -> Result<()> {
        let message = &trigger_message.message;

        if message.author.id != self.transport.bot_user_id() {
            info!("Ignoring confirmation on a message the bot didn't send");
            return Ok(());
        }
        if !message.is_dm {
            info!("Ignoring confirmation outside a direct message");
            return Ok(());
        }

        let Some(reference) = &message.reference else {
            info!("Ignoring confirmation with no reply reference");
            return Ok(());
        };
        let Some(request) = self
            .transport
            .fetch_message(&reference.channel_id, &reference.message_id)
            .await?
        else {
            info!("Ignoring confirmation whose request no longer exists");
            return Ok(());
        };
        if request.message.content.trim().to_lowercase() != "!delete" {
            info!("Ignoring reaction to a message not replying to !delete");
            return Ok(());
        }
        if !trigger_message.has_own_reaction(&self.config.reactions.pending) {
            info!("Ignoring message not pending approval");
            return Ok(());
        }

        let _ = self.transport.trigger_typing(&message.channel_id).await;
        self.storage.remove_all_data(&reaction.user_id).await?;

        self.transport
            .remove_own_reaction(
                &message.channel_id,
                &message.message_id,
                &self.config.reactions.pending,
            )
            .await?;
        self.transport
            .add_reaction(
                &message.channel_id,
                &message.message_id,
                &self.config.reactions.delete_confirmed,
            )
            .await?;
        self.transport
            .send_message(
                &message.channel_id,
                "All of your data has been removed. If you approve or nominate another motto \
                 in future, your user data and any future approved mottos will be captured \
                 again.",
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bot::test_support::*;
    use crate::config::BotConfig;
    use crate::platforms::testing::{FakeTransport, TransportAction};
    use crate::storage::testing::FakeStorage;
    use crate::types::ReactionEvent;
    use std::sync::Arc;

    fn approval(user_id: &str, username: &str, message_id: &str) -> ReactionEvent {
        ReactionEvent {
            emoji: "👍".to_string(),
            user_id: user_id.to_string(),
            member: Some(user(user_id, username)),
            channel_id: "555".to_string(),
            message_id: message_id.to_string(),
            guild_id: Some("g1".to_string()),
        }
    }

    fn confirmation_fixture(
        storage: Arc<FakeStorage>,
    ) -> (crate::bot::MottoBot, Arc<FakeTransport>) {
        let nominated =
            guild_message("100", user("1", "alice"), "Ship it and iterate fast.", None);
        let trigger = guild_message("101", user("2", "bob"), "!motto", Some("100"));
        let transport = Arc::new(
            FakeTransport::new(BOT_ID)
                .with_message(fetched(nominated, &[]))
                .with_message(fetched(trigger, &[("⏳", true)])),
        );
        let mut config = BotConfig::default();
        config.human_moderation_required = true;
        let bot = build_bot(config, storage, Arc::clone(&transport));
        (bot, transport)
    }

    #[tokio::test]
    async fn test_confirmation_writes_text_and_flag() {
        let storage = Arc::new(FakeStorage::new().with_motto(stored_motto("recP", "", "100")));
        let (bot, transport) = confirmation_fixture(Arc::clone(&storage));

        bot.on_reaction_add(&approval("1", "alice", "101")).await.unwrap();

        let mottos = storage.mottos.lock().unwrap();
        assert_eq!(mottos[0].motto, "Ship it and iterate fast.");
        assert!(mottos[0].approved_by_author);
        let actions = transport.actions.lock().unwrap();
        assert!(actions.contains(&TransportAction::RemovedReaction {
            message_id: "101".to_string(),
            emoji: "⏳".to_string(),
        }));
        assert!(actions.contains(&TransportAction::Reacted {
            message_id: "101".to_string(),
            emoji: "📥".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_confirmation_of_new_duplicate_deletes_record() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_motto(stored_motto("recP", "", "100"))
                .with_motto(stored_motto("recQ", "SHIP IT and iterate fast", "90")),
        );
        let (bot, transport) = confirmation_fixture(Arc::clone(&storage));

        bot.on_reaction_add(&approval("1", "alice", "101")).await.unwrap();

        let mottos = storage.mottos.lock().unwrap();
        assert!(mottos.iter().all(|m| m.primary_key.as_deref() != Some("recP")));
        assert_eq!(mottos.len(), 1);
        let reactions = transport.reactions_added();
        assert!(reactions.contains(&"♻️".to_string()));
        assert!(!reactions.contains(&"📥".to_string()));
    }

    #[tokio::test]
    async fn test_only_the_nominee_may_confirm() {
        let storage = Arc::new(FakeStorage::new().with_motto(stored_motto("recP", "", "100")));
        let (bot, transport) = confirmation_fixture(Arc::clone(&storage));

        bot.on_reaction_add(&approval("2", "bob", "101")).await.unwrap();

        assert_eq!(storage.mottos.lock().unwrap()[0].motto, "");
        assert!(transport.reactions_added().is_empty());
    }

    #[tokio::test]
    async fn test_reaction_without_pending_marker_is_ignored() {
        let nominated =
            guild_message("100", user("1", "alice"), "Ship it and iterate fast.", None);
        let trigger = guild_message("101", user("2", "bob"), "!motto", Some("100"));
        let storage = Arc::new(FakeStorage::new().with_motto(stored_motto("recP", "", "100")));
        let transport = Arc::new(
            FakeTransport::new(BOT_ID)
                .with_message(fetched(nominated, &[]))
                .with_message(fetched(trigger, &[])),
        );
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.on_reaction_add(&approval("1", "alice", "101")).await.unwrap();

        assert_eq!(storage.mottos.lock().unwrap()[0].motto, "");
        assert!(transport.reactions_added().is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_emoji_is_ignored() {
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(FakeTransport::new(BOT_ID));
        let bot = build_bot(BotConfig::default(), storage, Arc::clone(&transport));

        let mut reaction = approval("1", "alice", "101");
        reaction.emoji = "🔥".to_string();
        bot.on_reaction_add(&reaction).await.unwrap();

        assert!(transport.actions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approval_with_deleted_nomination() {
        // The trigger message survives but its reply target is gone.
        let trigger = guild_message("101", user("2", "bob"), "!motto", Some("100"));
        let storage = Arc::new(FakeStorage::new().with_motto(stored_motto("recP", "", "100")));
        let transport =
            Arc::new(FakeTransport::new(BOT_ID).with_message(fetched(trigger, &[("⏳", true)])));
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        bot.on_reaction_add(&approval("1", "alice", "101")).await.unwrap();

        assert!(transport.reactions_added().contains(&"🕵️".to_string()));
        assert_eq!(storage.mottos.lock().unwrap()[0].motto, "");
    }

    #[tokio::test]
    async fn test_delete_confirmation_erases_everything() {
        let request = dm_message("901", user("2", "bob"), "!delete");
        let mut prompt = dm_message("900", bot_user(), "Are you sure?");
        prompt.reference = Some(crate::types::MessageRef {
            channel_id: "dm-1".to_string(),
            message_id: "901".to_string(),
        });
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(
            FakeTransport::new(BOT_ID)
                .with_message(fetched(request, &[]))
                .with_message(fetched(prompt, &[("⏳", true)])),
        );
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        let reaction = ReactionEvent {
            emoji: "🗑️".to_string(),
            user_id: "2".to_string(),
            member: Some(user("2", "bob")),
            channel_id: "dm-1".to_string(),
            message_id: "900".to_string(),
            guild_id: None,
        };
        bot.on_reaction_add(&reaction).await.unwrap();

        assert_eq!(*storage.erased_users.lock().unwrap(), vec!["2".to_string()]);
        let actions = transport.actions.lock().unwrap();
        assert!(actions.contains(&TransportAction::RemovedReaction {
            message_id: "900".to_string(),
            emoji: "⏳".to_string(),
        }));
        assert!(actions.contains(&TransportAction::Reacted {
            message_id: "900".to_string(),
            emoji: "✅".to_string(),
        }));
        assert!(transport
            .sent_texts()
            .iter()
            .any(|t| t.contains("All of your data has been removed")));
    }

    #[tokio::test]
    async fn test_delete_confirmation_requires_bot_authorship() {
        let request = dm_message("901", user("2", "bob"), "!delete");
        let mut prompt = dm_message("900", user("3", "mallory"), "Are you sure?");
        prompt.reference = Some(crate::types::MessageRef {
            channel_id: "dm-1".to_string(),
            message_id: "901".to_string(),
        });
        let storage = Arc::new(FakeStorage::new());
        let transport = Arc::new(
            FakeTransport::new(BOT_ID)
                .with_message(fetched(request, &[]))
                .with_message(fetched(prompt, &[("⏳", true)])),
        );
        let bot = build_bot(BotConfig::default(), Arc::clone(&storage), Arc::clone(&transport));

        let reaction = ReactionEvent {
            emoji: "🗑️".to_string(),
            user_id: "2".to_string(),
            member: None,
            channel_id: "dm-1".to_string(),
            message_id: "900".to_string(),
            guild_id: None,
        };
        bot.on_reaction_add(&reaction).await.unwrap();

        assert!(storage.erased_users.lock().unwrap().is_empty());
    }
}
