use anyhow::Result;
use chrono::Utc;
use log::{debug, info};

use crate::storage::RandomFilter;
use crate::types::{MessageEvent, Motto};

use super::MottoBot;

impl MottoBot {
    /// Classify a guild message and, when it nominates a motto, run the full
    /// validation/dedup/persist pipeline.
    pub(crate) async fn process_suggestion(&self, message: &MessageEvent) -> Result<()> {
        // A leading mention with no reply reference (or no trigger match) is
        // a tag request, never a suggestion.
        if let Some(tag_content) = self.patterns.tag_content(&message.content) {
            if message.reference.is_none()
                || self.patterns.matching_trigger(&message.content).is_none()
            {
                let tag_content = tag_content.to_string();
                return self.process_tag(message, &tag_content).await;
            }
        }

        let Some(trigger) = self.patterns.matching_trigger(&message.content) else {
            return self.easter_eggs(message).await;
        };

        // Somebody convinced the bot to say a trigger phrase.
        if message.author.id == self.transport.bot_user_id() {
            self.responder.skynet_prevention(message).await;
            return Ok(());
        }

        let Some(reference) = &message.reference else {
            self.responder.not_reply(message).await;
            return Ok(());
        };

        let nominated = match self
            .transport
            .fetch_message(&reference.channel_id, &reference.message_id)
            .await?
        {
            Some(fetched) => fetched.message,
            None => {
                self.responder.deleted(message).await;
                return Ok(());
            }
        };

        if nominated.author.id == self.transport.bot_user_id() {
            self.responder.skynet_prevention(message).await;
            return Ok(());
        }

        let excerpt = self.patterns.strip_trigger(trigger, &message.content);
        if !excerpt.is_empty() && !nominated.content.contains(&excerpt) {
            debug!(
                "Quoted excerpt {:?} not found in existing message {:?}",
                excerpt, nominated.content
            );
            self.responder.not_reply(message).await;
            return Ok(());
        }

        let candidate = if excerpt.is_empty() { nominated.content.clone() } else { excerpt };

        if !self.rules.is_valid(&candidate) {
            self.responder.invalid(message).await;
            return Ok(());
        }

        if nominated.author.id == message.author.id {
            self.responder.fishing(message).await;
            return Ok(());
        }

        info!("Motto suggestion incoming: {:?}", candidate);

        let cleaned = self.normalizer.clean(&candidate, self.transport.as_ref()).await;
        if self
            .storage
            .has_matching_motto(&cleaned, Some(&nominated.message_id))
            .await?
        {
            self.responder.duplicate(message).await;
            return Ok(());
        }

        // Independent read-then-maybe-write lookups; issue them together.
        let (nominee, nominator) = tokio::try_join!(
            self.storage.get_or_add_member(&nominated.author),
            self.storage.get_or_add_member(&message.author),
        )?;
        debug!(
            "Fetched/added nominee {:?} and nominator {:?}",
            nominee.username, nominator.username
        );

        let auto_approved = !self.config.human_moderation_required;
        let motto = Motto {
            primary_key: None,
            motto: if auto_approved { cleaned.clone() } else { String::new() },
            message_id: nominated.message_id.clone(),
            date: nominated.timestamp,
            member: Some(nominee.primary_key.clone()),
            nominated_by: Some(nominator.primary_key.clone()),
            approved: auto_approved,
            approved_by_author: false,
            bot_id: self.config.bot_id.clone(),
        };
        self.storage.insert_motto(&motto).await?;

        if auto_approved {
            self.responder
                .stored(message, &nominated.author.id, &nominated.content)
                .await;
        } else {
            self.responder.pending(message).await;
        }

        tokio::try_join!(
            self.storage.update_name(&nominee, &nominated.author),
            self.storage.update_name(&nominator, &message.author),
        )?;
        Ok(())
    }

    /// A message tagging the bot without nominating anything: a wave, or a
    /// rate-limited random-motto request.
    pub(crate) async fn process_tag(&self, message: &MessageEvent, content: &str) -> Result<()> {
        info!("Tagged message incoming: {:?}", message.content);

        let content = content.trim();
        if content.is_empty() {
            self.responder.wave(message).await;
            return Ok(());
        }

        let Some(caps) = self.patterns.random_tag.captures(content) else {
            return Ok(());
        };
        let partial = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        info!(
            "Call to !random with filter {:?} from {}",
            partial, message.author.username
        );

        if !self.rate_limiter.allowed(&message.author.id, Utc::now()).await {
            self.responder.rate_limited(message).await;
            return Ok(());
        }

        let filter = RandomFilter::parse(partial);
        let _ = self.transport.trigger_typing(&message.channel_id).await;
        match self.storage.get_random_motto(filter.as_ref()).await? {
            Some((motto, author)) => {
                self.transport
                    .reply(
                        &message.channel_id,
                        &message.message_id,
                        &format!("{}—{}", motto.motto, author.display_name()),
                    )
                    .await?;
            }
            None => self.responder.shrug(message).await,
        }
        Ok(())
    }

    /// Playful responses for non-trigger messages. Every matching pattern
    /// fires; food is recognized-or-confused, never both.
    pub(crate) async fn easter_eggs(&self, message: &MessageEvent) -> Result<()> {
        let content = &message.content;
        if self.patterns.poke.is_match(content) {
            self.responder.poke(message).await;
        }
        if self.patterns.sorry.is_match(content) {
            self.responder.love(message).await;
        }
        if self.patterns.love.is_match(content) {
            self.responder.love(message).await;
        }
        if self.patterns.hug.is_match(content) {
            self.responder.hug(message).await;
        }
        if self.patterns.band.is_match(content) {
            self.responder.favorite_band(message).await;
        }
        if self.patterns.party.is_match(content) {
            self.responder.party(message).await;
        }
        if self.patterns.off_topic.is_match(content) {
            self.responder.off_topic(message).await;
        }
        if self.patterns.cow.is_match(content) {
            self.responder.cow(message).await;
        }
        if self.config.maintainers.contains(&message.author.id) {
            if self.patterns.sleep.is_match(content) {
                self.responder.sleep(message).await;
            }
            if self.patterns.wake.is_match(content) {
                self.responder.wave(message).await;
            }
        }
        if let Some(food_char) = self.patterns.food.fed_food(content) {
            self.responder.food(message, food_char, &self.patterns.food).await;
        } else if self.patterns.food.fed_something_else(content) {
            self.responder.unrecognised_food(message).await;
        }
        Ok(())
    }
}
