use anyhow::{Context, Result};
use regex::Regex;

use crate::config::BotConfig;

pub mod food;

use food::FoodLookups;

/// The mention token for a bot user ID, as it appears in message content.
fn mention_token(bot_user_id: &str) -> String {
    format!("<@!?{}>", bot_user_id)
}

/// A named trigger group compiled to case-insensitive matchers; a text
/// matches the set when any pattern matches.
pub struct PatternSet(Vec<Regex>);

impl PatternSet {
    fn compile(sources: &[String], bot_token: &str) -> Result<Self> {
        let mut compiled = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.replace("{bot}", bot_token);
            let regex = Regex::new(&format!("(?i){}", source))
                .with_context(|| format!("failed to compile trigger pattern {:?}", source))?;
            compiled.push(regex);
        }
        Ok(Self(compiled))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.iter().any(|r| r.is_match(text))
    }
}

/// Every matcher the bot needs, compiled once at startup from configuration
/// and the connected bot's user ID.
pub struct SuggestionPatterns {
    /// "Bot is mentioned at message start".
    pub mention: Regex,
    /// New-motto triggers, anchored at message start. Contains the mention
    /// pattern first when mention-triggering is enabled.
    pub new_motto: Vec<Regex>,
    /// Leading-mention tag capture; group 1 is the content after the mention.
    pub tag: Regex,
    /// "!random [partial]" over a tag's captured content.
    pub random_tag: Regex,
    /// "!emoji [emoji]" DM command shape; group 1 is the argument.
    pub emoji_command: Regex,
    pub poke: PatternSet,
    pub sorry: PatternSet,
    pub love: PatternSet,
    pub hug: PatternSet,
    pub off_topic: PatternSet,
    pub band: PatternSet,
    pub party: PatternSet,
    pub cow: PatternSet,
    pub sleep: PatternSet,
    pub wake: PatternSet,
    pub food: FoodLookups,
}

impl SuggestionPatterns {
    pub fn compile(bot_user_id: &str, config: &BotConfig) -> Result<Self> {
        let bot = mention_token(bot_user_id);

        let mention =
            Regex::new(&format!("^{}", bot)).context("failed to compile mention pattern")?;

        let mut new_motto = Vec::new();
        if config.trigger_on_mention {
            new_motto.push(mention.clone());
        }
        for source in &config.triggers.new_motto {
            let source = source.replace("{bot}", &bot);
            let regex = Regex::new(&format!("(?i)^{}", source))
                .with_context(|| format!("failed to compile motto trigger {:?}", source))?;
            new_motto.push(regex);
        }

        let tag = Regex::new(&format!(r"^{}\s*(.*)$", bot))
            .context("failed to compile tag pattern")?;
        let random_tag =
            Regex::new(r"(?i)^!random\b\s*(.*)$").context("failed to compile random tag")?;
        let emoji_command =
            Regex::new(r"(?i)^!emoji\b\s*(.*)$").context("failed to compile emoji command")?;

        Ok(Self {
            mention,
            new_motto,
            tag,
            random_tag,
            emoji_command,
            poke: PatternSet::compile(&config.triggers.poke, &bot)?,
            sorry: PatternSet::compile(&config.triggers.sorry, &bot)?,
            love: PatternSet::compile(&config.triggers.love, &bot)?,
            hug: PatternSet::compile(&config.triggers.hug, &bot)?,
            off_topic: PatternSet::compile(&config.triggers.off_topic, &bot)?,
            band: PatternSet::compile(&config.triggers.band, &bot)?,
            party: PatternSet::compile(&config.triggers.party, &bot)?,
            cow: PatternSet::compile(&config.triggers.cow, &bot)?,
            sleep: PatternSet::compile(&config.triggers.sleep, &bot)?,
            wake: PatternSet::compile(&config.triggers.wake, &bot)?,
            food: FoodLookups::compile(&bot, &config.food)?,
        })
    }

    /// The first new-motto trigger matching the start of the text.
    pub fn matching_trigger(&self, text: &str) -> Option<&Regex> {
        self.new_motto.iter().find(|t| t.is_match(text))
    }

    /// The content a tag message carries after the leading mention.
    pub fn tag_content<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.tag
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Strip a matched trigger from the front of a message, then surrounding
    /// whitespace and quote characters; the remainder is a quoted excerpt.
    pub fn strip_trigger(&self, trigger: &Regex, text: &str) -> String {
        trigger
            .replace(text, "")
            .trim()
            .trim_matches(|c| matches!(c, '\'' | '"' | '“' | '”'))
            .trim()
            .to_string()
    }
}
