use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Immutable bot configuration, assembled once at startup and passed
/// explicitly into every component constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub authentication: AuthConfig,
    pub channels: ChannelConfig,
    pub rules: RuleConfig,
    pub triggers: TriggerConfig,
    pub reactions: ReactionConfig,
    #[serde(default = "default_food_table")]
    pub food: HashMap<String, FoodCategory>,
    /// Extra celebratory reactions applied when a specific author's motto is
    /// stored, keyed by platform user ID.
    pub special_reactions: HashMap<String, Vec<String>>,
    #[serde(default = "default_true")]
    pub should_reply: bool,
    #[serde(default = "default_approval_reaction")]
    pub approval_reaction: String,
    #[serde(default = "default_confirm_delete_reaction")]
    pub confirm_delete_reaction: String,
    pub human_moderation_required: bool,
    #[serde(default = "default_retention_hours")]
    pub delete_unapproved_after_hours: i64,
    #[serde(default = "default_true")]
    pub trigger_on_mention: bool,
    #[serde(default = "default_global_interval")]
    pub minimum_random_interval_minutes: u64,
    #[serde(default = "default_user_interval")]
    pub minimum_random_interval_minutes_per_user: u64,
    pub leaderboard_link: Option<String>,
    pub support_channel: Option<String>,
    /// Platform user IDs allowed to announce maintenance mode.
    pub maintainers: Vec<String>,
    #[serde(default = "default_random_view")]
    pub random_source_view: String,
    /// Owning bot identifier, for deployments sharing one store.
    pub bot_id: Option<String>,
    #[serde(default = "default_watching_status")]
    pub watching_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub discord_token: String,
    pub airtable_key: String,
    pub airtable_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelConfig {
    /// When non-empty, only these channel names are watched.
    pub include: Vec<String>,
    /// Always ignored, regardless of the include list.
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub min_chars: usize,
    pub max_chars: usize,
    pub min_words: usize,
    /// Extra shape constraints; every pattern must match for acceptance.
    pub matching: Vec<String>,
    /// Rejection patterns; any match rejects.
    pub excluding: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            min_chars: 5,
            max_chars: 240,
            min_words: 2,
            matching: Vec::new(),
            excluding: vec![
                // A user-mention token anywhere in the text.
                r"<@!?\d+>".to_string(),
                // Nothing but digits, punctuation and whitespace.
                r"^[\d\s[:punct:]]+$".to_string(),
            ],
        }
    }
}

/// Named trigger groups. Each entry is a list of literal/regex strings;
/// `{bot}` is substituted with the bot's mention token at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub new_motto: Vec<String>,
    pub poke: Vec<String>,
    pub sorry: Vec<String>,
    pub love: Vec<String>,
    pub hug: Vec<String>,
    pub off_topic: Vec<String>,
    pub band: Vec<String>,
    pub party: Vec<String>,
    pub cow: Vec<String>,
    pub sleep: Vec<String>,
    pub wake: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            new_motto: vec!["!motto".to_string()],
            poke: vec![r"pokes? {bot}".to_string()],
            sorry: vec![r"sorry,? {bot}".to_string()],
            love: vec![r"I love( you,?)? {bot}".to_string()],
            hug: vec![r"hugs? {bot}".to_string()],
            off_topic: vec![r"off( +|-)topic".to_string()],
            band: vec![r"what('|’)?s +your +fav(ou?rite)? +band +{bot} ?\?*".to_string()],
            party: vec![r"(?:^|\s)part(?:a*y|ies)".to_string()],
            cow: vec![r"(?:^|\s)moo+(?:s|ing)?\b".to_string()],
            sleep: vec![r"(?:^|\s)(?:going )?down for maintenance".to_string()],
            wake: vec![r"(?:^|\s)back (?:up|online)\b".to_string()],
        }
    }
}

/// Emoji used for user-visible signaling. List-valued entries mean "pick one
/// at random" on each use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    pub success: String,
    pub pending: String,
    pub repeat: String,
    pub unknown: String,
    pub skynet: String,
    pub fishing: String,
    pub invalid: String,
    pub reject: String,
    pub deleted: String,
    pub delete_confirmed: String,
    pub invalid_emoji: String,
    pub valid_emoji: String,
    pub rate_limit: String,
    pub shrug: String,
    pub wave: String,
    pub sleep: String,
    pub confused_food: String,
    pub poke: Vec<String>,
    pub love: Vec<String>,
    pub hug: Vec<String>,
    pub party: Vec<String>,
    pub cow: Vec<String>,
    pub off_topic: Vec<String>,
    pub favorite_band: Vec<String>,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            success: "📥".to_string(),
            pending: "⏳".to_string(),
            repeat: "♻️".to_string(),
            unknown: "❓".to_string(),
            skynet: "🤖".to_string(),
            fishing: "🎣".to_string(),
            invalid: "🙅".to_string(),
            reject: "❌".to_string(),
            deleted: "🕵️".to_string(),
            delete_confirmed: "✅".to_string(),
            invalid_emoji: "⚠️".to_string(),
            valid_emoji: "👍".to_string(),
            rate_limit: "✋".to_string(),
            shrug: "🤷".to_string(),
            wave: "👋".to_string(),
            sleep: "😴".to_string(),
            confused_food: "😵".to_string(),
            poke: vec!["👉".to_string(), "😝".to_string()],
            love: vec!["💜".to_string(), "💙".to_string(), "💚".to_string(), "❤️".to_string()],
            hug: vec!["🤗".to_string()],
            party: vec![
                "🎉".to_string(),
                "🎊".to_string(),
                "🥳".to_string(),
                "🎈".to_string(),
                "✨".to_string(),
            ],
            cow: vec!["🐮".to_string(), "🐄".to_string()],
            off_topic: vec!["🤫".to_string(), "😶".to_string()],
            favorite_band: vec!["🇧".to_string(), "🇹".to_string(), "🇸".to_string()],
        }
    }
}

/// One food category: trigger emoji and the ordered response actions.
/// Responses hold either a literal emoji or the symbolic actions `echo` /
/// `party`, decoded by the pattern library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodCategory {
    pub triggers: OneOrMany,
    pub responses: Vec<String>,
}

/// A string or a list of strings, as the food table writes both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            OneOrMany::One(s) => std::slice::from_ref(s),
            OneOrMany::Many(list) => list,
        };
        slice.iter().map(String::as_str)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            authentication: AuthConfig::default(),
            channels: ChannelConfig::default(),
            rules: RuleConfig::default(),
            triggers: TriggerConfig::default(),
            reactions: ReactionConfig::default(),
            food: default_food_table(),
            special_reactions: HashMap::new(),
            should_reply: true,
            approval_reaction: default_approval_reaction(),
            confirm_delete_reaction: default_confirm_delete_reaction(),
            human_moderation_required: false,
            delete_unapproved_after_hours: default_retention_hours(),
            trigger_on_mention: true,
            minimum_random_interval_minutes: default_global_interval(),
            minimum_random_interval_minutes_per_user: default_user_interval(),
            leaderboard_link: None,
            support_channel: None,
            maintainers: Vec::new(),
            random_source_view: default_random_view(),
            bot_id: None,
            watching_status: default_watching_status(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a YAML file, then apply environment-variable
    /// overrides for the secrets. Any decode failure is fatal to startup.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: BotConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        info!(
            "Loaded configuration: {} motto trigger(s), moderation {}",
            config.triggers.new_motto.len(),
            if config.human_moderation_required { "required" } else { "not required" },
        );
        Ok(config)
    }

    /// Secrets may come from the environment instead of the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = env::var("DISCORD_TOKEN") {
            self.authentication.discord_token = token;
        }
        if let Ok(key) = env::var("AIRTABLE_KEY") {
            self.authentication.airtable_key = key;
        }
        if let Ok(base) = env::var("AIRTABLE_BASE") {
            self.authentication.airtable_base = base;
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_approval_reaction() -> String {
    "👍".to_string()
}

fn default_confirm_delete_reaction() -> String {
    "🗑️".to_string()
}

fn default_retention_hours() -> i64 {
    24
}

fn default_global_interval() -> u64 {
    5
}

fn default_user_interval() -> u64 {
    30
}

fn default_random_view() -> String {
    "Approved".to_string()
}

fn default_watching_status() -> String {
    "out for mottos".to_string()
}

fn category(triggers: &[&str], responses: &[&str]) -> FoodCategory {
    FoodCategory {
        triggers: OneOrMany::Many(triggers.iter().map(|s| s.to_string()).collect()),
        responses: responses.iter().map(|s| s.to_string()).collect(),
    }
}

/// The built-in food-reaction table: trigger emoji mapped to ordered response
/// actions, where `echo` repeats the trigger back and `party` fires a
/// celebratory burst.
pub fn default_food_table() -> HashMap<String, FoodCategory> {
    let mut table = HashMap::new();
    table.insert(
        "standard".to_string(),
        category(
            &[
                "🍇", "🍈", "🍉", "🍊", "🍌", "🍍", "🥭", "🍎", "🍏", "🍐", "🍒", "🍓", "🫐",
                "🥝", "🍅", "🫒", "🥥", "🥑", "🥔", "🌽", "🥜", "🌰", "🍞", "🥐", "🥖", "🫓",
                "🥨", "🥯", "🧇", "🍖", "🍗", "🥓", "🍔", "🍕", "🌭", "🍟", "🥪", "🌮", "🌯",
                "🫔", "🧆", "🍳", "🍿", "🍘", "🍙", "🍠", "🍢", "🥮", "🍡", "🥟", "🥠", "🦪",
                "🍩", "🍪", "🍰", "🧁", "🍬", "🍭", "🍼", "🥛", "☕", "🍵", "🥤", "🧋", "🧃",
                "🧉",
            ],
            &["😋", "echo"],
        ),
    );
    table.insert("chocolate".to_string(), category(&["🍫"], &["😋", "🍫", "💜"]));
    table.insert(
        "alcohol".to_string(),
        category(&["🍶", "🍾", "🍷", "🍸", "🍹", "🍺", "🍻", "🥂", "🥃"], &["echo", "🥴"]),
    );
    table.insert("teapot".to_string(), category(&["🫖"], &["😋", "☕"]));
    table.insert(
        "cutlery_foods".to_string(),
        category(&["🥘", "🫕", "🥗", "🍝", "🥧", "🥙", "🥞", "🥩"], &["😋", "echo", "🍴"]),
    );
    table.insert(
        "chopstick_foods".to_string(),
        category(&["🍲", "🍱", "🍚", "🍛", "🍜", "🍣", "🍤", "🍥", "🥡"], &["😋", "echo", "🥢"]),
    );
    table.insert(
        "spoon_foods".to_string(),
        category(&["🥣", "🍧", "🍨", "🍮", "🍯"], &["😋", "echo", "🥄"]),
    );
    table.insert("tongue_foods".to_string(), category(&["🍦"], &["👅", "echo", "😋"]));
    table.insert("rabbit_food".to_string(), category(&["🥬", "🥕"], &["🐰"]));
    table.insert("mouse_food".to_string(), category(&["🧀"], &["🐭"]));
    table.insert(
        "weird_foods".to_string(),
        category(&["🍋", "🍆", "🍑", "🫑", "🥒", "🥦", "🧄", "🧅", "🍄", "🥚", "🧈"], &["😕"]),
    );
    table.insert("eye_roll_foods".to_string(), category(&["🍽️"], &["🙄"]));
    table.insert(
        "dangerous_foods".to_string(),
        category(&["💣", "🧨", "🗡️", "🔪", "🦠", "🧫"], &["🙅", "😨"]),
    );
    table.insert("nausea".to_string(), category(&["🚬"], &["🙅", "🤢"]));
    table.insert(
        "vomit".to_string(),
        category(&["🐛", "🐜", "🪲", "🦟", "🐞", "🦗", "🪰"], &["🤢", "🤮", "😭"]),
    );
    table.insert(
        "bee".to_string(),
        category(&["🐝"], &["🙅", "echo", "🌻", "👉", "🍯", "😊"]),
    );
    table.insert("baby".to_string(), category(&["👶"], &["🙅", "😢"]));
    table.insert("alien".to_string(), category(&["🛸"], &["👽"]));
    table.insert("zombie".to_string(), category(&["🧠"], &["🧟"]));
    table.insert(
        "vampire".to_string(),
        category(&["🩸", "🆎", "🅱️", "🅾️", "🅰️"], &["🧛"]),
    );
    table.insert("spicy".to_string(), category(&["🌶️"], &["🥵"]));
    table.insert("ice".to_string(), category(&["🧊"], &["🥶"]));
    table.insert("bone".to_string(), category(&["🦴"], &["🐶"]));
    table.insert("celebrate".to_string(), category(&["🎂"], &["😋", "party"]));
    table.insert("money".to_string(), category(&["💸", "💰", "💵"], &["🤑"]));
    table
}
