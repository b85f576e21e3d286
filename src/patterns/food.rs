use anyhow::{Context, Result};
use log::info;
use regex::Regex;
use std::collections::HashMap;

use crate::config::FoodCategory;

/// A single step of a food response: a literal emoji reaction, echoing the
/// trigger emoji back, or firing a celebratory burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    Emoji(String),
    Echo,
    Party,
}

fn convert_response(raw: &str) -> ResponseAction {
    match raw {
        "echo" => ResponseAction::Echo,
        "party" => ResponseAction::Party,
        other => ResponseAction::Emoji(other.to_string()),
    }
}

// Character class covering the emoji blocks the bot recognizes: symbols and
// pictographs, dingbats, misc technical, and the variation selector.
const EMOJI_CLASS: &str = "\u{1F000}-\u{1FAFF}\u{2300}-\u{23FF}\u{2600}-\u{27BF}\u{2B00}-\u{2BFF}\u{FE0F}";

/// Whether a char falls in the recognized emoji blocks.
pub fn is_emoji_char(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF | 0x2300..=0x23FF | 0x2600..=0x27BF | 0x2B00..=0x2BFF)
}

/// Whether the text is a single emoji once the variation selector and skin
/// tone modifiers are stripped. A regional-indicator pair (a flag) counts.
pub fn is_single_emoji(text: &str) -> bool {
    let chars: Vec<char> = text
        .chars()
        .filter(|&c| c != '\u{FE0F}' && !matches!(c as u32, 0x1F3FB..=0x1F3FF))
        .collect();
    match chars.as_slice() {
        [c] => is_emoji_char(*c),
        [a, b] => {
            let regional = 0x1F1E6..=0x1F1FF;
            regional.contains(&(*a as u32)) && regional.contains(&(*b as u32))
        }
        _ => false,
    }
}

fn first_scalar(trigger: &str) -> Option<char> {
    trigger.chars().find(|&c| c != '\u{FE0F}')
}

/// Lookup tables for the "feed the bot" easter egg, built once from the
/// configured food-category table.
///
/// `food_regex` matches a feeding phrase ending in a recognized food emoji;
/// `not_food_regex` matches the same phrase shape over *any* emoji so the bot
/// can tell recognized food from something inedible.
pub struct FoodLookups {
    lookup: HashMap<char, Vec<ResponseAction>>,
    pub food_regex: Regex,
    pub not_food_regex: Regex,
}

impl FoodLookups {
    pub fn compile(bot_token: &str, food: &HashMap<String, FoodCategory>) -> Result<Self> {
        let mut lookup = HashMap::new();
        for item in food.values() {
            let responses: Vec<ResponseAction> =
                item.responses.iter().map(|r| convert_response(r)).collect();
            for trigger in item.triggers.iter() {
                if let Some(c) = first_scalar(trigger) {
                    lookup.insert(c, responses.clone());
                }
            }
        }

        let food_chars: String = lookup.keys().collect();
        let food_regex = Regex::new(&format!(
            r"(?i)(?:feed|pour)?s?\s{}.*([{}])",
            bot_token, food_chars
        ))
        .context("failed to compile food pattern")?;
        let not_food_regex = Regex::new(&format!(
            r"(?i)(?:feed|pour)?s?\s{}.*([{}])",
            bot_token, EMOJI_CLASS
        ))
        .context("failed to compile any-emoji food pattern")?;

        info!("Loaded {} types of food in {} categories", lookup.len(), food.len());

        Ok(Self { lookup, food_regex, not_food_regex })
    }

    /// The response actions for a recognized food character.
    pub fn actions(&self, food_char: char) -> Option<&[ResponseAction]> {
        self.lookup.get(&food_char).map(Vec::as_slice)
    }

    /// The recognized food character in a feeding phrase, if any.
    pub fn fed_food(&self, text: &str) -> Option<char> {
        self.food_regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().chars().next())
    }

    /// Whether the phrase feeds the bot some emoji it does not recognize.
    pub fn fed_something_else(&self, text: &str) -> bool {
        self.not_food_regex.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_food_table;

    const BOT: &str = "<@!?42>";

    #[test]
    fn test_food_lookup_actions() {
        let lookups = FoodLookups::compile(BOT, &default_food_table()).unwrap();
        assert_eq!(lookups.actions('🧀'), Some(&[ResponseAction::Emoji("🐭".to_string())][..]));
        let cake = lookups.actions('🎂').unwrap();
        assert_eq!(cake.last(), Some(&ResponseAction::Party));
        let grapes = lookups.actions('🍇').unwrap();
        assert!(grapes.contains(&ResponseAction::Echo));
    }

    #[test]
    fn test_feeding_phrase_recognized() {
        let lookups = FoodLookups::compile(BOT, &default_food_table()).unwrap();
        assert_eq!(lookups.fed_food("feeds <@42> a lovely 🍕"), Some('🍕'));
        assert_eq!(lookups.fed_food("pours <@!42> some ☕"), Some('☕'));
        assert_eq!(lookups.fed_food("just chatting about 🍕"), None);
    }

    #[test]
    fn test_unrecognized_food_falls_through() {
        let lookups = FoodLookups::compile(BOT, &default_food_table()).unwrap();
        let text = "feeds <@42> a 🌋";
        assert_eq!(lookups.fed_food(text), None);
        assert!(lookups.fed_something_else(text));
    }

    #[test]
    fn test_single_emoji_validation() {
        assert!(is_single_emoji("🦄"));
        assert!(is_single_emoji("🅱️"));
        assert!(is_single_emoji("👍🏽"));
        assert!(is_single_emoji("🇳🇿"));
        assert!(!is_single_emoji("ab"));
        assert!(!is_single_emoji("🦄🦄"));
        assert!(!is_single_emoji(""));
    }
}
