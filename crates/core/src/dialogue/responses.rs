use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("no responses registered for `{0}`")]
    UnknownKey(String),
    #[error("could not parse response catalog: {0}")]
    Parse(String),
}

/// Canned reply variants keyed by intent or prompt key. Any variant of a key
/// is interchangeable with the others.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseCatalog {
    responses: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    responses: Vec<String>,
}

impl ResponseCatalog {
    pub fn new(responses: BTreeMap<String, Vec<String>>) -> Self {
        let responses =
            responses.into_iter().filter(|(_, variants)| !variants.is_empty()).collect();
        Self { responses }
    }

    /// Parses `{"<key>": {"responses": ["...", ...]}, ...}`. Keys missing
    /// from the document fall back to the built-in variants.
    pub fn from_json_str(raw: &str) -> Result<Self, ResponseError> {
        let parsed = serde_json::from_str::<BTreeMap<String, CatalogEntry>>(raw)
            .map_err(|error| ResponseError::Parse(error.to_string()))?;

        let mut catalog = Self::default();
        for (key, entry) in parsed {
            if !entry.responses.is_empty() {
                catalog.responses.insert(key, entry.responses);
            }
        }
        Ok(catalog)
    }

    pub fn variants(&self, key: &str) -> Option<&[String]> {
        self.responses.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.responses.contains_key(key)
    }
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        let entries: [(&str, [&str; 3]); 13] = [
            (
                "greetings",
                [
                    "Hi there! I can help you book a table. What's your name?",
                    "Hello! Let's find you a great restaurant. Who am I speaking with?",
                    "Good to hear from you! May I have your name to start the booking?",
                ],
            ),
            (
                "ask_name",
                [
                    "What's your name?",
                    "Could you tell me your name, please?",
                    "Who should I put the reservation under?",
                ],
            ),
            (
                "get_dietary_preferences",
                [
                    "Do you have any dietary preferences or restrictions?",
                    "Is there anything you don't eat, or any diet I should keep in mind?",
                    "Any dietary requirements I should know about?",
                ],
            ),
            (
                "get_cuisine_preferences",
                [
                    "What kind of cuisine are you in the mood for?",
                    "Do you have a cuisine in mind for today?",
                    "Which cuisine would you like?",
                ],
            ),
            (
                "get_party_size",
                [
                    "How many people will be joining?",
                    "For how many guests should I book?",
                    "How big is your party?",
                ],
            ),
            (
                "get_date_time",
                [
                    "When would you like the reservation?",
                    "What date and time works for you?",
                    "For which day and hour should I book?",
                ],
            ),
            (
                "get_location",
                [
                    "Which area should the restaurant be in?",
                    "Where would you like to eat?",
                    "Any preferred neighbourhood or city?",
                ],
            ),
            (
                "fallback",
                [
                    "Sorry, I didn't quite catch that. Could you say it again?",
                    "I'm not sure I understood. Could you rephrase?",
                    "Apologies, something went wrong on my side. Could you repeat that?",
                ],
            ),
            (
                "goodbye",
                [
                    "No problem, goodbye!",
                    "Alright, I'll stop here. Have a nice day!",
                    "Okay, ending the booking. Bye!",
                ],
            ),
            (
                "booking_complete",
                [
                    "Great, {name}! Looking for {cuisine} places in {location} for {party_size} on {date_time}.",
                    "Perfect, {name}. Searching {location} for {cuisine} food, {party_size} guests, {date_time}.",
                    "Thanks, {name}! Let me find a {cuisine} restaurant in {location} for {date_time}.",
                ],
            ),
            (
                "booking_complete_any_cuisine",
                [
                    "Great, {name}! Looking for places in {location} for {party_size} on {date_time}.",
                    "Perfect, {name}. Searching {location} for any cuisine, {party_size} guests, {date_time}.",
                    "Thanks, {name}! Let me find a restaurant in {location} for {date_time}.",
                ],
            ),
            (
                "recommendation",
                [
                    "I'd recommend {restaurant}.",
                    "{restaurant} looks like a great fit for you, {name}.",
                    "My top pick is {restaurant}.",
                ],
            ),
            (
                "no_recommendation",
                [
                    "I couldn't find a matching restaurant right now, but your details are saved.",
                    "Sorry, no restaurant matched this time. Your booking details are saved.",
                    "I wasn't able to find a restaurant, but I've kept your details.",
                ],
            ),
        ];

        let responses = entries
            .into_iter()
            .map(|(key, variants)| {
                (key.to_string(), variants.iter().map(|variant| variant.to_string()).collect())
            })
            .collect();
        Self { responses }
    }
}

/// Picks reply variants with an injectable random source so conversations
/// can be replayed deterministically.
pub struct ResponseGenerator {
    catalog: ResponseCatalog,
    rng: StdRng,
}

impl ResponseGenerator {
    pub fn new(catalog: ResponseCatalog, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { catalog, rng }
    }

    pub fn catalog(&self) -> &ResponseCatalog {
        &self.catalog
    }

    pub fn generate(&mut self, key: &str) -> Result<String, ResponseError> {
        self.catalog
            .variants(key)
            .and_then(|variants| variants.choose(&mut self.rng))
            .cloned()
            .ok_or_else(|| ResponseError::UnknownKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::domain::slot::Slot;

    use super::{ResponseCatalog, ResponseError, ResponseGenerator};

    #[test]
    fn default_catalog_covers_every_prompt_key() {
        let catalog = ResponseCatalog::default();
        for slot in Slot::ALL {
            assert!(catalog.contains(slot.prompt_key()), "missing {}", slot.prompt_key());
        }
        for key in [
            "greetings",
            "fallback",
            "goodbye",
            "booking_complete",
            "booking_complete_any_cuisine",
            "recommendation",
        ] {
            assert!(catalog.contains(key), "missing {key}");
        }
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let mut first = ResponseGenerator::new(ResponseCatalog::default(), Some(7));
        let mut second = ResponseGenerator::new(ResponseCatalog::default(), Some(7));

        for _ in 0..10 {
            assert_eq!(first.generate("fallback"), second.generate("fallback"));
        }
    }

    #[test]
    fn generated_reply_is_one_of_the_variants() {
        let mut generator = ResponseGenerator::new(ResponseCatalog::default(), Some(1));
        let reply = generator.generate("get_party_size").expect("known key");
        let variants = generator.catalog().variants("get_party_size").expect("variants");
        assert!(variants.contains(&reply));
    }

    #[test]
    fn unknown_key_is_reported() {
        let mut generator = ResponseGenerator::new(ResponseCatalog::new(BTreeMap::new()), None);
        assert_eq!(
            generator.generate("ask_name"),
            Err(ResponseError::UnknownKey("ask_name".to_string()))
        );
    }

    #[test]
    fn json_catalog_overrides_selected_keys() {
        let catalog = ResponseCatalog::from_json_str(
            r#"{"ask_name": {"responses": ["Name, please?"]}, "extra": {"responses": []}}"#,
        )
        .expect("valid catalog");

        assert_eq!(catalog.variants("ask_name"), Some(&["Name, please?".to_string()][..]));
        assert!(catalog.contains("get_location"));
        assert!(!catalog.contains("extra"));
        assert!(ResponseCatalog::from_json_str("not json").is_err());
    }
}
