use serde::{Deserialize, Serialize};

use crate::domain::slot::SlotExtraction;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Greetings,
    ProvideDetails,
    Stop,
    Fallback,
    Other(String),
}

impl Intent {
    /// Labels offered to the language model as intent categories.
    pub const CATEGORIES: [&'static str; 4] = ["greetings", "provide_details", "stop", "fallback"];

    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "greetings" | "greeting" => Self::Greetings,
            "provide_details" | "booking_details" | "provide_info" => Self::ProvideDetails,
            "stop" | "goodbye" | "cancel" => Self::Stop,
            "fallback" | "" => Self::Fallback,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Greetings => "greetings",
            Self::ProvideDetails => "provide_details",
            Self::Stop => "stop",
            Self::Fallback => "fallback",
            Self::Other(label) => label,
        }
    }
}

/// Result of one call to the intent recognizer, already validated and typed.
#[derive(Clone, Debug, PartialEq)]
pub struct IntentRecognition {
    pub intent: Intent,
    pub extraction: SlotExtraction,
    pub confidence: f64,
}

impl IntentRecognition {
    pub fn fallback(confidence: f64) -> Self {
        Self { intent: Intent::Fallback, extraction: SlotExtraction::default(), confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn parse_normalizes_known_labels() {
        assert_eq!(Intent::parse("Greetings"), Intent::Greetings);
        assert_eq!(Intent::parse("provide details"), Intent::ProvideDetails);
        assert_eq!(Intent::parse("goodbye"), Intent::Stop);
        assert_eq!(Intent::parse(""), Intent::Fallback);
        assert_eq!(Intent::parse("ask-menu"), Intent::Other("ask_menu".to_string()));
    }
}
