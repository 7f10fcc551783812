use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use tablebook_core::domain::intent::{Intent, IntentRecognition};
use tablebook_core::domain::slot::{
    PartySize, Preference, Slot, SlotExtraction, NO_PREFERENCE_SENTINEL,
};

use crate::llm::{complete_json, LlmClient, LlmError};

#[derive(Debug, Error)]
pub enum NluError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed recognizer reply: {0}")]
    MalformedReply(String),
}

#[async_trait]
pub trait IntentRecognizer: Send + Sync {
    /// Classifies the utterance and extracts booking details. `last_asked`
    /// lets a bare "no" count as "no preference" for the preference slots.
    async fn recognize_intent(
        &self,
        utterance: &str,
        last_asked: Option<Slot>,
    ) -> Result<IntentRecognition, NluError>;

    /// `true` for an affirmative answer, `false` for a negative one.
    async fn recognize_answer(&self, utterance: &str) -> Result<bool, NluError>;
}

pub struct LlmIntentRecognizer {
    llm: Arc<dyn LlmClient>,
    confidence_threshold: f64,
}

impl LlmIntentRecognizer {
    pub fn new(llm: Arc<dyn LlmClient>, confidence_threshold: f64) -> Self {
        Self { llm, confidence_threshold }
    }
}

#[async_trait]
impl IntentRecognizer for LlmIntentRecognizer {
    async fn recognize_intent(
        &self,
        utterance: &str,
        last_asked: Option<Slot>,
    ) -> Result<IntentRecognition, NluError> {
        let prompt = intent_prompt(utterance, last_asked);
        let reply = complete_json(self.llm.as_ref(), &prompt).await?;
        let recognition = parse_recognition(reply)?;

        if recognition.confidence < self.confidence_threshold {
            tracing::debug!(
                event_name = "nlu.intent.low_confidence",
                intent = recognition.intent.as_str(),
                confidence = recognition.confidence,
                threshold = self.confidence_threshold,
                "intent below confidence threshold, treating as fallback"
            );
            return Ok(IntentRecognition::fallback(recognition.confidence));
        }

        Ok(recognition)
    }

    async fn recognize_answer(&self, utterance: &str) -> Result<bool, NluError> {
        let reply = complete_json(self.llm.as_ref(), &answer_prompt(utterance)).await?;
        parse_answer(&reply)
    }
}

fn intent_prompt(utterance: &str, last_asked: Option<Slot>) -> String {
    let context = match last_asked {
        Some(slot) if slot.accepts_no_preference() => format!(
            "The last question asked to the user was about {label}. If the user answers with \
             a simple negative such as \"No\", \"None\", \"Nope\", \"Not really\" or \"Anything\", \
             treat it as having no {label} and set \"{key}\" to \"{NO_PREFERENCE_SENTINEL}\".\n",
            label = slot.label(),
            key = slot.as_str(),
        ),
        _ => String::new(),
    };

    format!(
        "You are an intent recognition system for a restaurant booking voice assistant.\n\
         Identify the most appropriate intent category for the user's input from: {categories}.\n\
         {context}\n\
         User input: \"{utterance}\"\n\n\
         Respond with a JSON object containing:\n\
         1. \"intent\": the most appropriate intent category\n\
         2. \"confidence\": your confidence score between 0 and 1\n\
         3. \"extracted_info\": an object with these keys:\n\
            - \"name\": the user's first name\n\
            - \"dietary_preferences\": dietary preferences or restrictions. If the user says they \
         have none, use \"{NO_PREFERENCE_SENTINEL}\".\n\
            - \"culinary_preferences\": preferred cuisine. If the user has no preference, use \
         \"{NO_PREFERENCE_SENTINEL}\".\n\
            - \"party_size\": number of guests, always a positive integer\n\
            - \"booking_date_time\": requested date and time\n\
            - \"booking_location\": preferred area of the restaurant\n\
         Use an empty string for every field the input does not mention.\n\n\
         JSON Response:",
        categories = Intent::CATEGORIES.join(", "),
    )
}

fn answer_prompt(utterance: &str) -> String {
    format!(
        "Your task is to recognize whether the sentence means \"YES\" or \"NO\".\n\
         For example \"yes, sure\", \"yeah\" and \"it's correct\" mean YES; \"no\", \"wrong\" and \
         \"no, sorry\" mean NO.\n\
         Respond with a JSON object {{\"response\": true}} for YES or {{\"response\": false}} for NO.\n\n\
         User input: \"{utterance}\"\n\n\
         JSON Response:"
    )
}

#[derive(Debug, Deserialize)]
struct RawRecognition {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    extracted_info: Option<Value>,
}

fn parse_recognition(reply: Value) -> Result<IntentRecognition, NluError> {
    let raw: RawRecognition = serde_json::from_value(reply)
        .map_err(|error| NluError::MalformedReply(error.to_string()))?;

    let intent = raw.intent.as_deref().map(Intent::parse).unwrap_or(Intent::Fallback);
    let confidence = raw.confidence.as_ref().and_then(number_like).unwrap_or(0.0).clamp(0.0, 1.0);
    let extraction = match raw.extracted_info {
        Some(Value::Object(fields)) => parse_extraction(&fields),
        _ => SlotExtraction::default(),
    };

    Ok(IntentRecognition { intent, extraction, confidence })
}

/// Types the model's free-form extraction. Unknown keys are ignored and
/// values that do not fit their slot are dropped.
pub fn parse_extraction(fields: &Map<String, Value>) -> SlotExtraction {
    let mut extraction = SlotExtraction::default();

    for (key, value) in fields {
        let Some(slot) = Slot::parse(key) else {
            tracing::debug!(event_name = "nlu.extraction.unknown_key", key = %key);
            continue;
        };

        match slot {
            Slot::Name => extraction.name = plain_text(value),
            Slot::BookingDateTime => extraction.booking_date_time = plain_text(value),
            Slot::BookingLocation => extraction.booking_location = plain_text(value),
            Slot::DietaryPreferences => {
                extraction.dietary_preferences = text(value).as_deref().and_then(Preference::parse)
            }
            Slot::CulinaryPreferences => {
                extraction.culinary_preferences =
                    text(value).as_deref().and_then(Preference::parse)
            }
            Slot::PartySize => extraction.party_size = party_size(value),
        }
    }

    extraction
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

// The sentinel only means something for the preference slots.
fn plain_text(value: &Value) -> Option<String> {
    text(value).filter(|text| !text.eq_ignore_ascii_case(NO_PREFERENCE_SENTINEL))
}

fn party_size(value: &Value) -> Option<PartySize> {
    let guests = number_like(value)?;
    if guests.fract() != 0.0 || guests < 1.0 || guests > f64::from(u32::MAX) {
        return None;
    }
    PartySize::new(guests as u32)
}

fn number_like(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn parse_answer(reply: &Value) -> Result<bool, NluError> {
    match reply.get("response") {
        Some(Value::Bool(answer)) => Ok(*answer),
        Some(Value::String(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            other => Err(NluError::MalformedReply(format!("unexpected answer `{other}`"))),
        },
        _ => Err(NluError::MalformedReply(format!("missing boolean `response` in {reply}"))),
    }
}
