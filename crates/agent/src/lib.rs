//! Conversation runtime for the table booking assistant.
//!
//! The language model only ever translates: it classifies intents, pulls
//! booking details out of an utterance and phrases search queries. Which
//! slot to confirm, what to ask next and when the booking is done are
//! decided by the dialogue state machine in `tablebook-core`.
//!
//! - `nlu` - intent recognition and yes/no answers
//! - `search` - restaurant lookup and recommendation
//! - `speech` - console and live-audio channels
//! - `runtime` - the turn loop tying them together

pub mod llm;
pub mod nlu;
pub mod runtime;
pub mod search;
pub mod speech;

pub use llm::{ChatCompletionsClient, LlmClient, LlmError, ResponseFormat};
pub use nlu::{IntentRecognizer, LlmIntentRecognizer, NluError};
pub use runtime::{Collaborators, DialogueRuntime, RuntimeSettings, SessionSummary, TurnOutcome};
pub use search::{
    LlmRestaurantAdvisor, PlacesTextSearch, Recommendation, RestaurantAdvisor,
    RestaurantCandidate, RestaurantSearch, SearchError,
};
pub use speech::{ConsoleSpeech, SpeechChannel, SpeechError, VoiceSpeech};
