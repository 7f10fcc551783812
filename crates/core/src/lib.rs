pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;

pub use dialogue::{
    AccuracyTracker, BookingSession, ConfirmationError, ConfirmationState, DialoguePhase,
    HistoryEntry, ResponseCatalog, ResponseError, ResponseGenerator, Speaker, TemplateFiller,
};
pub use domain::booking::{BookingDetails, BookingRecord, SessionId, SessionOutcome};
pub use domain::intent::{Intent, IntentRecognition};
pub use domain::slot::{
    ExtractedValue, PartySize, Preference, Slot, SlotExtraction, SlotValue, NO_PREFERENCE_SENTINEL,
};
pub use errors::{ApplicationError, DomainError};
