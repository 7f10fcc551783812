pub mod accuracy;
pub mod confirmation;
pub mod responses;
pub mod session;
pub mod templates;

pub use accuracy::AccuracyTracker;
pub use confirmation::{ConfirmationError, ConfirmationState};
pub use responses::{ResponseCatalog, ResponseError, ResponseGenerator};
pub use session::{BookingSession, DialoguePhase, HistoryEntry, Speaker};
pub use templates::TemplateFiller;
