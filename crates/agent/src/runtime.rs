use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use tablebook_core::config::DialogueConfig;
use tablebook_core::dialogue::{BookingSession, DialoguePhase, ResponseGenerator, TemplateFiller};
use tablebook_core::domain::booking::{BookingDetails, BookingRecord, SessionId, SessionOutcome};
use tablebook_core::domain::intent::Intent;
use tablebook_core::domain::slot::Slot;
use tablebook_core::errors::{ApplicationError, DomainError};
use tablebook_db::repositories::BookingRepository;

use crate::nlu::IntentRecognizer;
use crate::search::{Recommendation, RestaurantAdvisor, RestaurantSearch};
use crate::speech::{SpeechChannel, SpeechError};

const BOOKING_COMPLETE: &str = "booking_complete";
const BOOKING_COMPLETE_ANY_CUISINE: &str = "booking_complete_any_cuisine";
const LAST_RESORT_FALLBACK: &str = "Sorry, something went wrong. Could you say that again?";
const MAX_CONSECUTIVE_SPEECH_FAILURES: u32 = 3;

/// External services a conversation talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn IntentRecognizer>,
    pub repository: Arc<dyn BookingRepository>,
    pub search: Option<Arc<dyn RestaurantSearch>>,
    pub advisor: Option<Arc<dyn RestaurantAdvisor>>,
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub turn_timeout: Duration,
    pub top_picks: usize,
}

impl RuntimeSettings {
    pub fn from_config(config: &DialogueConfig) -> Self {
        Self {
            turn_timeout: Duration::from_secs(config.turn_timeout_secs),
            top_picks: config.top_picks,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub finished: bool,
}

impl TurnOutcome {
    fn carry_on(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), finished: false }
    }

    fn finished(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), finished: true }
    }
}

/// End-of-conversation report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub outcome: Option<SessionOutcome>,
    pub accuracy_ratio: Option<f64>,
    pub turn_count: u32,
    pub details: BookingDetails,
    pub recommendations: Vec<Recommendation>,
}

/// Drives one booking conversation turn by turn. Each turn finishes its
/// state change before the next utterance is read.
pub struct DialogueRuntime {
    session: BookingSession,
    collaborators: Collaborators,
    responses: ResponseGenerator,
    settings: RuntimeSettings,
    recommendations: Vec<Recommendation>,
}

impl DialogueRuntime {
    pub fn new(
        collaborators: Collaborators,
        responses: ResponseGenerator,
        settings: RuntimeSettings,
    ) -> Self {
        Self::with_session(BookingSession::default(), collaborators, responses, settings)
    }

    pub fn with_session(
        session: BookingSession,
        collaborators: Collaborators,
        responses: ResponseGenerator,
        settings: RuntimeSettings,
    ) -> Self {
        Self { session, collaborators, responses, settings, recommendations: Vec::new() }
    }

    pub fn session(&self) -> &BookingSession {
        &self.session
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    /// Opening line of the conversation.
    pub fn start(&mut self) -> Result<String, ApplicationError> {
        let greeting = self.responses.generate("greetings")?;
        self.session.compute_missing();
        self.session.record_system(greeting.clone());
        tracing::info!(
            event_name = "dialogue.session.started",
            session_id = %self.session.id(),
            "booking conversation started"
        );
        Ok(greeting)
    }

    /// Processes one user utterance. Failures never escape: they become a
    /// fallback reply and the next utterance retries.
    pub async fn handle_utterance(&mut self, utterance: &str) -> TurnOutcome {
        let outcome = match self.try_turn(utterance).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    event_name = "dialogue.turn.failed",
                    session_id = %self.session.id(),
                    error_class = error.error_class(),
                    error = %error,
                    "turn failed, replying with fallback"
                );
                TurnOutcome::carry_on(self.fallback_reply())
            }
        };
        self.session.record_system(outcome.reply.clone());
        outcome
    }

    /// Runs the whole conversation over `speech` until it completes, is
    /// cancelled or the input closes.
    pub async fn run(
        &mut self,
        speech: &dyn SpeechChannel,
    ) -> Result<SessionSummary, ApplicationError> {
        let greeting = self.start()?;
        say(speech, &greeting).await;

        let mut speech_failures = 0;
        loop {
            let utterance = match speech.record_utterance().await {
                Ok(utterance) => {
                    speech_failures = 0;
                    utterance
                }
                Err(SpeechError::InputClosed) => {
                    tracing::info!(
                        event_name = "dialogue.input.closed",
                        session_id = %self.session.id(),
                        "input closed before the booking finished"
                    );
                    if !self.session.phase().is_terminal() {
                        self.close(SessionOutcome::Cancelled, None).await;
                    }
                    break;
                }
                Err(error) => {
                    speech_failures += 1;
                    tracing::warn!(
                        event_name = "speech.record.failed",
                        session_id = %self.session.id(),
                        attempt = speech_failures,
                        error = %error,
                        "could not capture utterance"
                    );
                    if speech_failures >= MAX_CONSECUTIVE_SPEECH_FAILURES {
                        return Err(ApplicationError::integration("speech", error.to_string()));
                    }
                    let fallback = self.fallback_reply();
                    say(speech, &fallback).await;
                    continue;
                }
            };

            let outcome = self.handle_utterance(&utterance).await;
            say(speech, &outcome.reply).await;
            if outcome.finished {
                break;
            }
        }

        Ok(self.summary())
    }

    pub fn summary(&self) -> SessionSummary {
        let outcome = match self.session.phase() {
            DialoguePhase::Completed => Some(SessionOutcome::Completed),
            DialoguePhase::Cancelled => Some(SessionOutcome::Cancelled),
            DialoguePhase::Greeting | DialoguePhase::Collecting => None,
        };
        SessionSummary {
            session_id: self.session.id().clone(),
            outcome,
            accuracy_ratio: self.session.accuracy().ratio(),
            turn_count: self.session.turn_count(),
            details: self.session.details(),
            recommendations: self.recommendations.clone(),
        }
    }

    async fn try_turn(&mut self, utterance: &str) -> Result<TurnOutcome, ApplicationError> {
        self.session.record_user(utterance);

        if self.session.phase().is_terminal() {
            return Ok(TurnOutcome::finished(self.responses.generate("goodbye")?));
        }
        if utterance.trim().is_empty() {
            return Ok(TurnOutcome::carry_on(self.responses.generate("fallback")?));
        }

        // A pending question owns the turn: the utterance is only a yes/no.
        if let Some(pending) = self.session.pending_confirmation() {
            let recognizer = Arc::clone(&self.collaborators.recognizer);
            let confirmed = within(
                self.settings.turn_timeout,
                "nlu",
                recognizer.recognize_answer(utterance),
            )
            .await?;

            let acknowledgement = self.session.resolve(confirmed)?;
            tracing::info!(
                event_name = "dialogue.confirmation.resolved",
                session_id = %self.session.id(),
                slot = pending.as_str(),
                confirmed,
                "confirmation resolved"
            );

            if !confirmed {
                return Ok(TurnOutcome::carry_on(acknowledgement));
            }
            let next = self.advance().await?;
            return Ok(TurnOutcome {
                reply: format!("{acknowledgement}. {}", next.reply),
                finished: next.finished,
            });
        }

        let recognizer = Arc::clone(&self.collaborators.recognizer);
        let recognition = within(
            self.settings.turn_timeout,
            "nlu",
            recognizer.recognize_intent(utterance, self.session.last_asked()),
        )
        .await?;

        tracing::debug!(
            event_name = "dialogue.intent.recognized",
            session_id = %self.session.id(),
            intent = recognition.intent.as_str(),
            confidence = recognition.confidence,
            "intent recognized"
        );

        if recognition.intent == Intent::Stop {
            let goodbye = self.responses.generate("goodbye")?;
            self.close(SessionOutcome::Cancelled, None).await;
            return Ok(TurnOutcome::finished(goodbye));
        }

        if recognition.extraction.is_empty() {
            return match recognition.intent {
                Intent::Greetings if self.session.value(Slot::Name).is_none() => {
                    self.session.compute_missing();
                    Ok(TurnOutcome::carry_on(self.responses.generate("greetings")?))
                }
                Intent::Greetings | Intent::ProvideDetails => self.advance().await,
                Intent::Fallback | Intent::Other(_) | Intent::Stop => {
                    Ok(TurnOutcome::carry_on(self.responses.generate("fallback")?))
                }
            };
        }

        self.session.transition(DialoguePhase::Collecting);
        let slots: Vec<&str> =
            recognition.extraction.entries().iter().map(|(slot, _)| slot.as_str()).collect();
        tracing::info!(
            event_name = "dialogue.slot.ingested",
            session_id = %self.session.id(),
            slots = ?slots,
            "extraction ingested"
        );

        match self.session.ingest(&recognition.extraction) {
            Some(prompt) => {
                tracing::debug!(
                    event_name = "dialogue.confirmation.requested",
                    session_id = %self.session.id(),
                    slot = self.session.pending_confirmation().map(|slot| slot.as_str()),
                    "confirmation requested"
                );
                Ok(TurnOutcome::carry_on(prompt))
            }
            None => self.advance().await,
        }
    }

    /// Picks the next thing to say once no confirmation is pending:
    /// surface a silently stored value, finish, or ask for a missing slot.
    async fn advance(&mut self) -> Result<TurnOutcome, ApplicationError> {
        if let Some(pending) = self.session.pending_confirmation() {
            return Ok(TurnOutcome::carry_on(self.session.activate(pending)?));
        }
        if let Some(prompt) = self.session.surface_unconfirmed() {
            return Ok(TurnOutcome::carry_on(prompt));
        }
        if self.session.is_complete() {
            return self.complete().await;
        }

        self.session.transition(DialoguePhase::Collecting);
        let missing = self.session.compute_missing();
        let next = missing.first().ok_or_else(|| {
            DomainError::InvariantViolation("incomplete session with nothing missing".to_string())
        })?;
        Ok(TurnOutcome::carry_on(self.responses.generate(next.prompt_key())?))
    }

    async fn complete(&mut self) -> Result<TurnOutcome, ApplicationError> {
        // A no-preference cuisine holds placeholder text that reads badly
        // inside the summary, so it gets its own wording when the catalog has it.
        let key = if self.session.is_no_preference(Slot::CulinaryPreferences)
            && self.responses.catalog().contains(BOOKING_COMPLETE_ANY_CUISINE)
        {
            BOOKING_COMPLETE_ANY_CUISINE
        } else {
            BOOKING_COMPLETE
        };
        let template = self.responses.generate(key)?;
        let mut reply = TemplateFiller::new(&self.session).fill(&template);

        self.recommendations = self.find_recommendations().await;
        let top_pick = self.recommendations.first().map(|pick| pick.name.clone());
        if self.collaborators.search.is_some() {
            let follow_up = match &top_pick {
                Some(name) => {
                    let template = self.responses.generate("recommendation")?;
                    TemplateFiller::new(&self.session).with_restaurant(name).fill(&template)
                }
                None => self.responses.generate("no_recommendation")?,
            };
            reply = format!("{reply} {follow_up}");
        }

        self.close(SessionOutcome::Completed, top_pick).await;
        Ok(TurnOutcome::finished(reply))
    }

    async fn find_recommendations(&self) -> Vec<Recommendation> {
        let (Some(search), Some(advisor)) =
            (self.collaborators.search.as_ref(), self.collaborators.advisor.as_ref())
        else {
            return Vec::new();
        };

        let details = self.session.details();
        let timeout = self.settings.turn_timeout;
        let result: Result<Vec<Recommendation>, ApplicationError> = async {
            let query = within(timeout, "advisor", advisor.build_query(&details)).await?;
            let candidates = within(timeout, "search", search.find_candidates(&query)).await?;
            tracing::debug!(
                event_name = "search.candidates.found",
                session_id = %self.session.id(),
                query = %query,
                candidates = candidates.len(),
                "places search returned"
            );
            let preferences = details.preference_summary();
            let top_picks = self.settings.top_picks;
            within(timeout, "advisor", advisor.recommend(&candidates, &preferences, top_picks))
                .await
        }
        .await;

        match result {
            Ok(picks) => picks,
            Err(error) => {
                tracing::warn!(
                    event_name = "search.recommendation.failed",
                    session_id = %self.session.id(),
                    error = %error,
                    "no recommendation for completed booking"
                );
                Vec::new()
            }
        }
    }

    /// Ends the session and stores its record. Storage failures are logged
    /// and otherwise ignored.
    async fn close(&mut self, outcome: SessionOutcome, recommended: Option<String>) {
        let phase = match outcome {
            SessionOutcome::Completed => DialoguePhase::Completed,
            SessionOutcome::Cancelled => DialoguePhase::Cancelled,
        };
        self.session.transition(phase);

        let accuracy_ratio = self.session.accuracy().ratio();
        let turn_count = self.session.turn_count();
        let mut record = BookingRecord::new(
            self.session.id().clone(),
            &self.session.details(),
            outcome,
            accuracy_ratio,
            turn_count,
        );
        if let Some(name) = recommended {
            record = record.with_recommendation(name);
        }

        let repository = Arc::clone(&self.collaborators.repository);
        let saved = within(self.settings.turn_timeout, "repository", repository.save(record)).await;
        if let Err(error) = saved {
            tracing::error!(
                event_name = "persistence.booking.failed",
                session_id = %self.session.id(),
                error = %error,
                "could not store booking record"
            );
        }

        let event_name = match outcome {
            SessionOutcome::Completed => "dialogue.session.completed",
            SessionOutcome::Cancelled => "dialogue.session.cancelled",
        };
        tracing::info!(
            event_name,
            session_id = %self.session.id(),
            accuracy_ratio = ?accuracy_ratio,
            turn_count,
            "booking conversation ended"
        );
    }

    fn fallback_reply(&mut self) -> String {
        self.responses.generate("fallback").unwrap_or_else(|_| LAST_RESORT_FALLBACK.to_string())
    }
}

async fn within<T, E, F>(
    timeout: Duration,
    collaborator: &'static str,
    call: F,
) -> Result<T, ApplicationError>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ApplicationError::integration(collaborator, error.to_string())),
        Err(_) => Err(ApplicationError::integration(
            collaborator,
            format!("no answer within {}ms", timeout.as_millis()),
        )),
    }
}

async fn say(speech: &dyn SpeechChannel, text: &str) {
    if let Err(error) = speech.speak(text).await {
        tracing::warn!(event_name = "speech.speak.failed", error = %error, "could not deliver reply");
    }
}
