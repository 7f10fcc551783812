use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialogue::accuracy::AccuracyTracker;
use crate::dialogue::confirmation::{
    acknowledgement, confirmation_prompt, restate_prompt, ConfirmationError, ConfirmationState,
};
use crate::domain::booking::{BookingDetails, SessionId};
use crate::domain::slot::{ExtractedValue, Slot, SlotExtraction, SlotValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialoguePhase {
    Greeting,
    Collecting,
    Completed,
    Cancelled,
}

impl DialoguePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEntry {
    Utterance { speaker: Speaker, text: String, at: DateTime<Utc> },
    PhaseChanged { from: DialoguePhase, to: DialoguePhase, at: DateTime<Utc> },
}

/// Conversation state for a single booking: the slot store, the
/// confirmation state machine and the bookkeeping around them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingSession {
    id: SessionId,
    slots: BTreeMap<Slot, SlotValue>,
    no_preference_fields: BTreeSet<Slot>,
    confirmed_fields: BTreeSet<Slot>,
    confirmation: ConfirmationState,
    last_asked: Option<Slot>,
    accuracy: AccuracyTracker,
    phase: DialoguePhase,
    history: Vec<HistoryEntry>,
}

impl Default for BookingSession {
    fn default() -> Self {
        Self::new(SessionId::generate())
    }
}

impl BookingSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            slots: BTreeMap::new(),
            no_preference_fields: BTreeSet::new(),
            confirmed_fields: BTreeSet::new(),
            confirmation: ConfirmationState::Idle,
            last_asked: None,
            accuracy: AccuracyTracker::default(),
            phase: DialoguePhase::Greeting,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn value(&self, slot: Slot) -> Option<&SlotValue> {
        self.slots.get(&slot)
    }

    pub fn is_confirmed(&self, slot: Slot) -> bool {
        self.confirmed_fields.contains(&slot)
    }

    pub fn is_no_preference(&self, slot: Slot) -> bool {
        self.no_preference_fields.contains(&slot)
    }

    pub fn confirmed_fields(&self) -> &BTreeSet<Slot> {
        &self.confirmed_fields
    }

    pub fn no_preference_fields(&self) -> &BTreeSet<Slot> {
        &self.no_preference_fields
    }

    pub fn confirmation_state(&self) -> ConfirmationState {
        self.confirmation
    }

    pub fn pending_confirmation(&self) -> Option<Slot> {
        self.confirmation.pending()
    }

    pub fn last_asked(&self) -> Option<Slot> {
        self.last_asked
    }

    pub fn accuracy(&self) -> &AccuracyTracker {
        &self.accuracy
    }

    pub fn phase(&self) -> DialoguePhase {
        self.phase
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Stores every populated field of `extraction`. When something new was
    /// stored and no confirmation is outstanding, the first new slot becomes
    /// pending and its confirmation question is returned. While a
    /// confirmation is outstanding ingestion is silent.
    pub fn ingest(&mut self, extraction: &SlotExtraction) -> Option<String> {
        let mut newly_set = Vec::new();

        for (slot, extracted) in extraction.entries() {
            let (value, no_preference) = match extracted {
                ExtractedValue::Value(value) => (value, false),
                ExtractedValue::NoPreference => match slot.no_preference_text() {
                    Some(text) => (SlotValue::Text(text.to_string()), true),
                    None => continue,
                },
            };

            let unchanged = self.slots.get(&slot) == Some(&value)
                && self.no_preference_fields.contains(&slot) == no_preference;
            if unchanged {
                continue;
            }

            self.slots.insert(slot, value);
            if no_preference {
                self.no_preference_fields.insert(slot);
            } else {
                self.no_preference_fields.remove(&slot);
            }
            self.confirmed_fields.remove(&slot);
            newly_set.push(slot);
        }

        if !self.confirmation.is_idle() {
            return None;
        }
        let first = newly_set.first().copied()?;
        self.activate(first).ok()
    }

    /// Puts `slot` into the awaiting-confirmation state and returns the
    /// question to ask.
    pub fn activate(&mut self, slot: Slot) -> Result<String, ConfirmationError> {
        if let Some(pending) = self.confirmation.pending() {
            if pending != slot {
                return Err(ConfirmationError::AlreadyPending { pending, requested: slot });
            }
        }
        let prompt = self.prompt_for(slot)?;
        self.confirmation = ConfirmationState::AwaitingConfirmation(slot);
        Ok(prompt)
    }

    /// Applies the user's yes/no answer to the pending slot. A denial asks
    /// for the slot again, so it becomes the last-asked slot.
    pub fn resolve(&mut self, confirmed: bool) -> Result<String, ConfirmationError> {
        let slot = self.confirmation.pending().ok_or(ConfirmationError::NothingPending)?;

        self.confirmation = ConfirmationState::Idle;
        self.accuracy.record(confirmed);

        if confirmed {
            self.confirmed_fields.insert(slot);
            Ok(acknowledgement(slot))
        } else {
            self.slots.remove(&slot);
            self.no_preference_fields.remove(&slot);
            self.confirmed_fields.remove(&slot);
            self.last_asked = Some(slot);
            Ok(restate_prompt(slot))
        }
    }

    /// Outstanding slots in priority order. The first one is remembered as
    /// the question about to be asked.
    pub fn compute_missing(&mut self) -> Vec<Slot> {
        let missing = Slot::ALL
            .into_iter()
            .filter(|slot| {
                !self.slots.contains_key(slot) && !self.no_preference_fields.contains(slot)
            })
            .collect::<Vec<_>>();
        self.last_asked = missing.first().copied();
        missing
    }

    /// Slots holding a value that was stored silently and never confirmed.
    pub fn unconfirmed_slots(&self) -> Vec<Slot> {
        self.slots
            .keys()
            .copied()
            .filter(|slot| {
                !self.confirmed_fields.contains(slot) && self.confirmation.pending() != Some(*slot)
            })
            .collect()
    }

    /// Starts confirming the first silently-stored value, if any.
    pub fn surface_unconfirmed(&mut self) -> Option<String> {
        if !self.confirmation.is_idle() {
            return None;
        }
        let slot = self.unconfirmed_slots().into_iter().next()?;
        self.activate(slot).ok()
    }

    /// Nothing missing, nothing pending and nothing stored without the
    /// user's say-so.
    pub fn is_complete(&self) -> bool {
        self.confirmation.is_idle()
            && Slot::ALL.iter().all(|slot| {
                self.slots.contains_key(slot) || self.no_preference_fields.contains(slot)
            })
            && self.unconfirmed_slots().is_empty()
    }

    pub fn details(&self) -> BookingDetails {
        let text = |slot: Slot| self.slots.get(&slot).and_then(SlotValue::as_text).map(str::to_string);
        BookingDetails {
            user_name: text(Slot::Name),
            booking_time: text(Slot::BookingDateTime),
            booking_location: text(Slot::BookingLocation),
            party_size: self.slots.get(&Slot::PartySize).and_then(SlotValue::as_party_size),
            dietary_preferences: text(Slot::DietaryPreferences),
            culinary_preferences: text(Slot::CulinaryPreferences),
        }
    }

    pub fn record_user(&mut self, text: impl Into<String>) {
        self.record_utterance(Speaker::User, text.into());
    }

    pub fn record_system(&mut self, text: impl Into<String>) {
        self.record_utterance(Speaker::System, text.into());
    }

    pub fn transition(&mut self, to: DialoguePhase) {
        if self.phase == to {
            return;
        }
        self.history.push(HistoryEntry::PhaseChanged { from: self.phase, to, at: Utc::now() });
        self.phase = to;
    }

    /// Number of user utterances seen so far.
    pub fn turn_count(&self) -> u32 {
        let turns = self
            .history
            .iter()
            .filter(|entry| matches!(entry, HistoryEntry::Utterance { speaker: Speaker::User, .. }))
            .count();
        u32::try_from(turns).unwrap_or(u32::MAX)
    }

    fn record_utterance(&mut self, speaker: Speaker, text: String) {
        self.history.push(HistoryEntry::Utterance { speaker, text, at: Utc::now() });
    }

    fn prompt_for(&self, slot: Slot) -> Result<String, ConfirmationError> {
        let value = self.slots.get(&slot).ok_or(ConfirmationError::EmptySlot(slot))?;
        Ok(confirmation_prompt(slot, value, self.no_preference_fields.contains(&slot)))
    }
}
