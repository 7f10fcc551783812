use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::slot::{Slot, SlotValue};

/// Single-field confirm/deny protocol. At most one slot can be awaiting an
/// answer at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationState {
    #[default]
    Idle,
    AwaitingConfirmation(Slot),
}

impl ConfirmationState {
    pub fn pending(&self) -> Option<Slot> {
        match self {
            Self::Idle => None,
            Self::AwaitingConfirmation(slot) => Some(*slot),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("no confirmation is pending")]
    NothingPending,
    #[error("cannot confirm {requested} while {pending} is still awaiting an answer")]
    AlreadyPending { pending: Slot, requested: Slot },
    #[error("cannot confirm {0} because it holds no value")]
    EmptySlot(Slot),
}

pub(crate) fn confirmation_prompt(slot: Slot, value: &SlotValue, no_preference: bool) -> String {
    if let Some(size) = value.as_party_size() {
        return match size.get() {
            1 => "One person reservation, correct?".to_string(),
            2 => "So that will be a table for two, right?".to_string(),
            guests => format!("If I understood correctly, this will be a {guests} people reservation?"),
        };
    }

    if no_preference {
        return format!("To confirm - you have no specific {}, correct?", slot.label());
    }

    format!("To confirm - your {} is {value}, correct?", slot.label())
}

// Acknowledgement and restate wording name the field key, not its label.
pub(crate) fn acknowledgement(slot: Slot) -> String {
    format!("Thanks, {} has been confirmed", slot.as_str())
}

pub(crate) fn restate_prompt(slot: Slot) -> String {
    format!("Would you kindly provide your {} again, please?", slot.as_str())
}

#[cfg(test)]
mod tests {
    use crate::domain::slot::{PartySize, Slot, SlotValue};

    use super::{acknowledgement, confirmation_prompt, restate_prompt, ConfirmationState};

    fn party(guests: u32) -> SlotValue {
        SlotValue::PartySize(PartySize::new(guests).expect("positive party size"))
    }

    #[test]
    fn party_size_wording_branches_on_count() {
        assert_eq!(
            confirmation_prompt(Slot::PartySize, &party(1), false),
            "One person reservation, correct?"
        );
        assert_eq!(
            confirmation_prompt(Slot::PartySize, &party(2), false),
            "So that will be a table for two, right?"
        );
        assert_eq!(
            confirmation_prompt(Slot::PartySize, &party(6), false),
            "If I understood correctly, this will be a 6 people reservation?"
        );
    }

    #[test]
    fn text_fields_use_generic_wording() {
        let value = SlotValue::Text("Friday 7pm".to_string());
        assert_eq!(
            confirmation_prompt(Slot::BookingDateTime, &value, false),
            "To confirm - your booking date and time is Friday 7pm, correct?"
        );
    }

    #[test]
    fn no_preference_wording_avoids_echoing_placeholder_text() {
        let value = SlotValue::Text("No specific dietary preferences".to_string());
        assert_eq!(
            confirmation_prompt(Slot::DietaryPreferences, &value, true),
            "To confirm - you have no specific dietary preferences, correct?"
        );
    }

    #[test]
    fn resolution_wording_names_the_field_key() {
        assert_eq!(
            acknowledgement(Slot::DietaryPreferences),
            "Thanks, dietary_preferences has been confirmed"
        );
        assert_eq!(
            restate_prompt(Slot::BookingDateTime),
            "Would you kindly provide your booking_date_time again, please?"
        );
    }

    #[test]
    fn state_reports_pending_slot() {
        assert_eq!(ConfirmationState::Idle.pending(), None);
        assert_eq!(
            ConfirmationState::AwaitingConfirmation(Slot::Name).pending(),
            Some(Slot::Name)
        );
        assert!(ConfirmationState::default().is_idle());
    }
}
