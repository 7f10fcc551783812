use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel emitted by the language model when the user explicitly has no
/// dietary or cuisine preference.
pub const NO_PREFERENCE_SENTINEL: &str = "NO_PREFERENCE";

/// One of the six booking attributes, ordered by the priority in which the
/// dialogue asks for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Name,
    DietaryPreferences,
    CulinaryPreferences,
    PartySize,
    BookingDateTime,
    BookingLocation,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::Name,
        Slot::DietaryPreferences,
        Slot::CulinaryPreferences,
        Slot::PartySize,
        Slot::BookingDateTime,
        Slot::BookingLocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DietaryPreferences => "dietary_preferences",
            Self::CulinaryPreferences => "culinary_preferences",
            Self::PartySize => "party_size",
            Self::BookingDateTime => "booking_date_time",
            Self::BookingLocation => "booking_location",
        }
    }

    /// Response key used when the dialogue asks the user for this slot.
    pub fn prompt_key(&self) -> &'static str {
        match self {
            Self::Name => "ask_name",
            Self::DietaryPreferences => "get_dietary_preferences",
            Self::CulinaryPreferences => "get_cuisine_preferences",
            Self::PartySize => "get_party_size",
            Self::BookingDateTime => "get_date_time",
            Self::BookingLocation => "get_location",
        }
    }

    /// Wording used when the slot is mentioned back to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DietaryPreferences => "dietary preferences",
            Self::CulinaryPreferences => "cuisine preference",
            Self::PartySize => "party size",
            Self::BookingDateTime => "booking date and time",
            Self::BookingLocation => "booking location",
        }
    }

    pub fn accepts_no_preference(&self) -> bool {
        matches!(self, Self::DietaryPreferences | Self::CulinaryPreferences)
    }

    /// Fixed text stored in place of a value when the user has no preference.
    pub fn no_preference_text(&self) -> Option<&'static str> {
        match self {
            Self::DietaryPreferences => Some("No specific dietary preferences"),
            Self::CulinaryPreferences => Some("No specific cuisine preferences"),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str() == normalized || slot.prompt_key() == normalized)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PartySize(u32);

impl PartySize {
    pub fn new(guests: u32) -> Option<Self> {
        (guests > 0).then_some(Self(guests))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PartySize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "party size must be a positive integer".to_string())
    }
}

impl From<PartySize> for u32 {
    fn from(value: PartySize) -> Self {
        value.0
    }
}

impl fmt::Display for PartySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dietary or cuisine answer: either something concrete or the explicit
/// "no preference" sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preference {
    Stated(String),
    NoPreference,
}

impl Preference {
    /// Empty input means "not mentioned" and yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.eq_ignore_ascii_case(NO_PREFERENCE_SENTINEL) {
            Some(Self::NoPreference)
        } else {
            Some(Self::Stated(trimmed.to_string()))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotValue {
    Text(String),
    PartySize(PartySize),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::PartySize(_) => None,
        }
    }

    pub fn as_party_size(&self) -> Option<PartySize> {
        match self {
            Self::PartySize(size) => Some(*size),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::PartySize(size) => write!(f, "{size}"),
        }
    }
}

/// Structured output of one extraction pass, one optional per slot. `None`
/// means the utterance did not mention the slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotExtraction {
    pub name: Option<String>,
    pub dietary_preferences: Option<Preference>,
    pub culinary_preferences: Option<Preference>,
    pub party_size: Option<PartySize>,
    pub booking_date_time: Option<String>,
    pub booking_location: Option<String>,
}

impl SlotExtraction {
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Populated fields in slot priority order. Blank text counts as absent.
    pub fn entries(&self) -> Vec<(Slot, ExtractedValue)> {
        let mut entries = Vec::new();
        push_text(&mut entries, Slot::Name, self.name.as_deref());
        push_preference(&mut entries, Slot::DietaryPreferences, self.dietary_preferences.as_ref());
        push_preference(
            &mut entries,
            Slot::CulinaryPreferences,
            self.culinary_preferences.as_ref(),
        );
        if let Some(size) = self.party_size {
            entries.push((Slot::PartySize, ExtractedValue::Value(SlotValue::PartySize(size))));
        }
        push_text(&mut entries, Slot::BookingDateTime, self.booking_date_time.as_deref());
        push_text(&mut entries, Slot::BookingLocation, self.booking_location.as_deref());
        entries
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractedValue {
    Value(SlotValue),
    NoPreference,
}

fn push_text(entries: &mut Vec<(Slot, ExtractedValue)>, slot: Slot, raw: Option<&str>) {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return;
    };
    entries.push((slot, ExtractedValue::Value(SlotValue::Text(text.to_string()))));
}

fn push_preference(
    entries: &mut Vec<(Slot, ExtractedValue)>,
    slot: Slot,
    preference: Option<&Preference>,
) {
    match preference {
        Some(Preference::NoPreference) => entries.push((slot, ExtractedValue::NoPreference)),
        Some(Preference::Stated(text)) => push_text(entries, slot, Some(text.as_str())),
        None => {}
    }
}
