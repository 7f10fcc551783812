use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::slot::PartySize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only snapshot of what the user asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub user_name: Option<String>,
    pub booking_time: Option<String>,
    pub booking_location: Option<String>,
    pub party_size: Option<PartySize>,
    pub dietary_preferences: Option<String>,
    pub culinary_preferences: Option<String>,
}

impl BookingDetails {
    /// Short natural-language summary handed to the search advisor.
    pub fn preference_summary(&self) -> Vec<String> {
        let mut summary = Vec::new();
        if let Some(cuisine) = &self.culinary_preferences {
            summary.push(format!("cuisine: {cuisine}"));
        }
        if let Some(dietary) = &self.dietary_preferences {
            summary.push(format!("dietary: {dietary}"));
        }
        if let Some(size) = self.party_size {
            summary.push(format!("party size: {size}"));
        }
        if let Some(time) = &self.booking_time {
            summary.push(format!("date/time: {time}"));
        }
        if let Some(location) = &self.booking_location {
            summary.push(format!("location: {location}"));
        }
        summary
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Row written to the record store once a conversation ends. The user's
/// name never leaves the process in clear text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub session_id: SessionId,
    pub user_name_hash: Option<String>,
    pub booking_time: Option<String>,
    pub booking_location: Option<String>,
    pub party_size: Option<u32>,
    pub dietary_preferences: Option<String>,
    pub culinary_preferences: Option<String>,
    pub outcome: SessionOutcome,
    pub accuracy_ratio: Option<f64>,
    pub turn_count: u32,
    pub recommended_restaurant: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn new(
        session_id: SessionId,
        details: &BookingDetails,
        outcome: SessionOutcome,
        accuracy_ratio: Option<f64>,
        turn_count: u32,
    ) -> Self {
        Self {
            session_id,
            user_name_hash: details.user_name.as_deref().map(hash_user_name),
            booking_time: details.booking_time.clone(),
            booking_location: details.booking_location.clone(),
            party_size: details.party_size.map(|size| size.get()),
            dietary_preferences: details.dietary_preferences.clone(),
            culinary_preferences: details.culinary_preferences.clone(),
            outcome,
            accuracy_ratio,
            turn_count,
            recommended_restaurant: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_recommendation(mut self, restaurant: impl Into<String>) -> Self {
        self.recommended_restaurant = Some(restaurant.into());
        self
    }
}

/// SHA-256 of the trimmed name, lowercase hex.
pub fn hash_user_name(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use crate::domain::slot::PartySize;

    use super::{hash_user_name, BookingDetails, BookingRecord, SessionId, SessionOutcome};

    #[test]
    fn record_stores_hashed_name_only() {
        let details = BookingDetails {
            user_name: Some("Anna".to_string()),
            party_size: PartySize::new(2),
            ..BookingDetails::default()
        };

        let record = BookingRecord::new(
            SessionId("S-1".to_string()),
            &details,
            SessionOutcome::Completed,
            Some(1.0),
            7,
        );

        let hash = record.user_name_hash.clone().expect("name hash");
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, "Anna");
        assert_eq!(hash, hash_user_name(" Anna "));
        assert_eq!(record.party_size, Some(2));
        assert!(!format!("{record:?}").contains("Anna"));
    }

    #[test]
    fn preference_summary_lists_known_fields() {
        let details = BookingDetails {
            culinary_preferences: Some("Georgian".to_string()),
            booking_location: Some("Warsaw".to_string()),
            ..BookingDetails::default()
        };

        assert_eq!(
            details.preference_summary(),
            vec!["cuisine: Georgian".to_string(), "location: Warsaw".to_string()]
        );
    }
}
