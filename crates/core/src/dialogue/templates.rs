use crate::dialogue::session::BookingSession;
use crate::domain::slot::Slot;

const PLACEHOLDERS: [(&str, Slot); 6] = [
    ("{name}", Slot::Name),
    ("{cuisine}", Slot::CulinaryPreferences),
    ("{dietary}", Slot::DietaryPreferences),
    ("{party_size}", Slot::PartySize),
    ("{date_time}", Slot::BookingDateTime),
    ("{location}", Slot::BookingLocation),
];

const RESTAURANT_PLACEHOLDER: &str = "{restaurant}";

/// Best-effort substitution of slot values into canned text. Placeholders
/// whose slot is still empty stay in the output untouched.
pub struct TemplateFiller<'a> {
    session: &'a BookingSession,
    restaurant: Option<&'a str>,
}

impl<'a> TemplateFiller<'a> {
    pub fn new(session: &'a BookingSession) -> Self {
        Self { session, restaurant: None }
    }

    pub fn with_restaurant(mut self, restaurant: &'a str) -> Self {
        self.restaurant = Some(restaurant);
        self
    }

    pub fn fill(&self, template: &str) -> String {
        let mut output = template.to_string();
        for (placeholder, slot) in PLACEHOLDERS {
            if let Some(value) = self.session.value(slot) {
                output = output.replace(placeholder, &value.to_string());
            }
        }
        if let Some(restaurant) = self.restaurant {
            output = output.replace(RESTAURANT_PLACEHOLDER, restaurant);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use crate::dialogue::session::BookingSession;
    use crate::domain::booking::SessionId;
    use crate::domain::slot::{PartySize, Preference, SlotExtraction};

    use super::TemplateFiller;

    fn session_with(extraction: SlotExtraction) -> BookingSession {
        let mut session = BookingSession::new(SessionId("S-TPL".to_string()));
        session.ingest(&extraction);
        session
    }

    #[test]
    fn fills_known_slots() {
        let session = session_with(SlotExtraction {
            name: Some("Anna".to_string()),
            culinary_preferences: Some(Preference::Stated("Georgian".to_string())),
            party_size: PartySize::new(2),
            ..SlotExtraction::default()
        });

        let filled = TemplateFiller::new(&session)
            .fill("{name}, a table for {party_size} with {cuisine} food coming up.");
        assert_eq!(filled, "Anna, a table for 2 with Georgian food coming up.");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let session = session_with(SlotExtraction {
            name: Some("Anna".to_string()),
            ..SlotExtraction::default()
        });

        let filled = TemplateFiller::new(&session).fill("{name} in {location} at {restaurant}");
        assert_eq!(filled, "Anna in {location} at {restaurant}");
    }

    #[test]
    fn substitutes_recommended_restaurant() {
        let session = session_with(SlotExtraction::default());
        let filled =
            TemplateFiller::new(&session).with_restaurant("Chinkalnia").fill("Try {restaurant}!");
        assert_eq!(filled, "Try Chinkalnia!");
    }

    #[test]
    fn no_preference_text_is_substituted_verbatim() {
        let session = session_with(SlotExtraction {
            dietary_preferences: Some(Preference::NoPreference),
            ..SlotExtraction::default()
        });
        assert_eq!(
            TemplateFiller::new(&session).fill("Diet: {dietary}"),
            "Diet: No specific dietary preferences"
        );
    }
}
