use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tablebook_core::config::PlacesConfig;
use tablebook_core::domain::booking::BookingDetails;

use crate::llm::{complete_json, LlmClient, LlmError, ResponseFormat};

const FIELD_MASK: &str =
    "places.displayName,places.formattedAddress,places.rating,places.reviews";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("places transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("places api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed advisor reply: {0}")]
    MalformedReply(String),
    #[error("places search misconfigured: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestaurantCandidate {
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub summary: Option<String>,
}

#[async_trait]
pub trait RestaurantSearch: Send + Sync {
    async fn find_candidates(&self, query: &str) -> Result<Vec<RestaurantCandidate>, SearchError>;
}

#[async_trait]
pub trait RestaurantAdvisor: Send + Sync {
    /// Turns the booking into a free-text places query.
    async fn build_query(&self, details: &BookingDetails) -> Result<String, SearchError>;

    /// Best `top_n` candidates for the stated preferences, best first.
    async fn recommend(
        &self,
        candidates: &[RestaurantCandidate],
        preferences: &[String],
        top_n: usize,
    ) -> Result<Vec<Recommendation>, SearchError>;
}

/// Google Places (New) text search.
pub struct PlacesTextSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    max_results: u32,
}

impl PlacesTextSearch {
    pub fn from_config(config: &PlacesConfig, timeout: Duration) -> Result<Self, SearchError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SearchError::Configuration("places.api_key is not set".to_string()))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/places:searchText", self.base_url)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchTextResponse {
    #[serde(default)]
    places: Vec<Place>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    display_name: Option<LocalizedText>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    #[serde(default)]
    reviews: Vec<Review>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Review {
    text: Option<LocalizedText>,
}

impl Place {
    fn into_candidate(self) -> Option<RestaurantCandidate> {
        let name = self.display_name?.text;
        Some(RestaurantCandidate {
            name,
            address: self.formatted_address,
            rating: self.rating,
            reviews: self
                .reviews
                .into_iter()
                .filter_map(|review| review.text.map(|text| text.text))
                .collect(),
        })
    }
}

#[async_trait]
impl RestaurantSearch for PlacesTextSearch {
    async fn find_candidates(&self, query: &str) -> Result<Vec<RestaurantCandidate>, SearchError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&serde_json::json!({ "textQuery": query, "pageSize": self.max_results }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status { status, body });
        }

        let parsed: SearchTextResponse = response.json().await?;
        Ok(parsed.places.into_iter().filter_map(Place::into_candidate).collect())
    }
}

pub struct LlmRestaurantAdvisor {
    llm: Arc<dyn LlmClient>,
}

impl LlmRestaurantAdvisor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RestaurantAdvisor for LlmRestaurantAdvisor {
    async fn build_query(&self, details: &BookingDetails) -> Result<String, SearchError> {
        let summary = details.preference_summary().join(", ");
        let prompt = format!(
            "Your task is to prepare a restaurant search query from the user's booking details.\n\
             Examples of good queries:\n\
             Vegan restaurant in the city center Warsaw\n\
             Best italian restaurant in the downtown, Warsaw\n\
             Georgian restaurant for two in Warsaw\n\n\
             User booking details: {summary}\n\n\
             Return only the query as plain text.\n\
             Response:"
        );

        let raw = self.llm.complete(&prompt, ResponseFormat::Text).await?;
        let query = raw.trim().trim_matches('"').trim().to_string();
        if query.is_empty() {
            return Ok(fallback_query(details));
        }
        Ok(query)
    }

    async fn recommend(
        &self,
        candidates: &[RestaurantCandidate],
        preferences: &[String],
        top_n: usize,
    ) -> Result<Vec<Recommendation>, SearchError> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let listing = serde_json::to_string(candidates)
            .map_err(|error| SearchError::MalformedReply(error.to_string()))?;
        let prompt = format!(
            "You are a helpful culinary advisor. Choose the top {top_n} restaurants from the list \
             for this user, judging by how closely recent reviews match the user's preferences \
             and by rating. A slightly lower rated place whose reviews praise exactly what the \
             user wants beats a higher rated one that never mentions it.\n\n\
             Restaurant list: {listing}\n\
             User preferences: {preferences}\n\n\
             Respond with a JSON object {{\"top_picks\": [...]}} where every pick has \
             \"restaurant_name\", \"restaurant_address\", \"rating\" and \"summary\" (how the \
             place matches the user's needs).\n\n\
             JSON Response:",
            preferences = preferences.join(", "),
        );

        let reply = complete_json(self.llm.as_ref(), &prompt).await?;
        let mut picks = parse_picks(&reply)?;
        picks.truncate(top_n);
        Ok(picks)
    }
}

/// Used when the model returns nothing usable.
pub fn fallback_query(details: &BookingDetails) -> String {
    let cuisine = details
        .culinary_preferences
        .as_deref()
        .filter(|cuisine| !cuisine.starts_with("No specific"))
        .unwrap_or("Good");
    match details.booking_location.as_deref() {
        Some(location) => format!("{cuisine} restaurant in {location}"),
        None => format!("{cuisine} restaurant"),
    }
}

// Accepts `{"top_picks": [...]}` as well as a single pick object.
fn parse_picks(reply: &Value) -> Result<Vec<Recommendation>, SearchError> {
    match reply.get("top_picks") {
        Some(Value::Array(picks)) => Ok(picks.iter().filter_map(parse_pick).collect()),
        Some(other) => Err(SearchError::MalformedReply(format!("top_picks is not a list: {other}"))),
        None => parse_pick(reply)
            .map(|pick| vec![pick])
            .ok_or_else(|| SearchError::MalformedReply(format!("no restaurant in {reply}"))),
    }
}

fn parse_pick(value: &Value) -> Option<Recommendation> {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    let name = field(&["restaurant_name", "name"])?;
    let rating = value.get("rating").and_then(|rating| match rating {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    });

    Some(Recommendation {
        name,
        address: field(&["restaurant_address", "address"]),
        rating,
        summary: field(&["summary", "comparison_summary"]),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tablebook_core::domain::booking::BookingDetails;

    use super::{
        fallback_query, parse_picks, LlmRestaurantAdvisor, Place, RestaurantAdvisor,
        RestaurantCandidate, SearchError,
    };
    use crate::llm::tests::ScriptedLlm;
    use crate::llm::ResponseFormat;

    fn candidate(name: &str, rating: f64) -> RestaurantCandidate {
        RestaurantCandidate {
            name: name.to_string(),
            address: Some("Main St 1".to_string()),
            rating: Some(rating),
            reviews: vec!["great vegan options".to_string()],
        }
    }

    fn vegan_in_warsaw() -> BookingDetails {
        BookingDetails {
            booking_location: Some("Warsaw".to_string()),
            culinary_preferences: Some("Vegan".to_string()),
            ..BookingDetails::default()
        }
    }

    #[test]
    fn places_response_maps_to_candidates() {
        let place: Place = serde_json::from_value(json!({
            "displayName": {"text": "Chinkalnia", "languageCode": "pl"},
            "formattedAddress": "Jana 1, Kraków",
            "rating": 4.6,
            "reviews": [{"text": {"text": "Best khinkali"}}, {"rating": 5}]
        }))
        .expect("place");

        let candidate = place.into_candidate().expect("named place");
        assert_eq!(candidate.name, "Chinkalnia");
        assert_eq!(candidate.reviews, vec!["Best khinkali".to_string()]);
    }

    #[test]
    fn unnamed_places_are_skipped() {
        let place: Place = serde_json::from_value(json!({"rating": 4.0})).expect("place");
        assert!(place.into_candidate().is_none());
    }

    #[test]
    fn single_pick_reply_is_accepted() {
        let picks = parse_picks(&json!({
            "restaurant_name": "Vege Bar",
            "restaurant_address": "Nowy Świat 5",
            "rating": "4.7",
            "summary": "great vegan options"
        }))
        .expect("picks");

        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Vege Bar");
        assert_eq!(picks[0].rating, Some(4.7));
    }

    #[test]
    fn reply_without_restaurant_is_malformed() {
        assert!(matches!(parse_picks(&json!({"note": "none"})), Err(SearchError::MalformedReply(_))));
        assert!(matches!(parse_picks(&json!({"top_picks": "x"})), Err(SearchError::MalformedReply(_))));
    }

    #[tokio::test]
    async fn recommend_truncates_to_top_n() {
        let llm = Arc::new(ScriptedLlm::with_replies(&[r#"{"top_picks": [
            {"restaurant_name": "A", "rating": 4.9},
            {"restaurant_name": "B", "rating": 4.8},
            {"restaurant_name": "C", "rating": 4.7},
            {"restaurant_name": "D", "rating": 4.6}
        ]}"#]));
        let advisor = LlmRestaurantAdvisor::new(llm);

        let picks = advisor
            .recommend(&[candidate("A", 4.9), candidate("B", 4.8)], &["cuisine: vegan".into()], 3)
            .await
            .expect("picks");

        let names: Vec<_> = picks.iter().map(|pick| pick.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn no_candidates_skips_the_model() {
        let llm = Arc::new(ScriptedLlm::default());
        let advisor = LlmRestaurantAdvisor::new(llm.clone());

        let picks = advisor.recommend(&[], &[], 3).await.expect("picks");

        assert!(picks.is_empty());
        assert!(llm.prompts.lock().expect("prompts").is_empty());
    }

    #[tokio::test]
    async fn build_query_uses_plain_text_mode() {
        let llm = Arc::new(ScriptedLlm::with_replies(&["\"Vegan restaurant in Warsaw\"\n"]));
        let advisor = LlmRestaurantAdvisor::new(llm.clone());

        let query = advisor.build_query(&vegan_in_warsaw()).await.expect("query");

        assert_eq!(query, "Vegan restaurant in Warsaw");
        let prompts = llm.prompts.lock().expect("prompts");
        assert_eq!(prompts[0].1, ResponseFormat::Text);
        assert!(prompts[0].0.contains("cuisine: Vegan"));
    }

    #[tokio::test]
    async fn empty_query_falls_back_to_details() {
        let llm = Arc::new(ScriptedLlm::with_replies(&["  "]));
        let advisor = LlmRestaurantAdvisor::new(llm);

        let query = advisor.build_query(&vegan_in_warsaw()).await.expect("query");
        assert_eq!(query, "Vegan restaurant in Warsaw");
    }

    #[test]
    fn fallback_query_ignores_no_preference_text() {
        let details = BookingDetails {
            culinary_preferences: Some("No specific cuisine preferences".to_string()),
            ..BookingDetails::default()
        };
        assert_eq!(fallback_query(&details), "Good restaurant");
    }
}
