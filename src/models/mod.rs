use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod feedback;
pub mod provider;
pub mod recommendation;
pub mod token;

pub use feedback::{FeedbackAction, FeedbackEvent, FeedbackPayload, DEFAULT_FEEDBACK_SOURCE};
pub use provider::{ApiArtist, ApiProfile, ApiTrack};
pub use recommendation::{
    BaseRecommendation, CachedRecommendation, EnrichedRecommendation, RawArtist,
    RecommendationArtist, RecommendationResponse, TrackDetails, UNKNOWN_ARTIST,
};
pub use token::{SessionToken, TokenEndpointReply, TokenEndpointResponse, MISSING_CLIENT_CREDENTIALS};

/// Fallback user id when the provider profile carries neither email nor name
pub const DEFAULT_USER_ID: &str = "spotify-user";

/// Profile of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

impl SessionUser {
    /// Identifier used towards the engine: email, then name, then a fixed default.
    pub fn user_id(&self) -> String {
        [self.email.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
            .unwrap_or(DEFAULT_USER_ID)
            .to_string()
    }
}

impl From<ApiProfile> for SessionUser {
    fn from(profile: ApiProfile) -> Self {
        let image = profile.images.first().and_then(|image| image.url.clone());
        Self {
            name: profile.display_name.or(profile.id),
            email: profile.email,
            image,
        }
    }
}

/// A signed-in browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: SessionUser,
    pub token: SessionToken,
}

/// Decodes a field on its own: a value of the wrong type reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Parameters of one recommendation request
///
/// Each field decodes independently, so a badly typed `limit` or `filters` falls back
/// to its default without losing the rest of the body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationQuery {
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub limit: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub filters: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub access_token: Option<String>,
}
