use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder name used whenever no artist is known for a track
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Artist entry as displayed to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationArtist {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl RecommendationArtist {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            image: None,
        }
    }

    pub fn unknown() -> Self {
        Self::named(UNKNOWN_ARTIST)
    }
}

/// Artist value as sent by the engine: either a bare name or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArtist {
    Name(String),
    Entry {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    Unrecognized(serde_json::Value),
}

impl RawArtist {
    /// Decodes into a display artist; entries without a usable name yield `None`.
    pub fn decode(&self) -> Option<RecommendationArtist> {
        match self {
            RawArtist::Name(name) => {
                let name = name.trim();
                (!name.is_empty()).then(|| RecommendationArtist::named(name))
            }
            RawArtist::Entry { id, name, image } => {
                let name = name.as_deref().filter(|n| !n.trim().is_empty())?;
                Some(RecommendationArtist {
                    id: id.clone(),
                    name: name.to_string(),
                    image: image.clone(),
                })
            }
            RawArtist::Unrecognized(_) => None,
        }
    }
}

/// Accepts `null`, a comma-joined string, or a list of names/objects.
fn deserialize_artists<'de, D>(deserializer: D) -> Result<Vec<RawArtist>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Artists {
        Joined(String),
        List(Vec<RawArtist>),
    }

    Ok(match Option::<Artists>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Artists::List(list)) => list,
        Some(Artists::Joined(joined)) => joined
            .split(',')
            .map(|name| RawArtist::Name(name.trim().to_string()))
            .collect(),
    })
}

/// Recommendation as produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRecommendation {
    #[serde(alias = "track_id")]
    pub track_id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_artists")]
    pub artists: Vec<RawArtist>,
    #[serde(default, alias = "album_image")]
    pub album_image: Option<String>,
}

impl BaseRecommendation {
    pub fn new(track_id: impl Into<String>, score: f64) -> Self {
        Self {
            track_id: track_id.into(),
            score,
            reason: None,
            title: None,
            artists: Vec::new(),
            album_image: None,
        }
    }

    /// Degraded rendering built from backend fields only.
    ///
    /// The title falls back to the raw track id and the artist list to a single
    /// "Unknown artist" placeholder.
    pub fn to_fallback(&self) -> EnrichedRecommendation {
        let mut artists: Vec<RecommendationArtist> =
            self.artists.iter().filter_map(RawArtist::decode).collect();
        if artists.is_empty() {
            artists.push(RecommendationArtist::unknown());
        }

        let title = self
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.track_id)
            .to_string();

        EnrichedRecommendation {
            track_id: self.track_id.clone(),
            score: self.score,
            reason: self.reason.clone(),
            title,
            artists,
            album_image: self.album_image.clone(),
            preview_url: None,
            spotify_url: None,
        }
    }
}

/// Display-ready recommendation returned to the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecommendation {
    pub track_id: String,
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    pub title: String,
    pub artists: Vec<RecommendationArtist>,
    #[serde(default)]
    pub album_image: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub spotify_url: Option<String>,
}

impl EnrichedRecommendation {
    /// Overlays provider metadata on top of this recommendation.
    pub fn merge_details(self, details: &TrackDetails) -> Self {
        let artists = if details.artists.is_empty() {
            self.artists
        } else {
            details.artists.clone()
        };

        Self {
            track_id: self.track_id,
            score: self.score,
            reason: self.reason,
            title: details.title.clone().unwrap_or(self.title),
            artists,
            album_image: details.album_image.clone().or(self.album_image),
            preview_url: details.preview_url.clone().or(self.preview_url),
            spotify_url: details.spotify_url.clone().or(self.spotify_url),
        }
    }
}

/// Provider metadata resolved for one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDetails {
    pub id: String,
    pub title: Option<String>,
    pub album_image: Option<String>,
    pub preview_url: Option<String>,
    pub spotify_url: Option<String>,
    pub artists: Vec<RecommendationArtist>,
}

/// `{userId, recommendations}` envelope shared by the engine and this service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse<T> {
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(default = "Vec::new")]
    pub recommendations: Vec<T>,
}

impl<T> RecommendationResponse<T> {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            recommendations: Vec::new(),
        }
    }
}

/// Entry of the engine's pre-computed pool (snake_case wire shape)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CachedRecommendation {
    pub track_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_artists")]
    pub artists: Vec<RawArtist>,
    #[serde(default)]
    pub album_image: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<CachedRecommendation> for BaseRecommendation {
    fn from(cached: CachedRecommendation) -> Self {
        Self {
            track_id: cached.track_id,
            score: cached.score,
            reason: cached.reason,
            title: cached.title,
            artists: cached.artists,
            album_image: cached.album_image,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachedPoolResponse {
    #[serde(default)]
    pub recommendations: Vec<CachedRecommendation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackHistoryResponse {
    #[serde(default)]
    pub track_ids: Vec<String>,
}
