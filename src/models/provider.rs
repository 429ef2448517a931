// ============================================================================
// Spotify Web API Types
// ============================================================================

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiImage {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiTrackArtist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiAlbum {
    #[serde(default)]
    pub images: Vec<ApiImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// Raw track from `GET /tracks`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_urls: Option<ApiExternalUrls>,
    #[serde(default)]
    pub album: Option<ApiAlbum>,
    #[serde(default)]
    pub artists: Vec<ApiTrackArtist>,
}

impl ApiTrack {
    pub fn album_image(&self) -> Option<String> {
        self.album
            .as_ref()
            .and_then(|album| album.images.first())
            .and_then(|image| image.url.clone())
    }
}

/// Raw artist from `GET /artists`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiArtist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
}

impl ApiArtist {
    pub fn image(&self) -> Option<String> {
        self.images.first().and_then(|image| image.url.clone())
    }
}

/// Batch envelopes; unknown ids come back as `null` entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiTracksResponse {
    #[serde(default)]
    pub tracks: Vec<Option<ApiTrack>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<ApiArtist>>,
}

/// Current user from `GET /me`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
}
