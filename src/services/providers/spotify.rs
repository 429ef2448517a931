/// Spotify Web API provider
///
/// Batch metadata lookups used by the enricher plus the `/me` profile used at sign-in.
/// All calls are bearer-token authenticated with the user's access token.
use crate::{
    error::{AppError, AppResult},
    models::{
        provider::{ApiArtistsResponse, ApiTracksResponse},
        ApiArtist, ApiProfile, ApiTrack,
    },
    services::providers::MetadataProvider,
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct SpotifyProvider {
    http_client: HttpClient,
    api_url: String,
}

impl SpotifyProvider {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        access_token: &str,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Spotify API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for SpotifyProvider {
    async fn fetch_tracks(&self, ids: &[String], access_token: &str) -> AppResult<Vec<ApiTrack>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response: ApiTracksResponse = self
            .get("/tracks", &[("ids", ids.join(","))], access_token)
            .await?;
        let tracks: Vec<ApiTrack> = response.tracks.into_iter().flatten().collect();

        tracing::debug!(
            requested = ids.len(),
            returned = tracks.len(),
            provider = self.name(),
            "Track batch fetched"
        );

        Ok(tracks)
    }

    async fn fetch_artists(&self, ids: &[String], access_token: &str) -> AppResult<Vec<ApiArtist>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response: ApiArtistsResponse = self
            .get("/artists", &[("ids", ids.join(","))], access_token)
            .await?;
        let artists: Vec<ApiArtist> = response.artists.into_iter().flatten().collect();

        tracing::debug!(
            requested = ids.len(),
            returned = artists.len(),
            provider = self.name(),
            "Artist batch fetched"
        );

        Ok(artists)
    }

    async fn fetch_profile(&self, access_token: &str) -> AppResult<ApiProfile> {
        self.get("/me", &[], access_token).await
    }

    fn name(&self) -> &'static str {
        "spotify"
    }
}
