use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::future::join_all;

use crate::{
    models::{
        ApiArtist, ApiTrack, BaseRecommendation, EnrichedRecommendation, RecommendationArtist,
        TrackDetails, UNKNOWN_ARTIST,
    },
    services::providers::{MetadataProvider, BATCH_LIMIT},
};

const TRACK_ID_LEN: usize = 22;

/// Turns bare track ids into display-ready metadata, best effort.
///
/// Provider failures are isolated per batch and degrade to an empty contribution, so
/// enrichment never fails a recommendation request.
pub struct MetadataEnricher {
    provider: Arc<dyn MetadataProvider>,
    /// Invalid ids already reported, so each one is logged once per enricher.
    logged_invalid_ids: Mutex<HashSet<String>>,
}

impl MetadataEnricher {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            logged_invalid_ids: Mutex::new(HashSet::new()),
        }
    }

    /// Provider track ids are exactly 22 ASCII alphanumerics.
    pub fn is_valid_track_id(id: &str) -> bool {
        id.len() == TRACK_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Degraded rendering used when provider metadata is unavailable.
    pub fn fallback(recommendations: &[BaseRecommendation]) -> Vec<EnrichedRecommendation> {
        recommendations
            .iter()
            .map(BaseRecommendation::to_fallback)
            .collect()
    }

    /// Enriches engine recommendations with provider metadata.
    ///
    /// Without a token, or when the provider yields nothing, the fallback rendering is
    /// returned. Recommendations the provider does not know keep their fallback fields.
    pub async fn enrich(
        &self,
        recommendations: &[BaseRecommendation],
        access_token: Option<&str>,
    ) -> Vec<EnrichedRecommendation> {
        if recommendations.is_empty() {
            return Vec::new();
        }

        let base = Self::fallback(recommendations);
        let Some(access_token) = access_token.filter(|t| !t.trim().is_empty()) else {
            return base;
        };

        let track_ids: Vec<String> = recommendations
            .iter()
            .map(|rec| rec.track_id.clone())
            .collect();
        let details = self.load_track_details(&track_ids, Some(access_token)).await;

        if details.is_empty() {
            tracing::info!(
                count = base.len(),
                "No provider metadata available, using fallback recommendations"
            );
            return base;
        }

        let by_id: HashMap<&str, &TrackDetails> =
            details.iter().map(|d| (d.id.as_str(), d)).collect();

        base.into_iter()
            .map(|rec| match by_id.get(rec.track_id.as_str()) {
                Some(details) => rec.merge_details(details),
                None => rec,
            })
            .collect()
    }

    /// Loads track and artist metadata for `track_ids`.
    ///
    /// Returns an empty list without a token, without valid ids, or when every batch
    /// failed.
    pub async fn load_track_details(
        &self,
        track_ids: &[String],
        access_token: Option<&str>,
    ) -> Vec<TrackDetails> {
        let Some(access_token) = access_token.filter(|t| !t.trim().is_empty()) else {
            return Vec::new();
        };
        if track_ids.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let (valid_ids, invalid_ids): (Vec<String>, Vec<String>) = track_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .partition(|id| Self::is_valid_track_id(id));

        self.log_invalid_ids(invalid_ids);

        if valid_ids.is_empty() {
            return Vec::new();
        }

        let track_batches = join_all(
            valid_ids
                .chunks(BATCH_LIMIT)
                .map(|chunk| self.track_batch(chunk, access_token)),
        )
        .await;
        let tracks: Vec<ApiTrack> = track_batches
            .into_iter()
            .flatten()
            .filter(|track| track.id.as_deref().is_some_and(|id| !id.is_empty()))
            .collect();

        if tracks.is_empty() {
            return Vec::new();
        }

        let mut seen_artists = HashSet::new();
        let artist_ids: Vec<String> = tracks
            .iter()
            .flat_map(|track| track.artists.iter())
            .filter_map(|artist| artist.id.clone())
            .filter(|id| !id.is_empty() && seen_artists.insert(id.clone()))
            .collect();

        let artist_batches = join_all(
            artist_ids
                .chunks(BATCH_LIMIT)
                .map(|chunk| self.artist_batch(chunk, access_token)),
        )
        .await;
        let artists: HashMap<String, ApiArtist> = artist_batches
            .into_iter()
            .flatten()
            .filter_map(|artist| artist.id.clone().map(|id| (id, artist)))
            .collect();

        tracing::debug!(
            tracks = tracks.len(),
            artists = artists.len(),
            provider = self.provider.name(),
            "Track metadata loaded"
        );

        tracks
            .into_iter()
            .map(|track| Self::to_details(track, &artists))
            .collect()
    }

    fn to_details(track: ApiTrack, artists: &HashMap<String, ApiArtist>) -> TrackDetails {
        let album_image = track.album_image();
        let artist_entries = track
            .artists
            .into_iter()
            .map(|artist| {
                let image = artist
                    .id
                    .as_ref()
                    .and_then(|id| artists.get(id))
                    .and_then(ApiArtist::image);
                RecommendationArtist {
                    id: artist.id,
                    name: artist
                        .name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
                    image,
                }
            })
            .collect();

        TrackDetails {
            id: track.id.unwrap_or_default(),
            title: track.name.filter(|n| !n.trim().is_empty()),
            album_image,
            preview_url: track.preview_url,
            spotify_url: track.external_urls.and_then(|urls| urls.spotify),
            artists: artist_entries,
        }
    }

    async fn track_batch(&self, ids: &[String], access_token: &str) -> Vec<ApiTrack> {
        match self.provider.fetch_tracks(ids, access_token).await {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    batch_size = ids.len(),
                    provider = self.provider.name(),
                    "Track batch failed"
                );
                Vec::new()
            }
        }
    }

    async fn artist_batch(&self, ids: &[String], access_token: &str) -> Vec<ApiArtist> {
        match self.provider.fetch_artists(ids, access_token).await {
            Ok(artists) => artists,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    batch_size = ids.len(),
                    provider = self.provider.name(),
                    "Artist batch failed"
                );
                Vec::new()
            }
        }
    }

    fn log_invalid_ids(&self, invalid_ids: Vec<String>) {
        if invalid_ids.is_empty() {
            return;
        }

        let mut logged = self
            .logged_invalid_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let fresh = invalid_ids
            .into_iter()
            .filter(|id| logged.insert(id.clone()))
            .count();

        if fresh > 0 {
            tracing::info!(count = fresh, "Skipping invalid Spotify track identifiers");
        }
    }

    /// Number of distinct invalid ids reported so far.
    pub fn logged_invalid_count(&self) -> usize {
        self.logged_invalid_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
