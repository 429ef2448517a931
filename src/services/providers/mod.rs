/// External provider abstraction
///
/// The service talks to two provider surfaces: the Web API for track/artist metadata and
/// the accounts service for OAuth token grants. Both sit behind traits so the enrichment
/// and token lifecycle code can be exercised without network access.
use crate::{
    config::ClientCredentials,
    error::AppResult,
    models::{ApiArtist, ApiProfile, ApiTrack, TokenEndpointReply},
};

pub mod spotify;
pub mod spotify_accounts;

pub use spotify::SpotifyProvider;
pub use spotify_accounts::SpotifyAccounts;

/// Provider batch ceiling for `/tracks` and `/artists`
pub const BATCH_LIMIT: usize = 50;

/// Trait for track metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch up to `BATCH_LIMIT` tracks by id. Unknown ids are omitted from the result.
    async fn fetch_tracks(&self, ids: &[String], access_token: &str) -> AppResult<Vec<ApiTrack>>;

    /// Fetch up to `BATCH_LIMIT` artists by id.
    async fn fetch_artists(&self, ids: &[String], access_token: &str) -> AppResult<Vec<ApiArtist>>;

    /// Profile of the user owning `access_token`
    async fn fetch_profile(&self, access_token: &str) -> AppResult<ApiProfile>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Trait for the identity provider's token endpoint
///
/// Implementations return the reply as-is for any HTTP status; only transport
/// failures are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> AppResult<TokenEndpointReply>;

    async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> AppResult<TokenEndpointReply>;
}
