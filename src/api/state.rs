use std::sync::Arc;
use std::time::Instant;

use crate::{
    config::Config,
    services::{
        providers::{MetadataProvider, SpotifyAccounts, SpotifyProvider},
        HttpEngine, MetadataEnricher, RecommendationEngine, RecommendationService, TokenManager,
    },
};

use super::session::SessionStore;

/// OAuth parameters used by the sign-in flow
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub authorize_url: String,
    pub client_id: Option<String>,
    pub redirect_uri: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
    pub token_manager: Arc<TokenManager>,
    pub provider: Arc<dyn MetadataProvider>,
    pub sessions: Arc<SessionStore>,
    pub auth: Arc<AuthSettings>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the state from already-built collaborators.
    pub fn new(
        engine: Arc<dyn RecommendationEngine>,
        provider: Arc<dyn MetadataProvider>,
        token_manager: TokenManager,
        sessions: SessionStore,
        auth: AuthSettings,
    ) -> Self {
        let enricher = Arc::new(MetadataEnricher::new(provider.clone()));

        Self {
            recommendations: Arc::new(RecommendationService::new(engine, enricher)),
            token_manager: Arc::new(token_manager),
            provider,
            sessions: Arc::new(sessions),
            auth: Arc::new(auth),
            started_at: Instant::now(),
        }
    }

    /// Builds the production state: HTTP engine, Spotify provider and accounts service.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("tunescout-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let engine = Arc::new(HttpEngine::new(
            http_client.clone(),
            config.engine_url(),
            config.music_engine_url(),
        ));
        let provider = Arc::new(SpotifyProvider::new(
            http_client.clone(),
            config.spotify_api_url(),
        ));
        let accounts = SpotifyAccounts::new(http_client, config.spotify_accounts_url());

        let credentials = config.client_credentials();
        if credentials.is_none() {
            tracing::warn!("Spotify client credentials are not configured, sign-in and token refresh are disabled");
        }

        let auth = AuthSettings {
            authorize_url: accounts.authorize_url(),
            client_id: credentials.as_ref().map(|c| c.client_id.clone()),
            redirect_uri: format!("{}/api/auth/callback", config.external_base_url()),
        };
        let token_manager = TokenManager::new(Arc::new(accounts), credentials);
        let sessions = SessionStore::new(&config.session_secret()?, config.tls_configured())?;

        tracing::info!(
            engine_url = %config.engine_url(),
            music_engine_url = %config.music_engine_url(),
            redirect_uri = %auth.redirect_uri,
            "Application state initialised"
        );

        Ok(Self::new(engine, provider, token_manager, sessions, auth))
    }
}
