use serde::Deserialize;

const DEFAULT_ENGINE_URL: &str = "http://tunescout.local.com:8080";
const DEFAULT_MUSIC_ENGINE_URL: &str = "http://music-engine:8000";
const DEFAULT_DEV_SESSION_SECRET: &str = "tunescout-dev-secret-0123456789abcdef";

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Recommendation engine base URL
    #[serde(default)]
    pub tunehub_api_url: Option<String>,

    /// Legacy name for the recommendation engine base URL
    #[serde(default)]
    pub tunescout_api_url: Option<String>,

    /// Engine-adjacent service serving feedback history and the cached pool
    #[serde(default)]
    pub music_engine_base_url: Option<String>,

    /// OAuth client identifier
    #[serde(default)]
    pub spotify_client_id: Option<String>,

    /// OAuth client secret
    #[serde(default)]
    pub spotify_client_secret: Option<String>,

    /// Spotify Web API base URL
    #[serde(default = "default_spotify_api_url")]
    pub spotify_api_url: String,

    /// Spotify accounts service (authorize + token endpoints)
    #[serde(default = "default_spotify_accounts_url")]
    pub spotify_accounts_url: String,

    /// Secret used to sign session cookies
    #[serde(default)]
    pub session_secret: Option<String>,

    /// Legacy name for the session secret
    #[serde(default)]
    pub auth_secret: Option<String>,

    /// Deployment environment ("development", "production", ...)
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Public hostname the service is reached at
    #[serde(default = "default_app_hostname")]
    pub app_hostname: String,

    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub ssl_cert_path: Option<String>,

    #[serde(default)]
    pub ssl_key_path: Option<String>,
}

/// Confidential OAuth client identifier/secret pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

fn default_spotify_api_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_app_hostname() -> String {
    "tunescout.local.com".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Trims a URL and strips one trailing slash; blank input yields `None`.
fn normalize_url(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.strip_suffix('/').unwrap_or(trimmed).to_string())
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Builds a configuration from explicit key/value pairs (same names as the environment).
    pub fn from_pairs<I, K, V>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs.into_iter().map(|(k, v)| (k.into(), v.into()));
        envy::from_iter::<_, Config>(vars).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Recommendation engine base URL, falling back to the legacy variable, then the default.
    pub fn engine_url(&self) -> String {
        normalize_url(non_blank(self.tunehub_api_url.as_ref()))
            .or_else(|| normalize_url(non_blank(self.tunescout_api_url.as_ref())))
            .unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string())
    }

    pub fn music_engine_url(&self) -> String {
        normalize_url(self.music_engine_base_url.as_deref())
            .unwrap_or_else(|| DEFAULT_MUSIC_ENGINE_URL.to_string())
    }

    pub fn spotify_api_url(&self) -> String {
        normalize_url(Some(&self.spotify_api_url)).unwrap_or_else(default_spotify_api_url)
    }

    pub fn spotify_accounts_url(&self) -> String {
        normalize_url(Some(&self.spotify_accounts_url)).unwrap_or_else(default_spotify_accounts_url)
    }

    /// Client credentials, present only when both halves are non-blank.
    pub fn client_credentials(&self) -> Option<ClientCredentials> {
        let client_id = non_blank(self.spotify_client_id.as_ref())?;
        let client_secret = non_blank(self.spotify_client_secret.as_ref())?;
        Some(ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.trim().eq_ignore_ascii_case("production")
    }

    /// Resolves the session-signing secret.
    ///
    /// Outside production an unset secret falls back to a fixed development value.
    pub fn session_secret(&self) -> anyhow::Result<String> {
        if let Some(secret) = non_blank(self.session_secret.as_ref())
            .or_else(|| non_blank(self.auth_secret.as_ref()))
        {
            return Ok(secret.to_string());
        }

        if self.is_production() {
            anyhow::bail!("SESSION_SECRET (or AUTH_SECRET) must be set in production");
        }

        tracing::warn!(
            "SESSION_SECRET/AUTH_SECRET not set, falling back to the development session secret"
        );
        Ok(DEFAULT_DEV_SESSION_SECRET.to_string())
    }

    pub fn tls_configured(&self) -> bool {
        non_blank(self.ssl_cert_path.as_ref()).is_some()
            && non_blank(self.ssl_key_path.as_ref()).is_some()
    }

    /// Base URL browsers reach the service at; used for OAuth redirects.
    pub fn external_base_url(&self) -> String {
        let scheme = if self.tls_configured() { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.app_hostname.trim(), self.port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
