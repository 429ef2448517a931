use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;

use crate::{
    config::ClientCredentials,
    error::{AppError, AppResult},
    models::{SessionToken, TokenEndpointReply, MISSING_CLIENT_CREDENTIALS},
    services::providers::TokenEndpoint,
};

/// Tokens are refreshed once less than this many seconds of lifetime remain.
pub const REFRESH_MARGIN_SECS: i64 = 60;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
const REFRESH_FAILED: &str = "Failed to refresh Spotify access token";
const MISSING_ACCESS_TOKEN: &str = "refresh response missing access token";

/// Keeps a session's access token usable, refreshing it silently before expiry.
///
/// Failures never propagate: the returned token carries an `error` annotation instead.
/// Permanent failures (revoked or invalid grant) wipe the credentials so the user has
/// to sign in again; anything else keeps the last known token for a later retry.
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    credentials: Option<ClientCredentials>,
    /// Set once a revocation has been logged; cleared by the next successful refresh.
    revocation_logged: AtomicBool,
}

impl TokenManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, credentials: Option<ClientCredentials>) -> Self {
        Self {
            endpoint,
            credentials,
            revocation_logged: AtomicBool::new(false),
        }
    }

    /// Whether a provider error means the refresh token can never be used again.
    pub fn is_revocation(message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        message.contains("invalid_grant") || message.contains("revoked")
    }

    pub fn revocation_logged(&self) -> bool {
        self.revocation_logged.load(Ordering::SeqCst)
    }

    /// Returns a token that is valid for at least another minute, refreshing if needed.
    pub async fn acquire(&self, current: SessionToken) -> SessionToken {
        self.acquire_at(current, Utc::now().timestamp()).await
    }

    pub async fn acquire_at(&self, current: SessionToken, now: i64) -> SessionToken {
        if current.is_fresh_at(now, REFRESH_MARGIN_SECS) {
            return current;
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::debug!("Token expiring but no refresh token is available");
            return current;
        };

        let Some(credentials) = self.credentials.as_ref() else {
            tracing::error!("Spotify client credentials are missing; cannot refresh token");
            return current.with_error(MISSING_CLIENT_CREDENTIALS);
        };

        match self.endpoint.refresh(credentials, &refresh_token).await {
            Err(e) => self.refresh_failed(current, e.to_string(), None),
            Ok(reply) if !reply.is_success() => {
                let message = reply.error_message().unwrap_or(REFRESH_FAILED).to_string();
                self.refresh_failed(current, message, Some(&reply))
            }
            Ok(reply) => self.refreshed(current, reply, now),
        }
    }

    fn refresh_failed(
        &self,
        current: SessionToken,
        message: String,
        reply: Option<&TokenEndpointReply>,
    ) -> SessionToken {
        let revoked = Self::is_revocation(&message);
        let should_log = !revoked || !self.revocation_logged.swap(true, Ordering::SeqCst);

        if should_log {
            tracing::warn!(
                status = reply.map(|r| r.status),
                body = reply.map(|r| r.raw.as_str()).unwrap_or_default(),
                revoked,
                error = %message,
                "Spotify token refresh failed"
            );
        }

        if revoked {
            current.invalidated(message)
        } else {
            current.with_error(message)
        }
    }

    fn refreshed(&self, current: SessionToken, reply: TokenEndpointReply, now: i64) -> SessionToken {
        let Some(body) = reply
            .body
            .filter(|body| body.access_token.as_deref().is_some_and(|t| !t.is_empty()))
        else {
            tracing::error!(body = %reply.raw, "Spotify refresh response missing access token");
            return current.with_error(MISSING_ACCESS_TOKEN);
        };

        self.revocation_logged.store(false, Ordering::SeqCst);
        tracing::info!("Spotify access token refreshed");

        SessionToken {
            access_token: body.access_token.unwrap_or_default(),
            refresh_token: body.refresh_token.or(current.refresh_token),
            expires_at: now + body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            token_type: body.token_type.or(current.token_type),
            error: None,
        }
    }

    /// Exchanges an authorization code for the session's first token pair.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<SessionToken> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            AppError::Config("Spotify client credentials are not configured".to_string())
        })?;

        let reply = self
            .endpoint
            .exchange_code(credentials, code, redirect_uri)
            .await?;

        if !reply.is_success() {
            let message = reply
                .error_message()
                .unwrap_or("Authorization code exchange failed")
                .to_string();
            return Err(AppError::ExternalApi(message));
        }

        let body = reply.body.unwrap_or_default();
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ExternalApi("Token response missing access token".to_string()))?;

        Ok(SessionToken {
            access_token,
            refresh_token: body.refresh_token,
            expires_at: Utc::now().timestamp() + body.expires_in.unwrap_or(0),
            token_type: body.token_type,
            error: None,
        })
    }
}
