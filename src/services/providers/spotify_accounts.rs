/// Spotify accounts service (OAuth2 token endpoint)
use crate::{
    config::ClientCredentials,
    error::AppResult,
    models::{TokenEndpointReply, TokenEndpointResponse},
    services::providers::TokenEndpoint,
};
use reqwest::Client as HttpClient;

#[derive(Clone)]
pub struct SpotifyAccounts {
    http_client: HttpClient,
    accounts_url: String,
}

impl SpotifyAccounts {
    pub fn new(http_client: HttpClient, accounts_url: String) -> Self {
        Self {
            http_client,
            accounts_url,
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.accounts_url)
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.accounts_url)
    }

    async fn post_grant(
        &self,
        credentials: &ClientCredentials,
        form: &[(&str, &str)],
    ) -> AppResult<TokenEndpointReply> {
        let response = self
            .http_client
            .post(self.token_url())
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let raw = response.text().await?;
        Ok(decode_reply(status, raw))
    }
}

/// Keeps the raw body and decodes it when possible; empty or unparseable bodies
/// leave `body` unset so the caller classifies by status alone.
fn decode_reply(status: u16, raw: String) -> TokenEndpointReply {
    let body = if raw.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<TokenEndpointResponse>(&raw) {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::error!(error = %e, status, "Failed to parse token endpoint response");
                None
            }
        }
    };

    TokenEndpointReply { status, body, raw }
}

#[async_trait::async_trait]
impl TokenEndpoint for SpotifyAccounts {
    async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> AppResult<TokenEndpointReply> {
        self.post_grant(
            credentials,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> AppResult<TokenEndpointReply> {
        self.post_grant(
            credentials,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_successful_grant() {
        let reply = decode_reply(
            200,
            r#"{"access_token":"a","token_type":"Bearer","expires_in":3600,"scope":"user-read-email"}"#
                .to_string(),
        );

        assert!(reply.is_success());
        let body = reply.body.unwrap();
        assert_eq!(body.access_token.as_deref(), Some("a"));
        assert_eq!(body.expires_in, Some(3600));
        assert_eq!(body.refresh_token, None);
    }

    #[test]
    fn test_decode_error_grant() {
        let reply = decode_reply(
            400,
            r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#.to_string(),
        );

        assert!(!reply.is_success());
        assert_eq!(reply.error_message(), Some("Refresh token revoked"));
    }

    #[test]
    fn test_decode_empty_body() {
        let reply = decode_reply(500, "  ".to_string());

        assert!(reply.body.is_none());
        assert_eq!(reply.error_message(), None);
        assert_eq!(reply.raw, "  ");
    }

    #[test]
    fn test_decode_unparseable_body_keeps_raw_text() {
        let reply = decode_reply(502, "<html>Bad Gateway</html>".to_string());

        assert!(reply.body.is_none());
        assert_eq!(reply.status, 502);
        assert_eq!(reply.raw, "<html>Bad Gateway</html>");
    }

    #[test]
    fn test_urls_are_built_from_accounts_base() {
        let accounts = SpotifyAccounts::new(HttpClient::new(), "https://accounts.example".to_string());
        assert_eq!(accounts.authorize_url(), "https://accounts.example/authorize");
        assert_eq!(accounts.token_url(), "https://accounts.example/api/token");
    }
}
