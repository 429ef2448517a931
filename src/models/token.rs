use serde::{Deserialize, Serialize};

/// Error annotation set when a refresh is needed but no client credentials are configured.
pub const MISSING_CLIENT_CREDENTIALS: &str = "MissingClientCredentials";

/// OAuth2 token pair stored in a user's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionToken {
    /// True when the token still has more than `margin_secs` of lifetime left at `now`.
    pub fn is_fresh_at(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at > 0 && now < self.expires_at - margin_secs
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// True once `invalidated` wiped the credentials; only a new sign-in helps.
    pub fn requires_sign_in(&self) -> bool {
        self.error.is_some() && !self.has_access_token() && self.refresh_token.is_none()
    }

    /// Same token with only the error annotation replaced.
    pub fn with_error(self, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..self
        }
    }

    /// Drops every credential so the owner has to sign in again.
    pub fn invalidated(self, error: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            expires_at: 0,
            token_type: self.token_type,
            error: Some(error.into()),
        }
    }
}

/// Body returned by the identity provider's token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenEndpointResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Raw reply from the token endpoint, kept whole so failures can be classified.
#[derive(Debug, Clone)]
pub struct TokenEndpointReply {
    pub status: u16,
    pub body: Option<TokenEndpointResponse>,
    pub raw: String,
}

impl TokenEndpointReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Provider error text: description first, then the error code.
    pub fn error_message(&self) -> Option<&str> {
        let body = self.body.as_ref()?;
        body.error_description
            .as_deref()
            .or(body.error.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_respects_margin() {
        let token = SessionToken {
            access_token: "a".to_string(),
            expires_at: 1_000,
            ..Default::default()
        };
        assert!(token.is_fresh_at(900, 60));
        assert!(!token.is_fresh_at(940, 60));
        assert!(!token.is_fresh_at(1_200, 60));
    }

    #[test]
    fn test_zero_expiry_is_never_fresh() {
        let token = SessionToken {
            access_token: "a".to_string(),
            expires_at: 0,
            ..Default::default()
        };
        assert!(!token.is_fresh_at(0, 60));
    }

    #[test]
    fn test_invalidated_clears_credentials() {
        let token = SessionToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: 100,
            token_type: Some("Bearer".to_string()),
            error: None,
        }
        .invalidated("invalid_grant");

        assert_eq!(token.access_token, "");
        assert_eq!(token.refresh_token, None);
        assert_eq!(token.expires_at, 0);
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        assert_eq!(token.error.as_deref(), Some("invalid_grant"));
        assert!(token.requires_sign_in());
    }

    #[test]
    fn test_transient_error_does_not_require_sign_in() {
        let token = SessionToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: 100,
            ..Default::default()
        }
        .with_error("temporarily_unavailable");
        assert!(!token.requires_sign_in());
        assert!(!SessionToken::default().requires_sign_in());
    }

    #[test]
    fn test_reply_error_message_prefers_description() {
        let reply = TokenEndpointReply {
            status: 400,
            body: Some(TokenEndpointResponse {
                error: Some("invalid_grant".to_string()),
                error_description: Some("Refresh token revoked".to_string()),
                ..Default::default()
            }),
            raw: String::new(),
        };
        assert_eq!(reply.error_message(), Some("Refresh token revoked"));
        assert!(!reply.is_success());
    }
}
