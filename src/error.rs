use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid action")]
    InvalidAction(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("External API error: {0}")]
    ExternalApi(String),

    /// Upstream failure reported to the caller with a fixed, generic message
    #[error("{0}")]
    Gateway(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingField(_) | AppError::InvalidAction(_) | AppError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::HttpClient(_) | AppError::ExternalApi(_) | AppError::Gateway(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation failures are surfaced verbatim and never forwarded upstream.
    pub fn is_validation(&self) -> bool {
        self.status() == StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
