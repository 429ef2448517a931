/// HTTP transport used by the recommendation client
use reqwest::{Client as HttpClient, Response};
use serde::Serialize;
use serde_json::Value;

use crate::models::{EnrichedRecommendation, FeedbackAction, RecommendationResponse};

use super::ClientError;

/// Body of `POST /api/recommendations`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsRequest {
    pub user_id: String,
    pub limit: u32,
    pub filters: Vec<String>,
    pub access_token: Option<String>,
}

/// Body of `POST /api/recommendations/feedback`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub user_id: String,
    pub track_id: String,
    pub action: FeedbackAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Trait for the recommendation endpoints as seen from a client
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationsApi: Send + Sync {
    async fn fetch_recommendations(
        &self,
        request: &RecommendationsRequest,
    ) -> Result<RecommendationResponse<EnrichedRecommendation>, ClientError>;

    async fn send_feedback(&self, request: &FeedbackRequest) -> Result<(), ClientError>;
}

#[derive(Clone)]
pub struct HttpRecommendationsApi {
    http_client: HttpClient,
    base_url: String,
    session_cookie: Option<String>,
}

impl HttpRecommendationsApi {
    pub fn new(http_client: HttpClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
        }
    }

    /// Sends `cookie` (a full `name=value` pair) with every request.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http_client.post(format!("{}{}", self.base_url, path));
        match &self.session_cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
            None => request,
        }
    }

    async fn read_error_message(response: Response) -> Option<String> {
        let text = response.text().await.ok()?;
        error_message(text)
    }
}

/// `error` field of a JSON body, else the raw text when it is not blank.
fn error_message(text: String) -> Option<String> {
    if let Ok(Value::Object(body)) = serde_json::from_str::<Value>(&text) {
        match body.get("error") {
            Some(Value::String(message)) => return Some(message.clone()),
            Some(Value::Null) | None => {}
            Some(other) => return Some(other.to_string()),
        }
    }
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait::async_trait]
impl RecommendationsApi for HttpRecommendationsApi {
    async fn fetch_recommendations(
        &self,
        request: &RecommendationsRequest,
    ) -> Result<RecommendationResponse<EnrichedRecommendation>, ClientError> {
        let response = self.post("/api/recommendations").json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = Self::read_error_message(response)
                .await
                .unwrap_or_else(|| format!("Failed to fetch recommendations ({})", status));
            return Err(ClientError::Api(message));
        }

        Ok(response.json().await?)
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Result<(), ClientError> {
        let response = self
            .post("/api/recommendations/feedback")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = Self::read_error_message(response)
                .await
                .unwrap_or_else(|| format!("Feedback submission failed ({})", status));
            return Err(ClientError::Api(message));
        }

        Ok(())
    }
}
