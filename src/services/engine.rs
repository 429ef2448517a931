/// Internal recommendation engine client
///
/// Two base URLs are involved: the engine API (recommendations, feedback, filters) and the
/// engine-adjacent music service that serves feedback history and the pre-computed pool.
use crate::{
    error::{AppError, AppResult},
    models::{
        recommendation::{CachedPoolResponse, FeedbackHistoryResponse},
        BaseRecommendation, CachedRecommendation, FeedbackEvent, RecommendationResponse,
    },
};
use reqwest::{Client as HttpClient, Response};
use serde::Serialize;
use serde_json::Value;

/// Default number of recommendations asked from the engine
pub const DEFAULT_LIMIT: u32 = 6;

/// Request body for `POST /api/recommendations`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRecommendationRequest {
    pub user_id: String,
    pub limit: u32,
    pub filters: Vec<String>,
    pub access_token: Option<String>,
}

/// Trait for the recommendation engine
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationEngine: Send + Sync {
    /// Fresh recommendations for a user
    async fn recommend(
        &self,
        request: &EngineRecommendationRequest,
    ) -> AppResult<RecommendationResponse<BaseRecommendation>>;

    /// Forward one like/dislike event
    async fn submit_feedback(&self, event: &FeedbackEvent) -> AppResult<()>;

    /// Filter tags the engine understands
    async fn list_filters(&self) -> AppResult<Vec<String>>;

    /// Every track id the user has rated, liked or disliked
    async fn feedback_track_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Pre-computed recommendation pool for a user
    async fn cached_recommendations(&self, user_id: &str) -> AppResult<Vec<CachedRecommendation>>;
}

#[derive(Clone)]
pub struct HttpEngine {
    http_client: HttpClient,
    api_url: String,
    music_engine_url: String,
}

impl HttpEngine {
    pub fn new(http_client: HttpClient, api_url: String, music_engine_url: String) -> Self {
        Self {
            http_client,
            api_url,
            music_engine_url,
        }
    }

    async fn ensure_success(response: Response, operation: &str) -> AppResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ExternalApi(error_message(status, &body, operation)))
    }
}

/// Error text for a failed engine call: the body's `message` field when present,
/// otherwise "<operation> request failed with status N".
fn error_message(status: u16, body: &str, operation: &str) -> String {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => match fields.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        },
        _ => None,
    };

    message.unwrap_or_else(|| format!("{} request failed with status {}", operation, status))
}

/// Filter tags from the engine's reply: anything but an array is empty, non-string
/// elements are rendered as JSON text.
fn filter_tags(body: Value) -> Vec<String> {
    match body {
        Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait::async_trait]
impl RecommendationEngine for HttpEngine {
    async fn recommend(
        &self,
        request: &EngineRecommendationRequest,
    ) -> AppResult<RecommendationResponse<BaseRecommendation>> {
        let url = format!("{}/api/recommendations", self.api_url);
        let response = self.http_client.post(&url).json(request).send().await?;
        let response = Self::ensure_success(response, "Recommendation").await?;

        let body: RecommendationResponse<BaseRecommendation> = response.json().await?;

        tracing::info!(
            user_id = %request.user_id,
            limit = request.limit,
            results = body.recommendations.len(),
            "Engine recommendations received"
        );

        Ok(body)
    }

    async fn submit_feedback(&self, event: &FeedbackEvent) -> AppResult<()> {
        let url = format!("{}/api/recommendations/feedback", self.api_url);
        let response = self.http_client.post(&url).json(event).send().await?;
        Self::ensure_success(response, "Feedback").await?;

        tracing::info!(
            user_id = %event.user_id,
            track_id = %event.track_id,
            action = %event.action,
            "Feedback forwarded to engine"
        );

        Ok(())
    }

    async fn list_filters(&self) -> AppResult<Vec<String>> {
        let url = format!("{}/api/recommendations/filters", self.api_url);
        let response = self.http_client.get(&url).send().await?;
        let response = Self::ensure_success(response, "Filter").await?;

        let body: Value = response.json().await?;
        Ok(filter_tags(body))
    }

    async fn feedback_track_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let url = format!("{}/feedback/tracks", self.music_engine_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let response = Self::ensure_success(response, "Feedback history").await?;

        let body: FeedbackHistoryResponse = response.json().await?;
        Ok(body.track_ids)
    }

    async fn cached_recommendations(&self, user_id: &str) -> AppResult<Vec<CachedRecommendation>> {
        let url = format!("{}/recommendations/cached", self.music_engine_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let response = Self::ensure_success(response, "Cached recommendation").await?;

        let body: CachedPoolResponse = response.json().await?;
        Ok(body.recommendations)
    }
}
