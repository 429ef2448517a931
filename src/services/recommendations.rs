use std::{collections::HashSet, sync::Arc};

use crate::{
    error::{AppError, AppResult},
    models::{
        BaseRecommendation, EnrichedRecommendation, FeedbackPayload, RecommendationQuery,
        RecommendationResponse,
    },
    services::{
        engine::{EngineRecommendationRequest, RecommendationEngine, DEFAULT_LIMIT},
        enricher::MetadataEnricher,
    },
};

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Composes the engine, the enricher and the user's feedback history into one
/// recommendation response.
///
/// Flow for a request with a token:
/// 1. Fresh recommendations are fetched and enriched while the feedback history loads
/// 2. Every already-rated track is filtered out
/// 3. If nothing survives, the engine's cached pool (filtered the same way) is used
///    instead, when it has anything left
pub struct RecommendationService {
    engine: Arc<dyn RecommendationEngine>,
    enricher: Arc<MetadataEnricher>,
}

impl RecommendationService {
    pub fn new(engine: Arc<dyn RecommendationEngine>, enricher: Arc<MetadataEnricher>) -> Self {
        Self { engine, enricher }
    }

    /// Forwards a recommendation request to the engine.
    ///
    /// Without an access token the engine is not called and the list is empty:
    /// unauthenticated users get no curated content.
    pub async fn request_recommendations(
        &self,
        user_id: &str,
        limit: Option<u32>,
        filters: Vec<String>,
        access_token: Option<&str>,
    ) -> AppResult<RecommendationResponse<BaseRecommendation>> {
        let Some(access_token) = non_blank(access_token) else {
            tracing::debug!(user_id = %user_id, "No access token, skipping engine call");
            return Ok(RecommendationResponse::empty(user_id));
        };

        let request = EngineRecommendationRequest {
            user_id: user_id.to_string(),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            filters,
            access_token: Some(access_token.to_string()),
        };

        self.engine.recommend(&request).await
    }

    /// Validates and relays one feedback action for `user_id`.
    pub async fn submit_feedback(&self, user_id: &str, payload: FeedbackPayload) -> AppResult<()> {
        let event = payload.into_event(user_id)?;
        self.engine.submit_feedback(&event).await
    }

    /// Filter tags offered by the engine; empty when the engine is unavailable.
    pub async fn list_available_filters(&self) -> Vec<String> {
        match self.engine.list_filters().await {
            Ok(filters) => filters,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch available filters");
                Vec::new()
            }
        }
    }

    /// Track ids the user has already rated; empty when the lookup fails.
    async fn feedback_history(&self, user_id: &str) -> HashSet<String> {
        match self.engine.feedback_track_ids(user_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to fetch feedback track ids");
                HashSet::new()
            }
        }
    }

    /// The engine's pre-computed pool, rendered from its own fields.
    async fn cached_pool(&self, user_id: &str) -> Vec<EnrichedRecommendation> {
        match self.engine.cached_recommendations(user_id).await {
            Ok(pool) => pool
                .into_iter()
                .map(|cached| BaseRecommendation::from(cached).to_fallback())
                .collect(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to fetch cached recommendations");
                Vec::new()
            }
        }
    }

    pub async fn recommend(
        &self,
        query: RecommendationQuery,
    ) -> AppResult<RecommendationResponse<EnrichedRecommendation>> {
        let user_id = match query.user_id {
            Some(user_id) if !user_id.trim().is_empty() => user_id,
            _ => return Err(AppError::MissingField("userId")),
        };

        let Some(access_token) = non_blank(query.access_token.as_deref()) else {
            return Ok(RecommendationResponse::empty(user_id));
        };

        let fresh = async {
            let response = self
                .request_recommendations(
                    &user_id,
                    query.limit,
                    query.filters.clone().unwrap_or_default(),
                    Some(access_token),
                )
                .await?;
            let enriched = self
                .enricher
                .enrich(&response.recommendations, Some(access_token))
                .await;
            Ok::<_, AppError>((response.user_id, enriched))
        };
        let (fresh, history) = tokio::join!(fresh, self.feedback_history(&user_id));
        let (engine_user_id, enriched) = fresh?;

        let filtered: Vec<EnrichedRecommendation> = enriched
            .into_iter()
            .filter(|rec| !history.contains(&rec.track_id))
            .collect();

        if filtered.is_empty() {
            tracing::info!(
                user_id = %user_id,
                rated = history.len(),
                "No fresh recommendations after filtering, checking cached pool"
            );

            let cached: Vec<EnrichedRecommendation> = self
                .cached_pool(&user_id)
                .await
                .into_iter()
                .filter(|rec| !history.contains(&rec.track_id))
                .collect();

            if !cached.is_empty() {
                tracing::info!(user_id = %user_id, count = cached.len(), "Using cached recommendations");
                return Ok(RecommendationResponse {
                    user_id,
                    recommendations: cached,
                });
            }
        }

        let user_id = if engine_user_id.trim().is_empty() {
            user_id
        } else {
            engine_user_id
        };

        Ok(RecommendationResponse {
            user_id,
            recommendations: filtered,
        })
    }
}
