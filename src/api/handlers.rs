use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        EnrichedRecommendation, FeedbackPayload, RecommendationQuery, RecommendationResponse,
        Session, SessionUser,
    },
};

use super::{
    session::{AuthSession, SessionStore},
    AppState,
};

/// Permissions requested at sign-in
pub const OAUTH_SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "user-top-read",
    "user-read-recently-played",
    "user-read-playback-state",
    "user-read-currently-playing",
    "user-read-playback-position",
    "user-library-read",
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-follow-read",
];

/// Where the browser lands after signing in
const POST_SIGN_IN_PATH: &str = "/dashboard";

/// Parses a JSON body, treating anything unparseable as an empty object.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `POST /api/recommendations`
pub async fn recommend(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<RecommendationResponse<EnrichedRecommendation>>> {
    let query: RecommendationQuery = parse_body(&body);

    match state.recommendations.recommend(query).await {
        Ok(response) => {
            tracing::info!(
                user_id = %response.user_id,
                count = response.recommendations.len(),
                "Recommendations served"
            );
            Ok(Json(response))
        }
        Err(e) if e.is_validation() => Err(e),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch recommendations");
            Err(AppError::Gateway("Failed to fetch recommendations"))
        }
    }
}

/// `POST /api/recommendations/feedback`
pub async fn submit_feedback(
    State(state): State<AppState>,
    auth: AuthSession,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    let payload: FeedbackPayload = parse_body(&body);
    let user_id = auth.user_id();

    match state.recommendations.submit_feedback(&user_id, payload).await {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))),
        Err(e) if e.is_validation() => Err(e),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Failed to submit feedback");
            Err(AppError::Gateway("Failed to submit feedback"))
        }
    }
}

/// `GET /api/recommendations/filters`
pub async fn list_filters(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.recommendations.list_available_filters().await)
}

/// `GET /api/auth/signin`
pub async fn sign_in(State(state): State<AppState>) -> AppResult<Response> {
    let client_id = state.auth.client_id.as_deref().ok_or_else(|| {
        AppError::Config("Spotify client credentials are not configured".to_string())
    })?;

    let oauth_state = state.sessions.issue_state().await;
    let scope = OAUTH_SCOPES.join(" ");
    let url = reqwest::Url::parse_with_params(
        &state.auth.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", state.auth.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", oauth_state.as_str()),
        ],
    )
    .map_err(|e| AppError::Config(format!("Invalid authorize URL: {}", e)))?;

    Ok(found(url.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /api/auth/callback`
pub async fn auth_callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<CallbackParams>,
) -> AppResult<Response> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Authorization was declined");
        return Err(AppError::InvalidInput(format!("Authorization failed: {}", error)));
    }

    let oauth_state = params.state.unwrap_or_default();
    if !state.sessions.consume_state(&oauth_state).await {
        return Err(AppError::InvalidInput("Unknown OAuth state".to_string()));
    }

    let code = params
        .code
        .filter(|code| !code.trim().is_empty())
        .ok_or(AppError::MissingField("code"))?;

    let token = state
        .token_manager
        .exchange_code(&code, &state.auth.redirect_uri)
        .await
        .map_err(|e| match e {
            AppError::Config(_) => e,
            other => {
                tracing::error!(error = %other, "Authorization code exchange failed");
                AppError::Gateway("Failed to complete sign-in")
            }
        })?;

    let profile = state
        .provider
        .fetch_profile(&token.access_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load user profile");
            AppError::Gateway("Failed to complete sign-in")
        })?;

    let user = SessionUser::from(profile);
    let user_id = user.user_id();
    let id = state.sessions.create(Session { user, token }).await;
    tracing::info!(user_id = %user_id, "User signed in");

    let jar = jar.add(state.sessions.session_cookie(&id));
    Ok((jar, found(POST_SIGN_IN_PATH.to_string())).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    pub error: Option<String>,
}

/// `GET /api/auth/session`: refreshes the stored token when it is about to expire.
pub async fn get_session(State(state): State<AppState>, auth: AuthSession) -> Json<SessionResponse> {
    let AuthSession { id, session } = auth;

    let token = state.token_manager.acquire(session.token.clone()).await;
    if token != session.token {
        state.sessions.update_token(&id, token.clone()).await;
    }

    let expires = Some(token.expires_at)
        .filter(|expires_at| *expires_at > 0)
        .and_then(|expires_at| DateTime::<Utc>::from_timestamp(expires_at, 0))
        .map(|expires| expires.to_rfc3339());

    Json(SessionResponse {
        user: session.user,
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_type: token.token_type,
        expires,
        error: token.error,
    })
}

/// `GET|POST /api/auth/signout`
pub async fn sign_out(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    if let Some((id, session)) = state.sessions.resolve(&jar).await {
        state.sessions.remove(&id).await;
        tracing::info!(user_id = %session.user.user_id(), "User signed out");
    }

    let jar = jar.remove(SessionStore::removal_cookie());
    (jar, found("/".to_string())).into_response()
}
