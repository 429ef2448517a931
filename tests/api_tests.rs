use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::IntoResponse,
    Router,
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use serde_json::{json, Value};
use tower::ServiceExt;

use tunescout_api::{
    api::{create_router, AppState, AuthSettings, SessionStore},
    config::ClientCredentials,
    error::{AppError, AppResult},
    models::{
        ApiArtist, ApiProfile, ApiTrack, BaseRecommendation, CachedRecommendation, FeedbackEvent,
        RawArtist, RecommendationResponse, Session, SessionToken, SessionUser,
        TokenEndpointReply, TokenEndpointResponse,
    },
    services::{
        engine::{EngineRecommendationRequest, RecommendationEngine},
        providers::{MetadataProvider, TokenEndpoint},
        TokenManager,
    },
};

const TRACK_A: &str = "4uLU6hMCjMI75M1A2tKUQC";
const TRACK_B: &str = "7qiZfU4dY1lWllzX7mPBI3";

#[derive(Default)]
struct FakeEngine {
    recommendations: Vec<BaseRecommendation>,
    history: Vec<String>,
    cached: Vec<CachedRecommendation>,
    engine_down: bool,
    recommend_calls: AtomicUsize,
    feedback: Mutex<Vec<FeedbackEvent>>,
}

#[async_trait::async_trait]
impl RecommendationEngine for FakeEngine {
    async fn recommend(
        &self,
        request: &EngineRecommendationRequest,
    ) -> AppResult<RecommendationResponse<BaseRecommendation>> {
        self.recommend_calls.fetch_add(1, Ordering::SeqCst);
        if self.engine_down {
            return Err(AppError::ExternalApi("connection refused".to_string()));
        }
        Ok(RecommendationResponse {
            user_id: request.user_id.clone(),
            recommendations: self.recommendations.clone(),
        })
    }

    async fn submit_feedback(&self, event: &FeedbackEvent) -> AppResult<()> {
        if self.engine_down {
            return Err(AppError::ExternalApi("connection refused".to_string()));
        }
        self.feedback.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_filters(&self) -> AppResult<Vec<String>> {
        if self.engine_down {
            return Err(AppError::ExternalApi("connection refused".to_string()));
        }
        Ok(vec!["recent".to_string(), "chill".to_string()])
    }

    async fn feedback_track_ids(&self, _user_id: &str) -> AppResult<Vec<String>> {
        Ok(self.history.clone())
    }

    async fn cached_recommendations(&self, _user_id: &str) -> AppResult<Vec<CachedRecommendation>> {
        Ok(self.cached.clone())
    }
}

struct FakeProvider;

#[async_trait::async_trait]
impl MetadataProvider for FakeProvider {
    async fn fetch_tracks(&self, ids: &[String], _access_token: &str) -> AppResult<Vec<ApiTrack>> {
        Ok(ids
            .iter()
            .map(|id| ApiTrack {
                id: Some(id.clone()),
                name: Some(format!("Song {}", &id[..4])),
                ..Default::default()
            })
            .collect())
    }

    async fn fetch_artists(&self, _ids: &[String], _access_token: &str) -> AppResult<Vec<ApiArtist>> {
        Ok(Vec::new())
    }

    async fn fetch_profile(&self, _access_token: &str) -> AppResult<ApiProfile> {
        Ok(ApiProfile {
            id: Some("ada".to_string()),
            display_name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            images: Vec::new(),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeTokenEndpoint;

fn granted() -> TokenEndpointReply {
    TokenEndpointReply {
        status: 200,
        body: Some(TokenEndpointResponse {
            access_token: Some("fresh-access".to_string()),
            refresh_token: Some("fresh-refresh".to_string()),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            ..Default::default()
        }),
        raw: String::new(),
    }
}

#[async_trait::async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn refresh(
        &self,
        _credentials: &ClientCredentials,
        _refresh_token: &str,
    ) -> AppResult<TokenEndpointReply> {
        Ok(granted())
    }

    async fn exchange_code(
        &self,
        _credentials: &ClientCredentials,
        _code: &str,
        _redirect_uri: &str,
    ) -> AppResult<TokenEndpointReply> {
        Ok(granted())
    }
}

fn create_state(engine: Arc<FakeEngine>) -> AppState {
    let credentials = ClientCredentials {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
    };
    AppState::new(
        engine,
        Arc::new(FakeProvider),
        TokenManager::new(Arc::new(FakeTokenEndpoint), Some(credentials)),
        SessionStore::new("integration-secret", false).unwrap(),
        AuthSettings {
            authorize_url: "https://accounts.example.com/authorize".to_string(),
            client_id: Some("client-id".to_string()),
            redirect_uri: "http://localhost:3000/api/auth/callback".to_string(),
        },
    )
}

fn create_app(engine: Arc<FakeEngine>) -> (Router, AppState) {
    let state = create_state(engine);
    (create_router(state.clone()), state)
}

async fn signed_in_cookie(state: &AppState, token: SessionToken) -> String {
    let id = state
        .sessions
        .create(Session {
            user: SessionUser {
                name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
                image: None,
            },
            token,
        })
        .await;
    let response = SignedCookieJar::<Key>::new(state.sessions.key())
        .add(state.sessions.session_cookie(&id))
        .into_response();
    cookie_pair(&response)
}

/// `name=value` part of a response's `Set-Cookie` header.
fn cookie_pair(response: &axum::response::Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn base(track_id: &str) -> BaseRecommendation {
    BaseRecommendation::new(track_id, 0.5)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let response = app.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_number());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let request = Request::builder()
        .uri("/api/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_recommendations_require_user_id() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let response = app
        .oneshot(post_json("/api/recommendations", json!({"accessToken": "token"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing userId");
}

#[tokio::test]
async fn test_mistyped_optional_fields_keep_user_id() {
    let engine = Arc::new(FakeEngine {
        recommendations: vec![base(TRACK_A)],
        ..Default::default()
    });
    let (app, _) = create_app(engine.clone());

    let response = app
        .oneshot(post_json(
            "/api/recommendations",
            json!({"userId": "u1", "limit": "5", "filters": "chill", "accessToken": "tok"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(engine.recommend_calls.load(Ordering::SeqCst), 1);
    let body = body_json(response).await;
    assert_eq!(body["recommendations"][0]["trackId"], TRACK_A);
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/recommendations")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommendations_without_token_are_empty() {
    let engine = Arc::new(FakeEngine {
        recommendations: vec![base(TRACK_A)],
        ..Default::default()
    });
    let (app, _) = create_app(engine.clone());

    let response = app
        .oneshot(post_json(
            "/api/recommendations",
            json!({"userId": "u1", "limit": 5, "filters": ["recent"], "accessToken": null}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"userId": "u1", "recommendations": []})
    );
    assert_eq!(engine.recommend_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recommendations_are_enriched_and_filtered() {
    let engine = Arc::new(FakeEngine {
        recommendations: vec![base(TRACK_A), base(TRACK_B)],
        history: vec![TRACK_B.to_string()],
        ..Default::default()
    });
    let (app, _) = create_app(engine);

    let response = app
        .oneshot(post_json(
            "/api/recommendations",
            json!({"userId": "u1", "accessToken": "token"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["trackId"], TRACK_A);
    assert_eq!(recommendations[0]["title"], "Song 4uLU");
    assert_ne!(recommendations[0]["title"], recommendations[0]["trackId"]);
}

#[tokio::test]
async fn test_exhausted_recommendations_fall_back_to_cached_pool() {
    let engine = Arc::new(FakeEngine {
        recommendations: vec![base(TRACK_A)],
        history: vec![TRACK_A.to_string()],
        cached: vec![CachedRecommendation {
            track_id: TRACK_B.to_string(),
            title: Some("Cached Song".to_string()),
            artists: vec![RawArtist::Name("Cached Artist".to_string())],
            album_image: None,
            score: 0.4,
            reason: None,
        }],
        ..Default::default()
    });
    let (app, _) = create_app(engine);

    let response = app
        .oneshot(post_json(
            "/api/recommendations",
            json!({"userId": "u1", "accessToken": "token"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["recommendations"][0]["trackId"], TRACK_B);
    assert_eq!(body["recommendations"][0]["title"], "Cached Song");
}

#[tokio::test]
async fn test_engine_outage_is_a_bad_gateway() {
    let engine = Arc::new(FakeEngine {
        engine_down: true,
        ..Default::default()
    });
    let (app, _) = create_app(engine);

    let response = app
        .oneshot(post_json(
            "/api/recommendations",
            json!({"userId": "u1", "accessToken": "token"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Failed to fetch recommendations"})
    );
}

#[tokio::test]
async fn test_filters_fail_open() {
    let (app, _) = create_app(Arc::new(FakeEngine {
        engine_down: true,
        ..Default::default()
    }));
    let response = app
        .oneshot(get("/api/recommendations/filters"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_filters_are_listed() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let response = app
        .oneshot(get("/api/recommendations/filters"))
        .await
        .unwrap();

    assert_eq!(body_json(response).await, json!(["recent", "chill"]));
}

#[tokio::test]
async fn test_feedback_requires_session() {
    let engine = Arc::new(FakeEngine::default());
    let (app, _) = create_app(engine.clone());

    let response = app
        .oneshot(post_json(
            "/api/recommendations/feedback",
            json!({"trackId": "t1", "action": "like"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
    assert!(engine.feedback.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_feedback_rejects_unknown_action() {
    let engine = Arc::new(FakeEngine::default());
    let (app, state) = create_app(engine.clone());
    let cookie = signed_in_cookie(&state, SessionToken::default()).await;

    let mut request = post_json(
        "/api/recommendations/feedback",
        json!({"trackId": "t1", "action": "save"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid action");
    assert!(engine.feedback.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_feedback_is_forwarded_with_session_user() {
    let engine = Arc::new(FakeEngine::default());
    let (app, state) = create_app(engine.clone());
    let cookie = signed_in_cookie(&state, SessionToken::default()).await;

    let mut request = post_json(
        "/api/recommendations/feedback",
        json!({"trackId": "t1", "action": "Dislike", "reason": "too slow", "score": 0.31, "rank": 4}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({"status": "accepted"}));

    let events = engine.feedback.lock().unwrap();
    assert_eq!(events.len(), 1);
    let event = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(
        event,
        json!({
            "userId": "ada@example.com",
            "trackId": "t1",
            "action": "dislike",
            "reason": "too slow",
            "score": 0.31,
            "rank": 4,
            "source": "dashboard"
        })
    );
}

#[tokio::test]
async fn test_feedback_upstream_failure_is_a_bad_gateway() {
    let engine = Arc::new(FakeEngine {
        engine_down: true,
        ..Default::default()
    });
    let (app, state) = create_app(engine);
    let cookie = signed_in_cookie(&state, SessionToken::default()).await;

    let mut request = post_json(
        "/api/recommendations/feedback",
        json!({"trackId": "t1", "action": "like"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "Failed to submit feedback");
}

#[tokio::test]
async fn test_sign_in_flow_creates_session() {
    let (app, state) = create_app(Arc::new(FakeEngine::default()));

    let response = app.clone().oneshot(get("/api/auth/signin")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let authorize = reqwest::Url::parse(location).unwrap();
    assert_eq!(authorize.path(), "/authorize");

    let params: std::collections::HashMap<String, String> =
        authorize.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "client-id");
    assert_eq!(params["response_type"], "code");
    assert!(params["scope"].contains("user-top-read"));

    let callback = format!("/api/auth/callback?code=abc&state={}", params["state"]);
    let response = app.clone().oneshot(get(&callback)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("tunescout.session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert_eq!(state.sessions.session_count().await, 1);
    assert_eq!(state.sessions.pending_state_count().await, 0);

    // the issued cookie authenticates later requests
    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, cookie_pair(&response))
        .body(Body::empty())
        .unwrap();
    let session = app.clone().oneshot(request).await.unwrap();
    assert_eq!(session.status(), StatusCode::OK);
    assert_eq!(body_json(session).await["user"]["email"], "ada@example.com");

    // the state value is single-use
    let response = app.oneshot(get(&callback)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsigned_session_cookie_is_unauthorized() {
    let (app, state) = create_app(Arc::new(FakeEngine::default()));
    let id = state
        .sessions
        .create(Session {
            user: SessionUser::default(),
            token: SessionToken::default(),
        })
        .await;

    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, format!("tunescout.session={}", id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_rejects_unknown_state() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let response = app
        .oneshot(get("/api/auth/callback?code=abc&state=forged"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_endpoint_refreshes_expiring_token() {
    let (app, state) = create_app(Arc::new(FakeEngine::default()));
    let cookie = signed_in_cookie(
        &state,
        SessionToken {
            access_token: "stale-access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: 1,
            ..Default::default()
        },
    )
    .await;

    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accessToken"], "fresh-access");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn test_session_without_expiry_omits_expires() {
    let (app, state) = create_app(Arc::new(FakeEngine::default()));
    let cookie = signed_in_cookie(
        &state,
        SessionToken {
            access_token: "access".to_string(),
            expires_at: 0,
            ..Default::default()
        },
    )
    .await;

    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accessToken"], "access");
    assert!(body.get("expires").is_none());
}

#[tokio::test]
async fn test_session_endpoint_without_cookie_is_unauthorized() {
    let (app, _) = create_app(Arc::new(FakeEngine::default()));
    let response = app.oneshot(get("/api/auth/session")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_out_forgets_session() {
    let (app, state) = create_app(Arc::new(FakeEngine::default()));
    let cookie = signed_in_cookie(&state, SessionToken::default()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/signout")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));
    assert_eq!(state.sessions.session_count().await, 0);
}
