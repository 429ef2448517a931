use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Session, SessionToken},
};

use super::AppState;

/// Name of the browser cookie carrying the signed session id
pub const SESSION_COOKIE: &str = "tunescout.session";

/// Sessions unused for this long are forgotten
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How long an issued OAuth `state` stays redeemable
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on outstanding OAuth `state` values; the oldest is dropped beyond it
pub const MAX_PENDING_STATES: usize = 1024;

struct StoredSession {
    session: Session,
    last_seen: Instant,
}

/// In-memory session registry
///
/// The cookie carries the session id signed through `SignedCookieJar`; the signing key is
/// derived from the configured secret. Idle sessions, sessions whose token was
/// invalidated, and stale OAuth states are evicted.
pub struct SessionStore {
    key: Key,
    secure_cookies: bool,
    idle_timeout: Duration,
    state_ttl: Duration,
    sessions: RwLock<HashMap<Uuid, StoredSession>>,
    pending_states: RwLock<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new(secret: &str, secure_cookies: bool) -> AppResult<Self> {
        if secret.trim().is_empty() {
            return Err(AppError::Config("Session secret must not be empty".to_string()));
        }

        Ok(Self {
            key: Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
            secure_cookies,
            idle_timeout: SESSION_IDLE_TIMEOUT,
            state_ttl: OAUTH_STATE_TTL,
            sessions: RwLock::new(HashMap::new()),
            pending_states: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_state_ttl(mut self, state_ttl: Duration) -> Self {
        self.state_ttl = state_ttl;
        self
    }

    /// Key signing the session cookie
    pub fn key(&self) -> Key {
        self.key.clone()
    }

    /// Cookie establishing session `id`; signed once added to a `SignedCookieJar`.
    pub fn session_cookie(&self, id: &Uuid) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .build()
    }

    /// Cookie to hand to `SignedCookieJar::remove` on sign-out.
    pub fn removal_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, "")).path("/").build()
    }

    pub async fn create(&self, session: Session) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, stored| stored.last_seen.elapsed() < self.idle_timeout);
        if sessions.len() < before {
            tracing::debug!(evicted = before - sessions.len(), "Evicted idle sessions");
        }

        sessions.insert(
            id,
            StoredSession {
                session,
                last_seen: Instant::now(),
            },
        );
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|stored| stored.session.clone())
    }

    /// Replaces the stored token. A token that demands a new sign-in ends the session.
    pub async fn update_token(&self, id: &Uuid, token: SessionToken) {
        let mut sessions = self.sessions.write().await;

        if token.requires_sign_in() {
            if sessions.remove(id).is_some() {
                tracing::info!(session_id = %id, "Session dropped after token invalidation");
            }
            return;
        }

        if let Some(stored) = sessions.get_mut(id) {
            stored.session.token = token;
        }
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Session> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|stored| stored.session)
    }

    /// Session named by the jar's verified cookie; idle sessions are evicted instead.
    pub async fn resolve(&self, jar: &SignedCookieJar) -> Option<(Uuid, Session)> {
        let cookie = jar.get(SESSION_COOKIE)?;
        let id = Uuid::parse_str(cookie.value()).ok()?;

        let mut sessions = self.sessions.write().await;
        let stored = sessions.get_mut(&id)?;

        if stored.last_seen.elapsed() >= self.idle_timeout {
            sessions.remove(&id);
            tracing::debug!(session_id = %id, "Session expired after inactivity");
            return None;
        }

        stored.last_seen = Instant::now();
        Some((id, stored.session.clone()))
    }

    /// Issues a single-use OAuth `state` value.
    pub async fn issue_state(&self) -> String {
        let state = Uuid::new_v4().simple().to_string();
        let mut pending = self.pending_states.write().await;

        pending.retain(|_, issued| issued.elapsed() < self.state_ttl);
        if pending.len() >= MAX_PENDING_STATES {
            let oldest = pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(state, _)| state.clone());
            if let Some(oldest) = oldest {
                pending.remove(&oldest);
            }
        }

        pending.insert(state.clone(), Instant::now());
        state
    }

    /// Consumes an OAuth `state` value; false when it was never issued, already used or expired.
    pub async fn consume_state(&self, state: &str) -> bool {
        self.pending_states
            .write()
            .await
            .remove(state)
            .is_some_and(|issued| issued.elapsed() < self.state_ttl)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn pending_state_count(&self) -> usize {
        self.pending_states.read().await.len()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.key()
    }
}

/// Signed-in session resolved from the request cookie; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: Uuid,
    pub session: Session,
}

impl AuthSession {
    pub fn user_id(&self) -> String {
        self.session.user.user_id()
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, state.sessions.key());
        let (id, session) = state
            .sessions
            .resolve(&jar)
            .await
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthSession { id, session })
    }
}
