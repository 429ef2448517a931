//! Recommendation client state machine
//!
//! Tracks `idle -> loading -> ready | error` for one user's recommendation list and
//! applies feedback optimistically. Only the most recently issued refresh may change
//! the state; results of superseded requests are discarded when they arrive.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::models::{EnrichedRecommendation, FeedbackAction, DEFAULT_FEEDBACK_SOURCE};

pub mod transport;

pub use transport::{FeedbackRequest, HttpRecommendationsApi, RecommendationsApi, RecommendationsRequest};

/// Shown when a refresh is attempted without a user id
pub const MISSING_USER_MESSAGE: &str = "We need a Spotify user identifier to load recommendations.";

/// Default number of recommendations a client asks for
pub const DEFAULT_CLIENT_LIMIT: u32 = 30;

/// Default delay before the post-feedback refetch
pub const DEFAULT_REFETCH_DELAY: Duration = Duration::from_millis(250);

/// Highest score an optimistic update may reach
const MAX_OPTIMISTIC_SCORE: f64 = 0.99;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Missing user identifier for feedback.")]
    MissingUserId,

    #[error("{0}")]
    Api(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationState {
    Idle,
    Loading,
    Error {
        message: String,
    },
    Ready {
        recommendations: Vec<EnrichedRecommendation>,
        last_updated: DateTime<Utc>,
        last_error: Option<String>,
    },
}

impl RecommendationState {
    pub fn recommendations(&self) -> Option<&[EnrichedRecommendation]> {
        match self {
            RecommendationState::Ready {
                recommendations, ..
            } => Some(recommendations.as_slice()),
            _ => None,
        }
    }
}

/// Per-track feedback progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackStatus {
    pub is_pending: bool,
    pub last_action: Option<FeedbackAction>,
    pub error: Option<String>,
}

/// Called after the engine accepted a rating
pub type FeedbackSuccessHook = Arc<dyn Fn(&EnrichedRecommendation, FeedbackAction) + Send + Sync>;

/// Called after a rating failed and the list was rolled back
pub type FeedbackErrorHook =
    Arc<dyn Fn(&EnrichedRecommendation, FeedbackAction, &ClientError) + Send + Sync>;

#[derive(Clone)]
pub struct ClientOptions {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub limit: u32,
    pub filters: Vec<String>,
    pub auto_load: bool,
    pub refetch_after_feedback: bool,
    pub refetch_delay: Duration,
    pub on_feedback_success: Option<FeedbackSuccessHook>,
    pub on_feedback_error: Option<FeedbackErrorHook>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("user_id", &self.user_id)
            .field("limit", &self.limit)
            .field("filters", &self.filters)
            .field("auto_load", &self.auto_load)
            .field("refetch_after_feedback", &self.refetch_after_feedback)
            .field("refetch_delay", &self.refetch_delay)
            .field("on_feedback_success", &self.on_feedback_success.is_some())
            .field("on_feedback_error", &self.on_feedback_error.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            access_token: None,
            limit: DEFAULT_CLIENT_LIMIT,
            filters: Vec::new(),
            auto_load: false,
            refetch_after_feedback: false,
            refetch_delay: DEFAULT_REFETCH_DELAY,
            on_feedback_success: None,
            on_feedback_error: None,
        }
    }
}

impl ClientOptions {
    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Score after an optimistic like/dislike, rounded to 4 places and clamped.
fn adjusted_score(score: f64, action: FeedbackAction) -> f64 {
    let adjusted = ((score + action.score_delta()) * 10_000.0).round() / 10_000.0;
    adjusted.clamp(0.0, MAX_OPTIMISTIC_SCORE)
}

struct ClientInner {
    api: Arc<dyn RecommendationsApi>,
    options: ClientOptions,
    filters: Mutex<Vec<String>>,
    state: Mutex<RecommendationState>,
    feedback: Mutex<HashMap<String, FeedbackStatus>>,
    generation: AtomicU64,
    fetching: AtomicBool,
    refetch_timer: Mutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
    fn cancel_refetch(&self) {
        if let Some(timer) = lock(&self.refetch_timer).take() {
            timer.abort();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel_refetch();
    }
}

/// Recommendation list of one user, shared by cloning.
#[derive(Clone)]
pub struct RecommendationClient {
    inner: Arc<ClientInner>,
}

impl RecommendationClient {
    pub fn new(api: Arc<dyn RecommendationsApi>, options: ClientOptions) -> Self {
        let loads_on_mount = options.auto_load && options.user_id().is_some();
        let initial = if loads_on_mount {
            RecommendationState::Loading
        } else {
            RecommendationState::Idle
        };

        Self {
            inner: Arc::new(ClientInner {
                api,
                filters: Mutex::new(options.filters.clone()),
                options,
                state: Mutex::new(initial),
                feedback: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                fetching: AtomicBool::new(loads_on_mount),
                refetch_timer: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> RecommendationState {
        lock(&self.inner.state).clone()
    }

    /// True while the most recent refresh is outstanding.
    pub fn is_fetching(&self) -> bool {
        self.inner.fetching.load(Ordering::SeqCst)
    }

    pub fn feedback_status(&self, track_id: &str) -> Option<FeedbackStatus> {
        lock(&self.inner.feedback).get(track_id).cloned()
    }

    pub fn feedback_state(&self) -> HashMap<String, FeedbackStatus> {
        lock(&self.inner.feedback).clone()
    }

    /// Replaces the filters used by subsequent refreshes.
    pub fn set_filters(&self, filters: Vec<String>) {
        *lock(&self.inner.filters) = filters;
    }

    pub fn refetch_pending(&self) -> bool {
        lock(&self.inner.refetch_timer)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Runs the initial load when `auto_load` is set and a user is known.
    pub async fn mount(&self) {
        if self.inner.options.auto_load && self.inner.options.user_id().is_some() {
            self.refresh().await;
        }
    }

    /// Cancels a scheduled refetch. In-flight requests are left to the staleness check.
    pub fn unmount(&self) {
        self.inner.cancel_refetch();
    }

    pub async fn refresh(&self) {
        let inner = &self.inner;

        let Some(user_id) = inner.options.user_id().map(str::to_string) else {
            *lock(&inner.state) = RecommendationState::Error {
                message: MISSING_USER_MESSAGE.to_string(),
            };
            return;
        };

        let generation = {
            let mut state = lock(&inner.state);
            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.fetching.store(true, Ordering::SeqCst);
            *state = RecommendationState::Loading;
            generation
        };

        let request = RecommendationsRequest {
            user_id,
            limit: inner.options.limit,
            filters: lock(&inner.filters).clone(),
            access_token: inner.options.access_token.clone(),
        };
        let result = inner.api.fetch_recommendations(&request).await;

        let mut state = lock(&inner.state);
        if inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Discarding superseded recommendation response");
            return;
        }

        match result {
            Ok(response) => {
                lock(&inner.feedback).clear();
                *state = RecommendationState::Ready {
                    recommendations: response.recommendations,
                    last_updated: Utc::now(),
                    last_error: None,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load recommendations");
                *state = RecommendationState::Error {
                    message: e.to_string(),
                };
            }
        }
        inner.fetching.store(false, Ordering::SeqCst);
    }

    /// Rates `item`, updating its score optimistically.
    ///
    /// On failure the list is restored to what it was before the update and the
    /// track's status carries the error. A second rating of a track whose previous
    /// rating is still pending is dropped.
    pub async fn send_feedback(
        &self,
        item: &EnrichedRecommendation,
        action: FeedbackAction,
        rank: Option<i64>,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;
        let user_id = inner
            .options
            .user_id()
            .ok_or(ClientError::MissingUserId)?
            .to_string();
        let track_id = item.track_id.clone();

        {
            let mut feedback = lock(&inner.feedback);
            if feedback.get(&track_id).is_some_and(|status| status.is_pending) {
                tracing::debug!(track_id = %track_id, "Feedback already pending, dropping");
                return Ok(());
            }
            feedback.insert(
                track_id.clone(),
                FeedbackStatus {
                    is_pending: true,
                    last_action: Some(action),
                    error: None,
                },
            );
        }

        let (snapshot, rank) = {
            let mut state = lock(&inner.state);
            let snapshot = state.clone();
            let resolved = match &mut *state {
                RecommendationState::Ready {
                    recommendations,
                    last_error,
                    ..
                } => {
                    let position = recommendations
                        .iter()
                        .position(|rec| rec.track_id == track_id)
                        .map(|index| index as i64);
                    for rec in recommendations.iter_mut().filter(|rec| rec.track_id == track_id) {
                        rec.score = adjusted_score(rec.score, action);
                    }
                    *last_error = None;
                    (Some(snapshot), rank.or(position))
                }
                _ => (None, rank),
            };
            resolved
        };

        let request = FeedbackRequest {
            user_id,
            track_id: track_id.clone(),
            action,
            rank,
            source: DEFAULT_FEEDBACK_SOURCE.to_string(),
            access_token: inner.options.access_token.clone(),
        };

        match inner.api.send_feedback(&request).await {
            Ok(()) => {
                lock(&inner.feedback).insert(
                    track_id,
                    FeedbackStatus {
                        is_pending: false,
                        last_action: Some(action),
                        error: None,
                    },
                );
                if let Some(hook) = &inner.options.on_feedback_success {
                    hook(item, action);
                }
                if inner.options.refetch_after_feedback {
                    self.schedule_refetch();
                }
                Ok(())
            }
            Err(e) => {
                if let Some(snapshot) = snapshot {
                    *lock(&inner.state) = snapshot;
                }
                lock(&inner.feedback).insert(
                    track_id.clone(),
                    FeedbackStatus {
                        is_pending: false,
                        last_action: None,
                        error: Some(e.to_string()),
                    },
                );
                tracing::warn!(track_id = %track_id, error = %e, "Feedback submission failed");
                if let Some(hook) = &inner.options.on_feedback_error {
                    hook(item, action, &e);
                }
                Err(e)
            }
        }
    }

    /// Schedules one delayed refresh, replacing any refresh already scheduled.
    fn schedule_refetch(&self) {
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.options.refetch_delay;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                RecommendationClient { inner }.refresh().await;
            }
        });

        if let Some(previous) = lock(&self.inner.refetch_timer).replace(timer) {
            previous.abort();
        }
    }
}
