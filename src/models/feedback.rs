use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Source recorded when the caller does not name one
pub const DEFAULT_FEEDBACK_SOURCE: &str = "dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Like,
    Dislike,
}

impl FeedbackAction {
    /// Case-insensitive parse of `like` / `dislike`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "like" => Some(FeedbackAction::Like),
            "dislike" => Some(FeedbackAction::Dislike),
            _ => None,
        }
    }

    /// Optimistic score delta applied on the client.
    pub fn score_delta(self) -> f64 {
        match self {
            FeedbackAction::Like => 0.05,
            FeedbackAction::Dislike => -0.05,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackAction::Like => "like",
            FeedbackAction::Dislike => "dislike",
        }
    }
}

impl Display for FeedbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feedback forwarded to the engine. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    pub user_id: String,
    pub track_id: String,
    pub action: FeedbackAction,
    pub reason: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    pub source: String,
}

/// Integer value of a JSON number, accepting floats without a fractional part.
fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() <= i64::MAX as f64)
            .map(|n| n as i64)
    })
}

/// Loosely-typed feedback body as posted by the browser.
///
/// Fields are kept as raw JSON so that wrong types degrade the same way
/// missing fields do.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPayload {
    #[serde(default)]
    pub track_id: Option<Value>,
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub reason: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub rank: Option<Value>,
    #[serde(default)]
    pub source: Option<Value>,
}

impl FeedbackPayload {
    /// Validates the payload and resolves it into an event for `user_id`.
    pub fn into_event(self, user_id: &str) -> AppResult<FeedbackEvent> {
        let track_id = match self.track_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            _ => return Err(AppError::MissingField("trackId")),
        };

        let action = match self.action {
            Some(Value::String(raw)) => {
                FeedbackAction::parse(&raw).ok_or(AppError::InvalidAction(raw))?
            }
            other => {
                return Err(AppError::InvalidAction(
                    other.map(|v| v.to_string()).unwrap_or_default(),
                ))
            }
        };

        let source = match self.source {
            Some(Value::String(source)) if !source.trim().is_empty() => source,
            _ => DEFAULT_FEEDBACK_SOURCE.to_string(),
        };

        Ok(FeedbackEvent {
            user_id: user_id.to_string(),
            track_id,
            action,
            reason: match self.reason {
                Some(Value::String(reason)) => Some(reason),
                _ => None,
            },
            score: self.score.as_ref().and_then(Value::as_f64),
            rank: self.rank.as_ref().and_then(whole_number),
            source,
        })
    }
}
