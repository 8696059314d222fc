//! Session submission.
//!
//! A finished session becomes a [`SessionSubmission`] and is handed to a
//! [`SessionPersister`]. [`save_session`] ties that to the engine: the
//! engine is only reset once the submission has been accepted, so a failed
//! save can be retried with the same frozen totals.

mod http;

pub use http::HttpPersister;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, PersistError};
use crate::storage::EntryConfig;
use crate::timer::{IntervalSpec, SessionSummary, TimerEngine, TimerMode};

/// Entry type understood by the entry API for timed activities.
pub const ENTRY_TYPE: &str = "timed";

/// Body POSTed to the entry API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSubmission {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub duration_seconds: u64,
    /// When the session was started.
    pub timestamp: DateTime<Utc>,
    pub data: SessionData,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub mode: TimerMode,
    pub intervals: Vec<IntervalSpec>,
    pub warm_up_seconds: u64,
    /// 1 (low) to 5 (high).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}

impl SessionSubmission {
    pub fn from_summary(
        summary: &SessionSummary,
        entry: &EntryConfig,
        mood: Option<u8>,
        reflection: Option<String>,
    ) -> Self {
        Self {
            entry_type: ENTRY_TYPE.to_string(),
            name: entry.name.clone(),
            category: entry.category.clone(),
            subcategory: entry.subcategory.clone(),
            duration_seconds: summary.duration_secs,
            timestamp: summary.started_at.unwrap_or_else(Utc::now),
            data: SessionData {
                mode: summary.mode,
                intervals: summary.intervals.clone(),
                warm_up_seconds: summary.warm_up_secs,
                mood,
                reflection: reflection.filter(|r| !r.trim().is_empty()),
            },
            tags: entry.tags.clone(),
        }
    }
}

/// What the entry API told us about the stored session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: Option<String>,
}

impl SubmitReceipt {
    /// Pull an id out of `{"id": ..}` or `{"entry": {"id": ..}}`.
    /// Anything else, including an empty body, is still a success.
    pub fn from_body(body: &str) -> Self {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
            return Self::default();
        };
        let id = json
            .get("id")
            .or_else(|| json.get("entry").and_then(|e| e.get("id")))
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Self { id }
    }
}

/// Destination for finished sessions.
#[async_trait]
pub trait SessionPersister: Send + Sync {
    async fn submit(&self, submission: &SessionSubmission) -> Result<SubmitReceipt, PersistError>;
}

/// Options for [`save_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveRequest {
    pub include_overtime: bool,
    pub mood: Option<u8>,
    pub reflection: Option<String>,
}

/// Stop the session if needed, submit it, and reset the engine on success.
///
/// Mood and reflection are dropped when the matching capture toggle is off
/// in the engine's settings.
///
/// # Errors
///
/// Validation errors (session under a second) are returned before anything
/// is sent. Submission errors leave the engine stopped with its totals
/// intact.
pub async fn save_session(
    engine: &mut TimerEngine,
    persister: &dyn SessionPersister,
    entry: &EntryConfig,
    request: SaveRequest,
) -> Result<SubmitReceipt, CoreError> {
    let summary = engine.request_save(request.include_overtime)?;

    let settings = engine.settings();
    let mood = request.mood.filter(|_| settings.capture_mood);
    let reflection = request.reflection.filter(|_| settings.capture_reflection);
    let submission = SessionSubmission::from_summary(&summary, entry, mood, reflection);

    match persister.submit(&submission).await {
        Ok(receipt) => {
            info!(
                "Saved {}s {:?} session{}",
                submission.duration_seconds,
                submission.data.mode,
                receipt
                    .id
                    .as_deref()
                    .map(|id| format!(" as {id}"))
                    .unwrap_or_default()
            );
            engine.reset();
            Ok(receipt)
        }
        Err(e) => {
            warn!("Session not saved, keeping it for retry: {e}");
            Err(e.into())
        }
    }
}
