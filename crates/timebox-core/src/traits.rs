//! The collaborator trait the engine talks to.
//!
//! `timebox-client` implements it over HTTP and as an in-memory mock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{AnswerRecord, AssessmentDefinition, FinishCause, Question};

// ---------------------------------------------------------------------------
// Assessment service trait
// ---------------------------------------------------------------------------

/// Remote operations backing an attempt.
#[async_trait]
pub trait AssessmentService: Send + Sync {
    /// Load the assessment for a session. Fails with `NotFound` or
    /// `Unauthorized` when the session is missing or expired.
    async fn fetch_assessment(&self, session_id: &str)
        -> Result<AssessmentDefinition, ServiceError>;

    /// Persist one answer. Best-effort; callers retry and tolerate failure.
    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, ServiceError>;

    /// Close the attempt. Assumed idempotent server-side, but the engine
    /// still issues it at most once per successful submission.
    async fn finish_assessment(
        &self,
        request: &FinishRequest,
    ) -> Result<SubmissionAck, ServiceError>;

    /// Read-only review data, available after submission.
    async fn fetch_review(&self, session_id: &str) -> Result<ReviewPayload, ServiceError>;
}

/// Body of an autosave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAnswerRequest {
    pub session_id: String,
    pub question_id: String,
    /// Empty when the answer was cleared.
    pub option_ids: Vec<String>,
    pub marked_for_review: bool,
    pub elapsed_seconds: u64,
}

impl SaveAnswerRequest {
    /// Request carrying `record`'s current value.
    pub fn from_record(session_id: &str, record: &AnswerRecord) -> Self {
        Self {
            session_id: session_id.to_string(),
            question_id: record.question_id.clone(),
            option_ids: record.option_ids.clone(),
            marked_for_review: record.marked_for_review,
            elapsed_seconds: record.elapsed_seconds,
        }
    }

    /// Request telling the server the answer was removed.
    pub fn cleared(session_id: &str, question_id: &str, elapsed_seconds: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
            option_ids: Vec::new(),
            marked_for_review: false,
            elapsed_seconds,
        }
    }
}

/// Acknowledgement of a saved answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    pub saved_at: DateTime<Utc>,
}

/// Body of the finish call: the answer snapshot taken when submission began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRequest {
    pub session_id: String,
    pub cause: FinishCause,
    pub answers: Vec<AnswerRecord>,
}

/// Acknowledgement of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
}

/// Everything needed to build a review after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub questions: Vec<Question>,
    /// Correct option ids keyed by question id.
    pub correct_option_sets: BTreeMap<String, Vec<String>>,
    pub submitted_answers: Vec<AnswerRecord>,
    #[serde(default)]
    pub attempt_count: u32,
}
