//! Core data model types for timebox.
//!
//! These types describe an assessment as the client sees it, the learner's
//! answers, the session lifecycle and the one-per-session submission record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many options a learner may select for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
}

/// A selectable option.
///
/// Correctness is deliberately absent: correct option sets only arrive with
/// the review payload, after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub statement: String,
}

/// A single question of an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<AnswerOption>,
    /// Points awarded when answered correctly.
    #[serde(default = "default_marks")]
    pub marks: u32,
}

fn default_marks() -> u32 {
    1
}

impl Question {
    /// Whether `option_id` is one of this question's options.
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Immutable exam blueprint, fetched once when the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentDefinition {
    pub id: String,
    pub title: String,
    /// Time allowed, in seconds.
    pub duration_secs: u64,
    pub questions: Vec<Question>,
}

impl AssessmentDefinition {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn index_of(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == question_id)
    }

    /// Sum of marks over all questions.
    pub fn max_marks(&self) -> u64 {
        self.questions.iter().map(|q| q.marks as u64).sum()
    }
}

/// The learner's current response to one question.
///
/// Superseded on every edit, never appended. A record with no options is
/// only kept while the question is marked for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    /// Selected option ids, sorted and deduplicated.
    #[serde(default)]
    pub option_ids: Vec<String>,
    #[serde(default)]
    pub marked_for_review: bool,
    /// Seconds into the attempt when this record was last edited.
    #[serde(default)]
    pub elapsed_seconds: u64,
}

impl AnswerRecord {
    /// Whether the learner has actually selected something.
    pub fn is_answered(&self) -> bool {
        !self.option_ids.is_empty()
    }
}

/// Lifecycle of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Loading,
    InProgress,
    Submitting,
    Finished,
    Errored,
}

impl SessionState {
    /// Answers may only change while the attempt is running.
    pub fn accepts_answers(self) -> bool {
        self == SessionState::InProgress
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::NotStarted => "not_started",
            SessionState::Loading => "loading",
            SessionState::InProgress => "in_progress",
            SessionState::Submitting => "submitting",
            SessionState::Finished => "finished",
            SessionState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// What triggered the finish transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishCause {
    Manual,
    Timeout,
}

impl fmt::Display for FinishCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishCause::Manual => f.write_str("manual"),
            FinishCause::Timeout => f.write_str("timeout"),
        }
    }
}

/// The single, immutable record of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub session_id: String,
    pub submitted_at: DateTime<Utc>,
    pub cause: FinishCause,
    /// Final answers, in question order.
    pub answers: Vec<AnswerRecord>,
    /// Attempt number reported by the server, when it sends one.
    #[serde(default)]
    pub attempt_number: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_definition_json() {
        let json = r#"{
            "id": "a1",
            "title": "Rust basics",
            "duration_secs": 600,
            "questions": [
                {"id": "q1", "prompt": "Pick one", "type": "single_choice",
                 "options": [{"id": "a", "statement": "A"}, {"id": "b", "statement": "B"}]},
                {"id": "q2", "prompt": "Pick many", "type": "multi_choice", "marks": 3,
                 "options": [{"id": "x", "statement": "X"}]}
            ]
        }"#;
        let def: AssessmentDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.question_count(), 2);
        assert_eq!(def.questions[0].marks, 1);
        assert_eq!(def.max_marks(), 4);
        assert_eq!(def.index_of("q2"), Some(1));
        assert!(def.question("q1").unwrap().has_option("b"));
        assert!(!def.question("q1").unwrap().has_option("x"));
    }

    #[test]
    fn session_state_display_matches_serde() {
        let json = serde_json::to_string(&SessionState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(SessionState::InProgress.to_string(), "in_progress");
        assert!(SessionState::InProgress.accepts_answers());
        assert!(!SessionState::Errored.accepts_answers());
    }

    #[test]
    fn finish_cause_serde() {
        let cause: FinishCause = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(cause, FinishCause::Timeout);
        assert_eq!(FinishCause::Manual.to_string(), "manual");
    }
}
