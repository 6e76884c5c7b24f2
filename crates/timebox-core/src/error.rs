//! Error types for the attempt engine.
//!
//! `ServiceError` describes collaborator (network) failures. It lives in
//! `timebox-core` so the retry policy can classify failures by variant
//! instead of by message text. `EngineError` covers everything the engine
//! itself rejects or gives up on.

use thiserror::Error;

use crate::model::SessionState;

/// Errors returned by an [`AssessmentService`](crate::traits::AssessmentService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The assessment or session does not exist (or has expired).
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to access the session.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server asked us to slow down.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The server returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request did not complete within its deadline.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The request never reached the server.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a body we could not decode.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Returns `true` if this error is permanent and must not be retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ServiceError::NotFound(_) | ServiceError::Unauthorized(_) => true,
            ServiceError::Api { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }

    /// Returns the server-provided retry delay in milliseconds, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Errors raised by the attempt engine.
///
/// Logic violations (answering after the attempt closed, unknown ids,
/// out-of-range navigation) are rejected synchronously with one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The requested action is not valid in the current session state.
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    /// Answers are frozen once submission has begun.
    #[error("answers cannot change while session is {state}")]
    NotAcceptingAnswers { state: SessionState },

    /// The question id is not part of the assessment.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// The option id does not belong to the question.
    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },

    /// A single-choice question received more than one option.
    #[error("question {question_id} accepts a single option, got {count}")]
    TooManyOptions { question_id: String, count: usize },

    /// Navigation outside `[0, count)`.
    #[error("question index {index} out of range (0..{count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// The session was closed (navigated away from).
    #[error("session has been closed")]
    SessionClosed,

    /// Loading the assessment definition failed. Terminal.
    #[error("failed to load assessment: {0}")]
    Load(ServiceError),

    /// The finish call failed after exhausting retries. Retryable.
    #[error("failed to finish assessment: {0}")]
    Finish(ServiceError),

    /// Fetching the review payload failed.
    #[error("failed to fetch review: {0}")]
    Review(ServiceError),

    /// A background task was aborted before producing a result.
    #[error("background task interrupted: {0}")]
    Interrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_not_retried() {
        assert!(ServiceError::NotFound("s1".into()).is_permanent());
        assert!(ServiceError::Unauthorized("expired".into()).is_permanent());
        assert!(ServiceError::Api {
            status: 422,
            message: "bad".into()
        }
        .is_permanent());
    }

    #[test]
    fn transient_errors_are_retried() {
        assert!(!ServiceError::Timeout(5000).is_permanent());
        assert!(!ServiceError::Network("reset".into()).is_permanent());
        assert!(!ServiceError::RateLimited { retry_after_ms: 10 }.is_permanent());
        for status in [408, 429, 500, 503] {
            assert!(
                !ServiceError::Api {
                    status,
                    message: String::new()
                }
                .is_permanent(),
                "HTTP {status} should be transient"
            );
        }
    }

    #[test]
    fn retry_after_hint() {
        assert_eq!(
            ServiceError::RateLimited {
                retry_after_ms: 2000
            }
            .retry_after_ms(),
            Some(2000)
        );
        assert_eq!(ServiceError::Timeout(1).retry_after_ms(), None);
    }

    #[test]
    fn engine_error_messages() {
        let err = EngineError::NotAcceptingAnswers {
            state: SessionState::Finished,
        };
        assert_eq!(err.to_string(), "answers cannot change while session is finished");
    }
}
