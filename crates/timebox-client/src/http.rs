//! HTTP assessment service.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::instrument;

use timebox_core::error::ServiceError;
use timebox_core::model::AssessmentDefinition;
use timebox_core::traits::{
    AssessmentService, FinishRequest, ReviewPayload, SaveAck, SaveAnswerRequest, SubmissionAck,
};

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// REST client for the assessment backend.
pub struct HttpAssessmentService {
    base_url: String,
    api_token: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpAssessmentService {
    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            timeout,
            client,
        })
    }

    fn session_url(&self, session_id: &str, resource: &str) -> String {
        format!("{}/api/sessions/{session_id}/{resource}", self.base_url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<T, ServiceError> {
        let mut request = request.header("accept", "application/json");
        if !self.api_token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_token));
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                * 1000;
            return Err(ServiceError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                404 => ServiceError::NotFound(if body.is_empty() {
                    subject.to_string()
                } else {
                    body
                }),
                401 | 403 => ServiceError::Unauthorized(body),
                _ => ServiceError::Api {
                    status,
                    message: body,
                },
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.timeout_ms())
            } else {
                ServiceError::InvalidResponse(format!("failed to parse response: {e}"))
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout_ms())
        } else {
            ServiceError::Network(e.to_string())
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

#[async_trait]
impl AssessmentService for HttpAssessmentService {
    #[instrument(skip(self))]
    async fn fetch_assessment(
        &self,
        session_id: &str,
    ) -> Result<AssessmentDefinition, ServiceError> {
        let request = self.client.get(self.session_url(session_id, "assessment"));
        self.execute(request, &format!("session {session_id}")).await
    }

    #[instrument(
        skip(self, request),
        fields(session_id = %request.session_id, question_id = %request.question_id)
    )]
    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, ServiceError> {
        let http = self
            .client
            .post(self.session_url(&request.session_id, "answers"))
            .json(request);
        self.execute(http, &format!("session {}", request.session_id))
            .await
    }

    #[instrument(
        skip(self, request),
        fields(session_id = %request.session_id, cause = %request.cause)
    )]
    async fn finish_assessment(
        &self,
        request: &FinishRequest,
    ) -> Result<SubmissionAck, ServiceError> {
        let http = self
            .client
            .post(self.session_url(&request.session_id, "finish"))
            .json(request);
        self.execute(http, &format!("session {}", request.session_id))
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_review(&self, session_id: &str) -> Result<ReviewPayload, ServiceError> {
        let request = self.client.get(self.session_url(session_id, "review"));
        self.execute(request, &format!("review for session {session_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebox_core::model::{AnswerRecord, FinishCause};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpAssessmentService {
        HttpAssessmentService::new(&server.uri(), "test-token", Duration::from_secs(5)).unwrap()
    }

    fn definition_json() -> serde_json::Value {
        serde_json::json!({
            "id": "rust-basics",
            "title": "Rust basics",
            "duration_secs": 600,
            "questions": [
                {
                    "id": "q1",
                    "prompt": "Which keyword declares an immutable binding?",
                    "type": "single_choice",
                    "options": [
                        {"id": "a", "statement": "let"},
                        {"id": "b", "statement": "var"}
                    ]
                },
                {
                    "id": "q2",
                    "prompt": "Which traits are auto traits?",
                    "type": "multi_choice",
                    "options": [
                        {"id": "a", "statement": "Send"},
                        {"id": "b", "statement": "Clone"},
                        {"id": "c", "statement": "Sync"}
                    ],
                    "marks": 2
                }
            ]
        })
    }

    #[tokio::test]
    async fn fetch_assessment_sends_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/assessment"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(definition_json()))
            .expect(1)
            .mount(&server)
            .await;

        let definition = service(&server).fetch_assessment("s-1").await.unwrap();
        assert_eq!(definition.question_count(), 2);
        assert_eq!(definition.duration_secs, 600);
        assert_eq!(definition.questions[0].marks, 1);
        assert_eq!(definition.questions[1].marks, 2);
    }

    #[tokio::test]
    async fn save_answer_posts_body() {
        let server = MockServer::start().await;
        let request = SaveAnswerRequest {
            session_id: "s-1".into(),
            question_id: "q2".into(),
            option_ids: vec!["a".into(), "c".into()],
            marked_for_review: true,
            elapsed_seconds: 42,
        };

        Mock::given(method("POST"))
            .and(path("/api/sessions/s-1/answers"))
            .and(body_json(&request))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"saved_at": "2026-01-05T10:00:00Z"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ack = service(&server).save_answer(&request).await.unwrap();
        assert_eq!(ack.saved_at.to_rfc3339(), "2026-01-05T10:00:00+00:00");
    }

    #[tokio::test]
    async fn finish_returns_attempt_number() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sessions/s-1/finish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "submitted_at": "2026-01-05T10:10:00Z",
                "attempt_number": 2
            })))
            .mount(&server)
            .await;

        let request = FinishRequest {
            session_id: "s-1".into(),
            cause: FinishCause::Timeout,
            answers: vec![AnswerRecord {
                question_id: "q1".into(),
                option_ids: vec!["a".into()],
                marked_for_review: false,
                elapsed_seconds: 12,
            }],
        };
        let ack = service(&server).finish_assessment(&request).await.unwrap();
        assert_eq!(ack.attempt_number, Some(2));

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["cause"], "timeout");
        assert_eq!(body["answers"][0]["option_ids"][0], "a");
    }

    #[tokio::test]
    async fn fetch_review_parses_payload() {
        let server = MockServer::start().await;
        let mut payload = serde_json::json!({
            "correct_option_sets": {"q1": ["a"], "q2": ["a", "c"]},
            "submitted_answers": [
                {"question_id": "q1", "option_ids": ["a"], "marked_for_review": false, "elapsed_seconds": 3}
            ],
            "attempt_count": 1
        });
        payload["questions"] = definition_json()["questions"].clone();

        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/review"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let review = service(&server).fetch_review("s-1").await.unwrap();
        assert_eq!(review.questions.len(), 2);
        assert_eq!(review.correct_option_sets["q2"], vec!["a", "c"]);
        assert_eq!(review.attempt_count, 1);
    }

    #[tokio::test]
    async fn not_found_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sessions/gone/assessment"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = service(&server).fetch_assessment("gone").await.unwrap_err();
        assert_eq!(err, ServiceError::NotFound("session gone".into()));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn auth_failures_map_to_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/assessment"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sessions/s-2/assessment"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not your session"))
            .mount(&server)
            .await;

        let svc = service(&server);
        assert_eq!(
            svc.fetch_assessment("s-1").await.unwrap_err(),
            ServiceError::Unauthorized("token expired".into())
        );
        assert_eq!(
            svc.fetch_assessment("s-2").await.unwrap_err(),
            ServiceError::Unauthorized("not your session".into())
        );
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sessions/s-1/answers"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let request = SaveAnswerRequest::cleared("s-1", "q1", 0);
        let err = service(&server).save_answer(&request).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::RateLimited {
                retry_after_ms: 2000
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sessions/s-1/finish"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let request = FinishRequest {
            session_id: "s-1".into(),
            cause: FinishCause::Manual,
            answers: vec![],
        };
        let err = service(&server).finish_assessment(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Api { status: 503, .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/assessment"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = service(&server).fetch_assessment("s-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/assessment"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(definition_json())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let svc =
            HttpAssessmentService::new(&server.uri(), "t", Duration::from_millis(100)).unwrap();
        let err = svc.fetch_assessment("s-1").await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(100));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let svc =
            HttpAssessmentService::new("http://127.0.0.1:1", "t", Duration::from_secs(1)).unwrap();
        let err = svc.fetch_assessment("s-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Network(_)), "{err:?}");
    }
}
