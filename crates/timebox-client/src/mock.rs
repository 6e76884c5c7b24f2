//! In-memory assessment service for testing.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use timebox_core::error::ServiceError;
use timebox_core::model::{AnswerRecord, AssessmentDefinition};
use timebox_core::traits::{
    AssessmentService, FinishRequest, ReviewPayload, SaveAck, SaveAnswerRequest, SubmissionAck,
};

/// A scriptable assessment backend that keeps everything in memory.
///
/// Failures and delays are queued per operation and consumed one call at a
/// time, so a test can say "the next two saves fail, the third is slow".
/// Saves are applied to the server-side answer map on receipt, before any
/// scripted delay, the same way a real backend commits before replying.
pub struct MockAssessmentService {
    definition: AssessmentDefinition,
    correct_option_sets: BTreeMap<String, Vec<String>>,

    load_failures: Mutex<VecDeque<ServiceError>>,
    save_failures: Mutex<VecDeque<ServiceError>>,
    finish_failures: Mutex<VecDeque<ServiceError>>,
    save_delays: Mutex<VecDeque<Duration>>,
    finish_delay: Mutex<Duration>,

    load_calls: AtomicU32,
    save_calls: AtomicU32,
    finish_calls: AtomicU32,
    attempts: AtomicU32,

    save_requests: Mutex<Vec<SaveAnswerRequest>>,
    finish_requests: Mutex<Vec<FinishRequest>>,
    stored_answers: Mutex<BTreeMap<String, SaveAnswerRequest>>,
    submitted: Mutex<Option<Vec<AnswerRecord>>>,
}

impl MockAssessmentService {
    /// Serve `definition` with no correct answers configured.
    pub fn new(definition: AssessmentDefinition) -> Self {
        Self {
            definition,
            correct_option_sets: BTreeMap::new(),
            load_failures: Mutex::new(VecDeque::new()),
            save_failures: Mutex::new(VecDeque::new()),
            finish_failures: Mutex::new(VecDeque::new()),
            save_delays: Mutex::new(VecDeque::new()),
            finish_delay: Mutex::new(Duration::ZERO),
            load_calls: AtomicU32::new(0),
            save_calls: AtomicU32::new(0),
            finish_calls: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            save_requests: Mutex::new(Vec::new()),
            finish_requests: Mutex::new(Vec::new()),
            stored_answers: Mutex::new(BTreeMap::new()),
            submitted: Mutex::new(None),
        }
    }

    /// Set the correct option ids used by `fetch_review`.
    pub fn with_correct_answers(mut self, correct: BTreeMap<String, Vec<String>>) -> Self {
        self.correct_option_sets = correct;
        self
    }

    pub fn push_load_failure(&self, error: ServiceError) {
        lock(&self.load_failures).push_back(error);
    }

    pub fn push_save_failure(&self, error: ServiceError) {
        lock(&self.save_failures).push_back(error);
    }

    pub fn push_finish_failure(&self, error: ServiceError) {
        lock(&self.finish_failures).push_back(error);
    }

    /// Delay the reply to the next save call by `delay`.
    pub fn push_save_delay(&self, delay: Duration) {
        lock(&self.save_delays).push_back(delay);
    }

    /// Delay every finish reply by `delay`.
    pub fn set_finish_delay(&self, delay: Duration) {
        *lock(&self.finish_delay) = delay;
    }

    pub fn load_calls(&self) -> u32 {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn finish_calls(&self) -> u32 {
        self.finish_calls.load(Ordering::SeqCst)
    }

    /// Every save request received, in arrival order.
    pub fn save_requests(&self) -> Vec<SaveAnswerRequest> {
        lock(&self.save_requests).clone()
    }

    pub fn finish_requests(&self) -> Vec<FinishRequest> {
        lock(&self.finish_requests).clone()
    }

    /// The server-side value of a question: the last save received for it.
    pub fn stored_answer(&self, question_id: &str) -> Option<SaveAnswerRequest> {
        lock(&self.stored_answers).get(question_id).cloned()
    }

    /// Answers of the last successful finish.
    pub fn submitted_answers(&self) -> Option<Vec<AnswerRecord>> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl AssessmentService for MockAssessmentService {
    async fn fetch_assessment(
        &self,
        _session_id: &str,
    ) -> Result<AssessmentDefinition, ServiceError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.load_failures).pop_front() {
            return Err(error);
        }
        Ok(self.definition.clone())
    }

    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, ServiceError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.save_requests).push(request.clone());

        if let Some(error) = lock(&self.save_failures).pop_front() {
            return Err(error);
        }
        lock(&self.stored_answers).insert(request.question_id.clone(), request.clone());

        let delay = lock(&self.save_delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(SaveAck {
            saved_at: Utc::now(),
        })
    }

    async fn finish_assessment(
        &self,
        request: &FinishRequest,
    ) -> Result<SubmissionAck, ServiceError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.finish_requests).push(request.clone());

        let delay = *lock(&self.finish_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.finish_failures).pop_front() {
            return Err(error);
        }

        *lock(&self.submitted) = Some(request.answers.clone());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmissionAck {
            submitted_at: Utc::now(),
            attempt_number: Some(attempt),
        })
    }

    async fn fetch_review(&self, session_id: &str) -> Result<ReviewPayload, ServiceError> {
        let submitted_answers = lock(&self.submitted)
            .clone()
            .ok_or_else(|| ServiceError::NotFound(format!("no submission for {session_id}")))?;
        Ok(ReviewPayload {
            questions: self.definition.questions.clone(),
            correct_option_sets: self.correct_option_sets.clone(),
            submitted_answers,
            attempt_count: self.attempts.load(Ordering::SeqCst),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
