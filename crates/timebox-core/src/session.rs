//! Attempt session: state machine and submission coordinator.
//!
//! ```text
//! NotStarted -> Loading -> InProgress -> Submitting -> Finished
//!                  |                        |   ^
//!                  v                        v   |
//!               Errored (terminal)       Errored (retry)
//! ```
//!
//! `finish` is the single entry point for both the countdown and the
//! learner. The first caller moves the session to `Submitting`, tears the
//! countdown down and spawns the finish call; every caller arriving while
//! that call is in flight (or after it resolved) gets the same shared
//! result. No second finish call is issued unless the first one ended in
//! `Errored`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use uuid::Uuid;

use crate::answers::{AnswerChange, AnswerStore};
use crate::autosave::AutosaveDispatcher;
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{
    AnswerRecord, AssessmentDefinition, FinishCause, Question, SessionState, SubmissionRecord,
};
use crate::navigation::{self, Navigator, QuestionStatus, StatusCounts};
use crate::review::ReviewResult;
use crate::timer::{spawn_countdown, Countdown, TimerHandle};
use crate::traits::{AssessmentService, FinishRequest, SaveAnswerRequest};

type FinishFuture = Shared<BoxFuture<'static, Result<SubmissionRecord, EngineError>>>;

/// Which phase put the session into `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// Loading the definition. Terminal.
    Load,
    /// The finish call. The learner may retry.
    Finish,
}

/// Why the session is `Errored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub phase: FailurePhase,
    pub error: EngineError,
}

impl SessionFailure {
    pub fn is_retryable(&self) -> bool {
        self.phase == FailurePhase::Finish
    }
}

struct Attempt {
    definition: Arc<AssessmentDefinition>,
    answers: AnswerStore,
    navigator: Navigator,
    countdown: Countdown,
}

struct Inner {
    state: SessionState,
    /// Bumped on every transition; stale async callbacks compare against it.
    generation: u64,
    closed: bool,
    attempt: Option<Attempt>,
    timer: Option<TimerHandle>,
    finish: Option<FinishFuture>,
    /// Cause of the first finish request; retries keep it.
    cause: Option<FinishCause>,
    submission: Option<SubmissionRecord>,
    failure: Option<SessionFailure>,
}

/// One learner's attempt at one assessment.
pub struct AttemptSession {
    session_id: String,
    service: Arc<dyn AssessmentService>,
    config: EngineConfig,
    clock: SharedClock,
    autosave: AutosaveDispatcher,
    inner: Mutex<Inner>,
}

impl AttemptSession {
    pub fn new(
        session_id: impl Into<String>,
        service: Arc<dyn AssessmentService>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Self::with_clock(session_id, service, config, SharedClock::default())
    }

    pub fn with_clock(
        session_id: impl Into<String>,
        service: Arc<dyn AssessmentService>,
        config: EngineConfig,
        clock: SharedClock,
    ) -> Arc<Self> {
        let autosave = AutosaveDispatcher::new(
            Arc::clone(&service),
            config.autosave_retry,
            config.autosave_window,
        );
        Arc::new(Self {
            session_id: session_id.into(),
            service,
            config,
            clock,
            autosave,
            inner: Mutex::new(Inner {
                state: SessionState::NotStarted,
                generation: 0,
                closed: false,
                attempt: None,
                timer: None,
                finish: None,
                cause: None,
                submission: None,
                failure: None,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Fetch the definition and arm the countdown.
    ///
    /// `NotFound`/`Unauthorized` fail immediately; transient failures are
    /// retried per `load_retry`. Any failure, or a `close` while the load is
    /// in flight, leaves the session terminally `Errored`.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(EngineError::SessionClosed);
            }
            if inner.state != SessionState::NotStarted {
                return Err(EngineError::InvalidTransition {
                    from: inner.state,
                    action: "start",
                });
            }
            self.transition(&mut inner, SessionState::Loading);
        }

        let fetched = self
            .config
            .load_retry
            .run("fetch_assessment", || {
                self.service.fetch_assessment(&self.session_id)
            })
            .await;

        let mut inner = self.lock();
        let definition = match fetched {
            Ok(definition) => Arc::new(definition),
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "assessment load failed: {e}");
                let error = EngineError::Load(e);
                inner.failure = Some(SessionFailure {
                    phase: FailurePhase::Load,
                    error: error.clone(),
                });
                self.transition(&mut inner, SessionState::Errored);
                return Err(error);
            }
        };
        if inner.closed {
            tracing::debug!(session_id = %self.session_id, "closed while loading");
            inner.failure = Some(SessionFailure {
                phase: FailurePhase::Load,
                error: EngineError::SessionClosed,
            });
            self.transition(&mut inner, SessionState::Errored);
            return Err(EngineError::SessionClosed);
        }

        let countdown = Countdown::new(
            self.clock.now(),
            Duration::from_secs(definition.duration_secs),
        );
        inner.attempt = Some(Attempt {
            navigator: Navigator::new(definition.question_count()),
            answers: AnswerStore::new(),
            countdown,
            definition,
        });
        self.transition(&mut inner, SessionState::InProgress);

        let generation = inner.generation;
        let session = Arc::downgrade(self);
        inner.timer = Some(spawn_countdown(
            countdown,
            self.clock.clone(),
            self.config.tick_interval,
            move || {
                if let Some(session) = session.upgrade() {
                    tokio::spawn(session.expire(generation));
                }
            },
        ));
        Ok(())
    }

    /// Finish the attempt. Safe to call any number of times, from any
    /// number of tasks: at most one finish call is in flight, and once it
    /// succeeds every caller receives the same [`SubmissionRecord`].
    ///
    /// From `Errored` (after a failed finish) this retries the submission.
    pub async fn finish(self: &Arc<Self>, cause: FinishCause) -> Result<SubmissionRecord, EngineError> {
        let pending = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Finished => {
                    return inner.submission.clone().ok_or_else(|| {
                        EngineError::Interrupted("finished without a submission record".into())
                    });
                }
                SessionState::Submitting => match inner.finish.clone() {
                    Some(pending) => pending,
                    None => {
                        return Err(EngineError::Interrupted(
                            "submitting without a pending finish".into(),
                        ))
                    }
                },
                SessionState::InProgress | SessionState::Errored
                    if inner
                        .failure
                        .as_ref()
                        .map_or(true, SessionFailure::is_retryable) =>
                {
                    if inner.closed {
                        return Err(EngineError::SessionClosed);
                    }
                    self.begin_finish(&mut inner, cause)
                }
                from => {
                    return Err(EngineError::InvalidTransition {
                        from,
                        action: "finish",
                    })
                }
            }
        };
        pending.await
    }

    /// Leave the session: stop the countdown and abandon in-flight autosaves.
    /// A finish call already issued still runs to completion.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        self.autosave.abandon();
        tracing::info!(session_id = %self.session_id, state = %inner.state, "session closed");
    }

    // -----------------------------------------------------------------------
    // Answers
    // -----------------------------------------------------------------------

    /// Replace the answer to `question_id` and queue an autosave.
    pub fn set_answer(
        &self,
        question_id: &str,
        option_ids: &[String],
        marked_for_review: bool,
    ) -> Result<(), EngineError> {
        self.edit(question_id, |answers, question, elapsed| {
            answers.set_answer(question, option_ids, marked_for_review, elapsed)
        })
        .map(|_| ())
    }

    pub fn mark_for_review(&self, question_id: &str, marked: bool) -> Result<(), EngineError> {
        self.edit(question_id, |answers, question, elapsed| {
            answers.mark_for_review(question, marked, elapsed)
        })
        .map(|_| ())
    }

    /// Flip the review flag. Returns the new value.
    pub fn toggle_review(&self, question_id: &str) -> Result<bool, EngineError> {
        let change = self.edit(question_id, |answers, question, elapsed| {
            let marked = answers
                .get(&question.id)
                .is_some_and(|r| r.marked_for_review);
            answers.mark_for_review(question, !marked, elapsed)
        })?;
        Ok(matches!(change, AnswerChange::Updated(ref r) if r.marked_for_review))
    }

    /// Remove the answer (and review flag) for `question_id`.
    pub fn clear_answer(&self, question_id: &str) -> Result<(), EngineError> {
        self.edit(question_id, |answers, question, _| {
            answers.clear(&question.id);
            Ok(AnswerChange::Cleared {
                question_id: question.id.clone(),
            })
        })
        .map(|_| ())
    }

    pub fn answer(&self, question_id: &str) -> Option<AnswerRecord> {
        let inner = self.lock();
        inner
            .attempt
            .as_ref()
            .and_then(|a| a.answers.get(question_id).cloned())
    }

    /// Current answers in question order.
    pub fn answers(&self) -> Vec<AnswerRecord> {
        let inner = self.lock();
        inner
            .attempt
            .as_ref()
            .map(|a| a.answers.snapshot(&a.definition))
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn current_index(&self) -> Result<usize, EngineError> {
        self.with_attempt("navigate", |a| Ok(a.navigator.current_index()))
    }

    pub fn current_question(&self) -> Result<Question, EngineError> {
        self.with_attempt("navigate", |a| {
            let index = a.navigator.current_index();
            a.definition
                .questions
                .get(index)
                .cloned()
                .ok_or(EngineError::IndexOutOfRange {
                    index,
                    count: a.definition.question_count(),
                })
        })
    }

    pub fn go_to(&self, index: usize) -> Result<usize, EngineError> {
        self.with_attempt_mut("navigate", |a| a.navigator.go_to(index))
    }

    pub fn next(&self) -> Result<usize, EngineError> {
        self.with_attempt_mut("navigate", |a| Ok(a.navigator.next()))
    }

    pub fn previous(&self) -> Result<usize, EngineError> {
        self.with_attempt_mut("navigate", |a| Ok(a.navigator.previous()))
    }

    pub fn status_of(&self, index: usize) -> Result<QuestionStatus, EngineError> {
        self.with_attempt("read status", |a| {
            navigation::status_of(&a.definition, &a.answers, index)
        })
    }

    pub fn statuses(&self) -> Result<Vec<QuestionStatus>, EngineError> {
        self.with_attempt("read status", |a| {
            Ok(navigation::statuses(&a.definition, &a.answers))
        })
    }

    pub fn status_counts(&self) -> Result<StatusCounts, EngineError> {
        self.with_attempt("read status", |a| {
            Ok(navigation::status_counts(&a.definition, &a.answers))
        })
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn definition(&self) -> Option<Arc<AssessmentDefinition>> {
        self.lock()
            .attempt
            .as_ref()
            .map(|a| Arc::clone(&a.definition))
    }

    /// Seconds left, recomputed from the clock. `None` before the
    /// definition is loaded.
    pub fn remaining_seconds(&self) -> Option<u64> {
        let inner = self.lock();
        inner
            .attempt
            .as_ref()
            .map(|a| a.countdown.remaining_secs(self.clock.now()))
    }

    /// Per-tick updates of the remaining seconds while the countdown runs.
    pub fn subscribe_remaining(&self) -> Option<watch::Receiver<u64>> {
        self.lock().timer.as_ref().map(TimerHandle::subscribe)
    }

    pub fn submission(&self) -> Option<SubmissionRecord> {
        self.lock().submission.clone()
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        self.lock().failure.clone()
    }

    pub fn autosave(&self) -> &AutosaveDispatcher {
        &self.autosave
    }

    /// Fetch the review payload for a finished session and score it.
    pub async fn review(&self) -> Result<ReviewResult, EngineError> {
        let state = self.state();
        if state != SessionState::Finished {
            return Err(EngineError::InvalidTransition {
                from: state,
                action: "review",
            });
        }
        let payload = self
            .config
            .load_retry
            .run("fetch_review", || self.service.fetch_review(&self.session_id))
            .await
            .map_err(EngineError::Review)?;
        Ok(ReviewResult::from_payload(&payload))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) {
        tracing::info!(
            session_id = %self.session_id,
            from = %inner.state,
            to = %to,
            "session state changed"
        );
        inner.state = to;
        inner.generation += 1;
    }

    /// Countdown expiry. A no-op unless the session is still in the
    /// generation that armed the countdown.
    async fn expire(self: Arc<Self>, generation: u64) {
        {
            let inner = self.lock();
            if inner.generation != generation || inner.state != SessionState::InProgress {
                tracing::debug!(
                    session_id = %self.session_id,
                    "ignoring stale countdown expiry (generation {generation}, now {})",
                    inner.generation
                );
                return;
            }
        }
        tracing::info!(session_id = %self.session_id, "time is up, submitting");
        if let Err(e) = self.finish(FinishCause::Timeout).await {
            tracing::warn!(session_id = %self.session_id, "timed-out submission failed: {e}");
        }
    }

    fn begin_finish(self: &Arc<Self>, inner: &mut Inner, cause: FinishCause) -> FinishFuture {
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        let cause = *inner.cause.get_or_insert(cause);
        inner.failure = None;
        self.transition(inner, SessionState::Submitting);

        let request = FinishRequest {
            session_id: self.session_id.clone(),
            cause,
            answers: inner
                .attempt
                .as_ref()
                .map(|a| a.answers.snapshot(&a.definition))
                .unwrap_or_default(),
        };

        // Spawned so that dropping every caller cannot cancel the submission.
        let task = tokio::spawn(Arc::clone(self).submit(request));
        let session = Arc::clone(self);
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let error = EngineError::Interrupted(e.to_string());
                    session.fail_finish(error.clone());
                    Err(error)
                }
            }
        }
        .boxed()
        .shared();

        inner.finish = Some(pending.clone());
        pending
    }

    async fn submit(self: Arc<Self>, request: FinishRequest) -> Result<SubmissionRecord, EngineError> {
        let unsynced = self.autosave.flush().await;
        if unsynced > 0 {
            tracing::warn!(
                session_id = %self.session_id,
                "{unsynced} answer(s) not autosaved, relying on the finish snapshot"
            );
        }

        let outcome = self
            .config
            .finish_retry
            .run("finish_assessment", || self.service.finish_assessment(&request))
            .await;

        match outcome {
            Ok(ack) => {
                let record = SubmissionRecord {
                    id: Uuid::new_v4(),
                    session_id: self.session_id.clone(),
                    submitted_at: ack.submitted_at,
                    cause: request.cause,
                    answers: request.answers,
                    attempt_number: ack.attempt_number,
                };
                let mut inner = self.lock();
                inner.submission = Some(record.clone());
                self.transition(&mut inner, SessionState::Finished);
                Ok(record)
            }
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "finish failed after retries: {e}");
                let error = EngineError::Finish(e);
                self.fail_finish(error.clone());
                Err(error)
            }
        }
    }

    fn fail_finish(&self, error: EngineError) {
        let mut inner = self.lock();
        if inner.state != SessionState::Submitting {
            return;
        }
        inner.failure = Some(SessionFailure {
            phase: FailurePhase::Finish,
            error,
        });
        self.transition(&mut inner, SessionState::Errored);
    }

    /// Apply an answer edit under the lock and queue its autosave.
    fn edit<F>(&self, question_id: &str, apply: F) -> Result<AnswerChange, EngineError>
    where
        F: FnOnce(&mut AnswerStore, &Question, u64) -> Result<AnswerChange, EngineError>,
    {
        let mut inner = self.lock();
        if inner.closed {
            return Err(EngineError::SessionClosed);
        }
        let state = inner.state;
        if !state.accepts_answers() {
            return Err(EngineError::NotAcceptingAnswers { state });
        }
        let attempt = inner
            .attempt
            .as_mut()
            .ok_or(EngineError::NotAcceptingAnswers { state })?;
        // The expiry task may not have run yet; the deadline alone decides.
        let now = self.clock.now();
        if attempt.countdown.is_expired(now) {
            return Err(EngineError::NotAcceptingAnswers { state });
        }

        let definition = Arc::clone(&attempt.definition);
        let question = definition
            .question(question_id)
            .ok_or_else(|| EngineError::UnknownQuestion(question_id.to_string()))?;
        let elapsed = attempt.countdown.elapsed_secs(now);
        let change = apply(&mut attempt.answers, question, elapsed)?;

        // Enqueued under the session lock so autosave order matches edit order.
        let request = match &change {
            AnswerChange::Updated(record) => SaveAnswerRequest::from_record(&self.session_id, record),
            AnswerChange::Cleared { question_id } => {
                SaveAnswerRequest::cleared(&self.session_id, question_id, elapsed)
            }
        };
        self.autosave.enqueue(request);
        Ok(change)
    }

    fn with_attempt<T>(
        &self,
        action: &'static str,
        f: impl FnOnce(&Attempt) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let inner = self.lock();
        match inner.attempt.as_ref() {
            Some(attempt) => f(attempt),
            None => Err(EngineError::InvalidTransition {
                from: inner.state,
                action,
            }),
        }
    }

    fn with_attempt_mut<T>(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut Attempt) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.lock();
        let state = inner.state;
        match inner.attempt.as_mut() {
            Some(attempt) => f(attempt),
            None => Err(EngineError::InvalidTransition {
                from: state,
                action,
            }),
        }
    }
}

impl std::fmt::Debug for AttemptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("AttemptSession")
            .field("session_id", &self.session_id)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("closed", &inner.closed)
            .finish()
    }
}
