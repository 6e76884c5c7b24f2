//! Autosave dispatcher.
//!
//! Every answer edit becomes a [`SaveAnswerRequest`] with a per-question
//! sequence number. Edits to one question inside the coalescing window
//! collapse into a single request carrying the latest value. Requests run
//! in background tasks with bounded retry. A request stops retrying, and its
//! response is ignored, once a newer request for the same question has been
//! dispatched, so an early value never overrides a later edit.
//!
//! Failures are never surfaced to the learner. A question whose save ran out
//! of retries is resent on the next edit or on [`flush`](AutosaveDispatcher::flush).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;

use crate::retry::RetryPolicy;
use crate::traits::{AssessmentService, SaveAnswerRequest};

#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    request: SaveAnswerRequest,
}

#[derive(Debug, Default)]
struct Slot {
    /// Sequence number of the latest edit.
    latest_seq: u64,
    /// Highest sequence number handed to the network.
    dispatched_seq: u64,
    /// Highest sequence number the server acknowledged.
    acked_seq: u64,
    /// Edit waiting out the coalescing window.
    pending: Option<Queued>,
    /// Last request handed to the network, kept for resends.
    last_sent: Option<Queued>,
    /// Value of the last honoured acknowledgement.
    last_acked: Option<SaveAnswerRequest>,
    /// The latest dispatched request ran out of retries.
    failed: bool,
}

#[derive(Debug, Default)]
struct DispatchState {
    /// Bumped by `abandon`; responses from older generations are dropped.
    generation: u64,
    slots: HashMap<String, Slot>,
}

/// Coalescing, retrying, order-safe answer persistence.
#[derive(Clone)]
pub struct AutosaveDispatcher {
    service: Arc<dyn AssessmentService>,
    policy: RetryPolicy,
    window: Duration,
    state: Arc<Mutex<DispatchState>>,
}

impl AutosaveDispatcher {
    pub fn new(service: Arc<dyn AssessmentService>, policy: RetryPolicy, window: Duration) -> Self {
        Self {
            service,
            policy,
            window,
            state: Arc::new(Mutex::new(DispatchState::default())),
        }
    }

    /// Queue a save. Returns the sequence number assigned to this edit.
    ///
    /// Never blocks: the request goes out after the coalescing window from a
    /// background task. Questions whose previous save was dropped are
    /// re-queued alongside.
    pub fn enqueue(&self, request: SaveAnswerRequest) -> u64 {
        let question_id = request.question_id.clone();
        let mut to_schedule = Vec::new();

        let (generation, seq) = {
            let mut state = lock(&self.state);
            let generation = state.generation;

            for (other_id, slot) in state.slots.iter_mut() {
                if *other_id == question_id || !slot.failed || slot.pending.is_some() {
                    continue;
                }
                if let Some(last) = slot.last_sent.clone() {
                    tracing::debug!("re-queueing dropped autosave for {other_id}");
                    slot.failed = false;
                    slot.pending = Some(last);
                    to_schedule.push(other_id.clone());
                }
            }

            let slot = state.slots.entry(question_id.clone()).or_default();
            slot.latest_seq += 1;
            slot.failed = false;
            let seq = slot.latest_seq;
            let was_idle = slot.pending.is_none();
            if !was_idle {
                tracing::debug!("coalescing autosave for {question_id} (seq {seq})");
            }
            slot.pending = Some(Queued { seq, request });
            if was_idle {
                to_schedule.push(question_id);
            }
            (generation, seq)
        };

        for id in to_schedule {
            self.schedule(id, generation);
        }
        seq
    }

    /// Send everything that is waiting or was dropped, and wait for the
    /// outcome. Returns the number of questions still unsynced afterwards.
    pub async fn flush(&self) -> usize {
        let (generation, batch) = {
            let mut state = lock(&self.state);
            let generation = state.generation;
            let mut batch = Vec::new();
            for (question_id, slot) in state.slots.iter_mut() {
                if let Some(queued) = slot.pending.take() {
                    mark_dispatched(slot, &queued);
                    batch.push((question_id.clone(), queued));
                } else if slot.failed {
                    if let Some(last) = slot.last_sent.clone() {
                        slot.failed = false;
                        mark_dispatched(slot, &last);
                        batch.push((question_id.clone(), last));
                    }
                }
            }
            (generation, batch)
        };

        if !batch.is_empty() {
            tracing::debug!("flushing {} autosave request(s)", batch.len());
        }

        join_all(batch.into_iter().map(|(question_id, queued)| {
            send(
                Arc::clone(&self.state),
                Arc::clone(&self.service),
                self.policy,
                question_id,
                queued,
                generation,
            )
        }))
        .await;

        self.unsynced_questions().len()
    }

    /// Stop honouring responses and drop queued edits. In-flight requests
    /// are left to finish on their own; their results are ignored.
    pub fn abandon(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        for slot in state.slots.values_mut() {
            slot.pending = None;
        }
        tracing::debug!("autosave abandoned (generation {})", state.generation);
    }

    /// Whether the server has acknowledged the latest edit of `question_id`.
    pub fn is_synced(&self, question_id: &str) -> bool {
        let state = lock(&self.state);
        state
            .slots
            .get(question_id)
            .map_or(true, |slot| slot.pending.is_none() && slot.acked_seq == slot.latest_seq)
    }

    /// Question ids whose latest edit is not yet acknowledged, sorted.
    pub fn unsynced_questions(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut ids: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.pending.is_some() || slot.acked_seq < slot.latest_seq)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// The request body whose acknowledgement was last honoured.
    pub fn acknowledged(&self, question_id: &str) -> Option<SaveAnswerRequest> {
        let state = lock(&self.state);
        state
            .slots
            .get(question_id)
            .and_then(|slot| slot.last_acked.clone())
    }

    fn schedule(&self, question_id: String, generation: u64) {
        let state = Arc::clone(&self.state);
        let service = Arc::clone(&self.service);
        let policy = self.policy;
        let window = self.window;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let queued = {
                let mut guard = lock(&state);
                if guard.generation != generation {
                    return;
                }
                let Some(slot) = guard.slots.get_mut(&question_id) else {
                    return;
                };
                // Already taken by a flush.
                let Some(queued) = slot.pending.take() else {
                    return;
                };
                mark_dispatched(slot, &queued);
                queued
            };
            send(state, service, policy, question_id, queued, generation).await;
        });
    }
}

fn mark_dispatched(slot: &mut Slot, queued: &Queued) {
    slot.dispatched_seq = slot.dispatched_seq.max(queued.seq);
    slot.last_sent = Some(queued.clone());
}

async fn send(
    state: Arc<Mutex<DispatchState>>,
    service: Arc<dyn AssessmentService>,
    policy: RetryPolicy,
    question_id: String,
    queued: Queued,
    generation: u64,
) {
    let result = policy
        .run_while(
            "save_answer",
            || is_current(&state, &question_id, queued.seq, generation),
            || service.save_answer(&queued.request),
        )
        .await;

    let mut guard = lock(&state);
    if guard.generation != generation {
        tracing::debug!("dropping autosave response for {question_id}: session abandoned");
        return;
    }
    let Some(slot) = guard.slots.get_mut(&question_id) else {
        return;
    };
    if queued.seq < slot.dispatched_seq {
        tracing::debug!(
            "ignoring stale autosave response for {question_id} (seq {} < {})",
            queued.seq,
            slot.dispatched_seq
        );
        return;
    }

    match result {
        Ok(_) => {
            slot.acked_seq = slot.acked_seq.max(queued.seq);
            slot.last_acked = Some(queued.request);
        }
        Err(e) => {
            tracing::warn!("autosave for {question_id} dropped after retries: {e}");
            // A newer edit waiting in the window will carry the value anyway.
            if slot.pending.is_none() {
                slot.failed = true;
            }
        }
    }
}

/// Whether a request with `seq` is still the newest one dispatched for
/// `question_id` in `generation`.
fn is_current(state: &Mutex<DispatchState>, question_id: &str, seq: u64, generation: u64) -> bool {
    let guard = lock(state);
    guard.generation == generation
        && guard
            .slots
            .get(question_id)
            .map_or(false, |slot| seq >= slot.dispatched_seq)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
