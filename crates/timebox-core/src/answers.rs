//! In-memory answer store, the source of truth for the UI.
//!
//! One record per question id; every edit replaces the previous record.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::model::{AnswerRecord, AssessmentDefinition, Question, QuestionType};

/// Outcome of an edit, used to build the matching autosave request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChange {
    /// The record now holds this value.
    Updated(AnswerRecord),
    /// The record was removed.
    Cleared { question_id: String },
}

/// Current answers keyed by question id.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    records: HashMap<String, AnswerRecord>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.records.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrite the answer for `question`. Last edit wins.
    ///
    /// An empty selection that is not marked for review removes the record,
    /// exactly like [`clear`](Self::clear).
    pub fn set_answer(
        &mut self,
        question: &Question,
        option_ids: &[String],
        marked_for_review: bool,
        elapsed_seconds: u64,
    ) -> Result<AnswerChange, EngineError> {
        let option_ids = normalize_selection(question, option_ids)?;

        if option_ids.is_empty() && !marked_for_review {
            self.records.remove(&question.id);
            return Ok(AnswerChange::Cleared {
                question_id: question.id.clone(),
            });
        }

        let record = AnswerRecord {
            question_id: question.id.clone(),
            option_ids,
            marked_for_review,
            elapsed_seconds,
        };
        self.records.insert(question.id.clone(), record.clone());
        Ok(AnswerChange::Updated(record))
    }

    /// Set or unset the review flag, keeping the current selection.
    pub fn mark_for_review(
        &mut self,
        question: &Question,
        marked: bool,
        elapsed_seconds: u64,
    ) -> Result<AnswerChange, EngineError> {
        let current = self
            .records
            .get(&question.id)
            .map(|r| r.option_ids.clone())
            .unwrap_or_default();
        self.set_answer(question, &current, marked, elapsed_seconds)
    }

    /// Remove the record entirely, review flag included.
    /// Returns `false` if there was nothing to clear.
    pub fn clear(&mut self, question_id: &str) -> bool {
        self.records.remove(question_id).is_some()
    }

    /// All records in question order.
    pub fn snapshot(&self, definition: &AssessmentDefinition) -> Vec<AnswerRecord> {
        definition
            .questions
            .iter()
            .filter_map(|q| self.records.get(&q.id).cloned())
            .collect()
    }
}

/// Validate a selection against the question and put it in canonical form
/// (sorted, no duplicates).
fn normalize_selection(
    question: &Question,
    option_ids: &[String],
) -> Result<Vec<String>, EngineError> {
    let mut selected: Vec<String> = option_ids.to_vec();
    selected.sort();
    selected.dedup();

    if let Some(unknown) = selected.iter().find(|id| !question.has_option(id)) {
        return Err(EngineError::UnknownOption {
            question_id: question.id.clone(),
            option_id: unknown.clone(),
        });
    }

    if question.question_type == QuestionType::SingleChoice && selected.len() > 1 {
        return Err(EngineError::TooManyOptions {
            question_id: question.id.clone(),
            count: selected.len(),
        });
    }

    Ok(selected)
}
