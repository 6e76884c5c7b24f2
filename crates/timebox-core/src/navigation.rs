//! Question pointer and per-question status derived from the answer store.
//!
//! Navigation never persists anything; it only reads answers.

use serde::{Deserialize, Serialize};

use crate::answers::AnswerStore;
use crate::error::EngineError;
use crate::model::AssessmentDefinition;

/// Palette status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Answered,
    Unanswered,
    /// Marked for review, whether or not it has an answer.
    Review,
}

/// Tally of statuses across the assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub answered: usize,
    pub unanswered: usize,
    pub review: usize,
}

/// Current question pointer, bounded to `[0, count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    count: usize,
}

impl Navigator {
    pub fn new(count: usize) -> Self {
        Self { current: 0, count }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize, EngineError> {
        if index >= self.count {
            return Err(EngineError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        self.current = index;
        Ok(index)
    }

    /// Move forward, staying on the last question.
    pub fn next(&mut self) -> usize {
        if self.current + 1 < self.count {
            self.current += 1;
        }
        self.current
    }

    /// Move back, staying on the first question.
    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }
}

/// Status of the question at `index`.
pub fn status_of(
    definition: &AssessmentDefinition,
    answers: &AnswerStore,
    index: usize,
) -> Result<QuestionStatus, EngineError> {
    let question = definition
        .questions
        .get(index)
        .ok_or(EngineError::IndexOutOfRange {
            index,
            count: definition.question_count(),
        })?;
    Ok(match answers.get(&question.id) {
        Some(record) if record.marked_for_review => QuestionStatus::Review,
        Some(record) if record.is_answered() => QuestionStatus::Answered,
        _ => QuestionStatus::Unanswered,
    })
}

/// Statuses of all questions, in question order.
pub fn statuses(definition: &AssessmentDefinition, answers: &AnswerStore) -> Vec<QuestionStatus> {
    (0..definition.question_count())
        .filter_map(|i| status_of(definition, answers, i).ok())
        .collect()
}

pub fn status_counts(definition: &AssessmentDefinition, answers: &AnswerStore) -> StatusCounts {
    statuses(definition, answers)
        .into_iter()
        .fold(StatusCounts::default(), |mut counts, status| {
            match status {
                QuestionStatus::Answered => counts.answered += 1,
                QuestionStatus::Unanswered => counts.unanswered += 1,
                QuestionStatus::Review => counts.review += 1,
            }
            counts
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, Question, QuestionType};

    fn definition(n: usize) -> AssessmentDefinition {
        AssessmentDefinition {
            id: "a".into(),
            title: "t".into(),
            duration_secs: 60,
            questions: (1..=n)
                .map(|i| Question {
                    id: format!("q{i}"),
                    prompt: String::new(),
                    question_type: QuestionType::SingleChoice,
                    options: vec![
                        AnswerOption {
                            id: "a".into(),
                            statement: "A".into(),
                        },
                        AnswerOption {
                            id: "b".into(),
                            statement: "B".into(),
                        },
                    ],
                    marks: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn go_to_is_bounded() {
        let mut nav = Navigator::new(3);
        assert_eq!(nav.go_to(2), Ok(2));
        assert_eq!(
            nav.go_to(3),
            Err(EngineError::IndexOutOfRange { index: 3, count: 3 })
        );
        assert_eq!(nav.current_index(), 2);
    }

    #[test]
    fn next_and_previous_saturate() {
        let mut nav = Navigator::new(2);
        assert_eq!(nav.previous(), 0);
        assert_eq!(nav.next(), 1);
        assert_eq!(nav.next(), 1);
        assert_eq!(nav.previous(), 0);
    }

    #[test]
    fn status_follows_answer_lifecycle() {
        let def = definition(2);
        let q = &def.questions[0];
        let mut answers = AnswerStore::new();
        assert_eq!(status_of(&def, &answers, 0), Ok(QuestionStatus::Unanswered));

        answers.set_answer(q, &["a".to_string()], false, 0).unwrap();
        assert_eq!(status_of(&def, &answers, 0), Ok(QuestionStatus::Answered));

        answers.mark_for_review(q, true, 0).unwrap();
        assert_eq!(status_of(&def, &answers, 0), Ok(QuestionStatus::Review));

        answers.clear(&q.id);
        assert_eq!(status_of(&def, &answers, 0), Ok(QuestionStatus::Unanswered));
    }

    #[test]
    fn review_wins_without_answer() {
        let def = definition(1);
        let mut answers = AnswerStore::new();
        answers.mark_for_review(&def.questions[0], true, 0).unwrap();
        assert_eq!(status_of(&def, &answers, 0), Ok(QuestionStatus::Review));
    }

    #[test]
    fn counts_cover_every_question() {
        let def = definition(4);
        let mut answers = AnswerStore::new();
        answers
            .set_answer(&def.questions[0], &["a".to_string()], false, 0)
            .unwrap();
        answers
            .set_answer(&def.questions[1], &["b".to_string()], true, 0)
            .unwrap();
        assert_eq!(
            status_counts(&def, &answers),
            StatusCounts {
                answered: 1,
                unanswered: 2,
                review: 1
            }
        );
        assert!(status_of(&def, &answers, 9).is_err());
    }
}
