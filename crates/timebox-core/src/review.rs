//! Scoring and review.
//!
//! A review is a pure function of the questions, their correct option sets
//! and the submitted answers. A question counts as correct only when the
//! selected set equals the correct set exactly; partial credit is not
//! modelled.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{AnswerRecord, Question};
use crate::traits::ReviewPayload;

/// Outcome for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: String,
    /// Position in the assessment, zero-based.
    pub index: usize,
    pub selected: Vec<String>,
    pub correct: Vec<String>,
    pub is_correct: bool,
    pub marks: u32,
    pub earned: u32,
}

/// Aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// `round(100 * earned_marks / max_marks)`; zero when there are no marks.
    pub score_percentage: u32,
    pub correct_count: usize,
    /// Everything not correct, unanswered questions included.
    pub wrong_count: usize,
    pub total_count: usize,
    pub earned_marks: u64,
    pub max_marks: u64,
    #[serde(default)]
    pub attempt_count: Option<u32>,
}

/// Derived, read-only review of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub questions: Vec<QuestionReview>,
    pub summary: ReviewSummary,
}

/// Which questions a review view shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFilter {
    #[default]
    All,
    Correct,
    Incorrect,
}

impl ReviewFilter {
    pub fn matches(self, review: &QuestionReview) -> bool {
        match self {
            ReviewFilter::All => true,
            ReviewFilter::Correct => review.is_correct,
            ReviewFilter::Incorrect => !review.is_correct,
        }
    }
}

impl FromStr for ReviewFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(ReviewFilter::All),
            "correct" => Ok(ReviewFilter::Correct),
            "incorrect" | "wrong" => Ok(ReviewFilter::Incorrect),
            other => Err(format!("unknown review filter: {other}")),
        }
    }
}

impl fmt::Display for ReviewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewFilter::All => "all",
            ReviewFilter::Correct => "correct",
            ReviewFilter::Incorrect => "incorrect",
        };
        f.write_str(s)
    }
}

impl ReviewResult {
    /// Score `answers` against `correct_option_sets`.
    ///
    /// Unanswered questions, and questions without a correct set, are wrong.
    pub fn compute(
        questions: &[Question],
        correct_option_sets: &BTreeMap<String, Vec<String>>,
        answers: &[AnswerRecord],
    ) -> Self {
        let answered: BTreeMap<&str, &AnswerRecord> = answers
            .iter()
            .map(|a| (a.question_id.as_str(), a))
            .collect();

        let reviews: Vec<QuestionReview> = questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let selected: BTreeSet<String> = answered
                    .get(question.id.as_str())
                    .map(|a| a.option_ids.iter().cloned().collect())
                    .unwrap_or_default();
                let correct: BTreeSet<String> = correct_option_sets
                    .get(&question.id)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default();

                let is_correct = !selected.is_empty() && selected == correct;
                QuestionReview {
                    question_id: question.id.clone(),
                    index,
                    selected: selected.into_iter().collect(),
                    correct: correct.into_iter().collect(),
                    is_correct,
                    marks: question.marks,
                    earned: if is_correct { question.marks } else { 0 },
                }
            })
            .collect();

        let total_count = reviews.len();
        let correct_count = reviews.iter().filter(|r| r.is_correct).count();
        let earned_marks: u64 = reviews.iter().map(|r| r.earned as u64).sum();
        let max_marks: u64 = reviews.iter().map(|r| r.marks as u64).sum();

        ReviewResult {
            questions: reviews,
            summary: ReviewSummary {
                score_percentage: percentage(earned_marks, max_marks),
                correct_count,
                wrong_count: total_count - correct_count,
                total_count,
                earned_marks,
                max_marks,
                attempt_count: None,
            },
        }
    }

    /// Build the review from a `fetch_review` payload.
    pub fn from_payload(payload: &ReviewPayload) -> Self {
        let mut result = Self::compute(
            &payload.questions,
            &payload.correct_option_sets,
            &payload.submitted_answers,
        );
        result.summary.attempt_count = Some(payload.attempt_count);
        result
    }

    /// Questions matching `filter`, in original order. Does not modify `self`.
    pub fn filter(&self, filter: ReviewFilter) -> Vec<&QuestionReview> {
        self.questions.iter().filter(|r| filter.matches(r)).collect()
    }
}

/// `round(100 * earned / max)` with halves rounded up, in integer arithmetic.
fn percentage(earned: u64, max: u64) -> u32 {
    if max == 0 {
        return 0;
    }
    ((200 * earned + max) / (2 * max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, QuestionType};

    fn question(id: &str, question_type: QuestionType, marks: u32) -> Question {
        Question {
            id: id.into(),
            prompt: String::new(),
            question_type,
            options: ["a", "b", "c", "d"]
                .iter()
                .map(|o| AnswerOption {
                    id: (*o).into(),
                    statement: (*o).into(),
                })
                .collect(),
            marks,
        }
    }

    fn answer(q: &str, opts: &[&str], review: bool) -> AnswerRecord {
        AnswerRecord {
            question_id: q.into(),
            option_ids: opts.iter().map(|s| s.to_string()).collect(),
            marked_for_review: review,
            elapsed_seconds: 0,
        }
    }

    fn correct_sets(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(q, opts)| (q.to_string(), opts.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn five_question_setup() -> (Vec<Question>, BTreeMap<String, Vec<String>>, Vec<AnswerRecord>) {
        let questions: Vec<Question> = (1..=5)
            .map(|i| question(&format!("q{i}"), QuestionType::SingleChoice, 1))
            .collect();
        let correct = correct_sets(&[
            ("q1", &["a"]),
            ("q2", &["b"]),
            ("q3", &["c"]),
            ("q4", &["d"]),
            ("q5", &["a"]),
        ]);
        let answers = vec![
            answer("q1", &["a"], false),
            answer("q2", &["c"], false),
            answer("q4", &["d"], true),
            answer("q5", &[], true),
        ];
        (questions, correct, answers)
    }

    #[test]
    fn example_attempt_scores_forty_percent() {
        let (questions, correct, answers) = five_question_setup();
        let review = ReviewResult::compute(&questions, &correct, &answers);
        assert_eq!(review.summary.correct_count, 2);
        assert_eq!(review.summary.wrong_count, 3);
        assert_eq!(review.summary.total_count, 5);
        assert_eq!(review.summary.score_percentage, 40);
    }

    #[test]
    fn multi_choice_requires_exact_set() {
        let questions = vec![
            question("q1", QuestionType::MultiChoice, 1),
            question("q2", QuestionType::MultiChoice, 1),
            question("q3", QuestionType::MultiChoice, 1),
        ];
        let correct = correct_sets(&[("q1", &["a", "c"]), ("q2", &["a", "c"]), ("q3", &["a", "c"])]);
        let answers = vec![
            answer("q1", &["c", "a"], false),
            answer("q2", &["a"], false),
            answer("q3", &["a", "b", "c"], false),
        ];
        let review = ReviewResult::compute(&questions, &correct, &answers);
        let flags: Vec<bool> = review.questions.iter().map(|r| r.is_correct).collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn weighted_marks_drive_percentage() {
        let questions = vec![
            question("q1", QuestionType::SingleChoice, 3),
            question("q2", QuestionType::SingleChoice, 1),
            question("q3", QuestionType::SingleChoice, 2),
        ];
        let correct = correct_sets(&[("q1", &["a"]), ("q2", &["a"]), ("q3", &["a"])]);
        let answers = vec![answer("q1", &["a"], false), answer("q2", &["b"], false)];
        let review = ReviewResult::compute(&questions, &correct, &answers);
        assert_eq!(review.summary.earned_marks, 3);
        assert_eq!(review.summary.max_marks, 6);
        assert_eq!(review.summary.score_percentage, 50);
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(4, 4), 100);
    }

    #[test]
    fn question_without_correct_set_is_wrong() {
        let questions = vec![question("q1", QuestionType::SingleChoice, 1)];
        let review = ReviewResult::compute(&questions, &BTreeMap::new(), &[]);
        assert!(!review.questions[0].is_correct);
        assert_eq!(review.summary.score_percentage, 0);
    }

    #[test]
    fn compute_is_deterministic() {
        let (questions, correct, answers) = five_question_setup();
        let first = ReviewResult::compute(&questions, &correct, &answers);
        for _ in 0..10 {
            let again = ReviewResult::compute(&questions, &correct, &answers);
            assert_eq!(again, first);
            assert_eq!(
                serde_json::to_string(&again).unwrap(),
                serde_json::to_string(&first).unwrap()
            );
        }
    }

    #[test]
    fn filter_preserves_order_and_is_idempotent() {
        let (questions, correct, answers) = five_question_setup();
        let review = ReviewResult::compute(&questions, &correct, &answers);
        let before = review.clone();

        let ids = |v: Vec<&QuestionReview>| -> Vec<String> {
            v.into_iter().map(|r| r.question_id.clone()).collect()
        };
        assert_eq!(ids(review.filter(ReviewFilter::Correct)), vec!["q1", "q4"]);
        assert_eq!(
            ids(review.filter(ReviewFilter::Incorrect)),
            vec!["q2", "q3", "q5"]
        );
        assert_eq!(review.filter(ReviewFilter::All).len(), 5);
        assert_eq!(ids(review.filter(ReviewFilter::Correct)), vec!["q1", "q4"]);
        assert_eq!(review, before);
    }

    #[test]
    fn from_payload_carries_attempt_count() {
        let (questions, correct, answers) = five_question_setup();
        let payload = ReviewPayload {
            questions,
            correct_option_sets: correct,
            submitted_answers: answers,
            attempt_count: 2,
        };
        let review = ReviewResult::from_payload(&payload);
        assert_eq!(review.summary.attempt_count, Some(2));
        assert_eq!(review.summary.score_percentage, 40);
    }

    #[test]
    fn parse_filter() {
        assert_eq!("Correct".parse::<ReviewFilter>(), Ok(ReviewFilter::Correct));
        assert_eq!("incorrect".parse::<ReviewFilter>(), Ok(ReviewFilter::Incorrect));
        assert!("maybe".parse::<ReviewFilter>().is_err());
        assert_eq!(ReviewFilter::default().to_string(), "all");
    }
}
