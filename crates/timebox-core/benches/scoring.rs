use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use timebox_core::model::{AnswerOption, AnswerRecord, Question, QuestionType};
use timebox_core::review::{ReviewFilter, ReviewResult};

fn make_assessment(
    n: usize,
) -> (Vec<Question>, BTreeMap<String, Vec<String>>, Vec<AnswerRecord>) {
    let questions: Vec<Question> = (0..n)
        .map(|i| Question {
            id: format!("q{i}"),
            prompt: format!("Question {i}"),
            question_type: if i % 3 == 0 {
                QuestionType::MultiChoice
            } else {
                QuestionType::SingleChoice
            },
            options: ["a", "b", "c", "d"]
                .iter()
                .map(|o| AnswerOption {
                    id: (*o).into(),
                    statement: o.to_uppercase(),
                })
                .collect(),
            marks: (i % 4 + 1) as u32,
        })
        .collect();

    let correct = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let ids = if i % 3 == 0 {
                vec!["a".to_string(), "c".to_string()]
            } else {
                vec!["b".to_string()]
            };
            (q.id.clone(), ids)
        })
        .collect();

    // Roughly two thirds answered, half of those correctly.
    let answers = questions
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 2)
        .map(|(i, q)| AnswerRecord {
            question_id: q.id.clone(),
            option_ids: if i % 2 == 0 {
                vec!["b".to_string()]
            } else {
                vec!["a".to_string(), "c".to_string()]
            },
            marked_for_review: i % 5 == 0,
            elapsed_seconds: i as u64,
        })
        .collect();

    (questions, correct, answers)
}

fn bench_review_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("review_compute");

    for n in [10, 100, 1000] {
        let (questions, correct, answers) = make_assessment(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                ReviewResult::compute(
                    black_box(&questions),
                    black_box(&correct),
                    black_box(&answers),
                )
            })
        });
    }

    group.finish();
}

fn bench_review_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("review_filter");
    let (questions, correct, answers) = make_assessment(1000);
    let review = ReviewResult::compute(&questions, &correct, &answers);

    for filter in [ReviewFilter::All, ReviewFilter::Correct, ReviewFilter::Incorrect] {
        group.bench_function(filter.to_string(), |b| {
            b.iter(|| review.filter(black_box(filter)).len())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_review_compute, bench_review_filter);
criterion_main!(benches);
