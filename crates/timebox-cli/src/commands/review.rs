//! The `timebox review` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use timebox_client::config::load_config_from;
use timebox_client::create_service;
use timebox_core::review::{QuestionReview, ReviewFilter, ReviewResult, ReviewSummary};

#[derive(Serialize)]
struct ReviewOutput<'a> {
    filter: ReviewFilter,
    summary: &'a ReviewSummary,
    questions: Vec<&'a QuestionReview>,
}

pub async fn execute(
    session_id: String,
    filter: String,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let filter: ReviewFilter = filter.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let config = load_config_from(config_path.as_deref())?;
    let service = create_service(&config)?;
    let policy = config.engine_config().load_retry;

    let payload = policy
        .run("fetch_review", || service.fetch_review(&session_id))
        .await
        .with_context(|| format!("failed to fetch review for session {session_id}"))?;
    let review = ReviewResult::from_payload(&payload);

    if format == "json" {
        let output = ReviewOutput {
            filter,
            summary: &review.summary,
            questions: review.filter(filter),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(&review, filter);
    }

    Ok(())
}

fn print_table(review: &ReviewResult, filter: ReviewFilter) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Selected", "Correct", "Result", "Marks"]);

    for question in review.filter(filter) {
        table.add_row(vec![
            Cell::new(question.index + 1),
            Cell::new(&question.question_id),
            Cell::new(question.selected.join(", ")),
            Cell::new(question.correct.join(", ")),
            Cell::new(if question.is_correct { "correct" } else { "wrong" }),
            Cell::new(format!("{}/{}", question.earned, question.marks)),
        ]);
    }

    println!("{table}");

    let summary = &review.summary;
    println!(
        "Score: {}% ({}/{} marks), {} correct, {} wrong of {}",
        summary.score_percentage,
        summary.earned_marks,
        summary.max_marks,
        summary.correct_count,
        summary.wrong_count,
        summary.total_count
    );
    if let Some(attempts) = summary.attempt_count {
        println!("Attempts: {attempts}");
    }
}
