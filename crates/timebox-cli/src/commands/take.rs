//! The `timebox take` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Deserialize;

use timebox_client::config::load_config_from;
use timebox_client::create_service;
use timebox_core::model::FinishCause;
use timebox_core::navigation::QuestionStatus;
use timebox_core::AttemptSession;

/// Answers to apply, as read from the `--answers` file.
#[derive(Debug, Deserialize)]
struct AnswerFile {
    #[serde(default)]
    answers: Vec<AnswerEntry>,
}

#[derive(Debug, Deserialize)]
struct AnswerEntry {
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    review: bool,
}

fn load_answer_file(path: &Path) -> Result<AnswerFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answers: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse answers: {}", path.display()))
}

pub async fn execute(
    session_id: String,
    answers_path: PathBuf,
    confirm: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let answers = load_answer_file(&answers_path)?;
    let config = load_config_from(config_path.as_deref())?;
    let service = create_service(&config)?;

    let session = AttemptSession::new(session_id.clone(), service, config.engine_config());
    session
        .start()
        .await
        .with_context(|| format!("failed to open session {session_id}"))?;
    let definition = session
        .definition()
        .context("session started without an assessment")?;

    eprintln!(
        "{}: {} questions, {} remaining",
        definition.title,
        definition.question_count(),
        format_clock(session.remaining_seconds().unwrap_or(0))
    );

    for entry in &answers.answers {
        session
            .set_answer(&entry.question, &entry.options, entry.review)
            .with_context(|| format!("cannot apply answer for {}", entry.question))?;
    }
    tracing::debug!("applied {} answer(s) to session {session_id}", answers.answers.len());

    print_palette(&session)?;

    if !confirm {
        let unsynced = session.autosave().flush().await;
        session.close();
        if unsynced > 0 {
            eprintln!("Warning: {unsynced} answer(s) could not be saved");
        }
        println!("Answers saved, attempt still open. Re-run with --confirm to submit.");
        return Ok(());
    }

    let record = session
        .finish(FinishCause::Manual)
        .await
        .with_context(|| format!("failed to submit session {session_id}"))?;

    println!(
        "Submitted {} answer(s) for session {} at {}",
        record.answers.len(),
        record.session_id,
        record.submitted_at.to_rfc3339()
    );
    if let Some(attempt) = record.attempt_number {
        println!("Attempt number: {attempt}");
    }
    println!("Submission id: {}", record.id);

    Ok(())
}

fn print_palette(session: &AttemptSession) -> Result<()> {
    let definition = session
        .definition()
        .context("session started without an assessment")?;
    let statuses = session.statuses()?;

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Selected", "Status"]);
    for (index, (question, status)) in definition.questions.iter().zip(&statuses).enumerate() {
        let selected = session
            .answer(&question.id)
            .map(|a| a.option_ids.join(", "))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&question.id),
            Cell::new(selected),
            Cell::new(status_label(*status)),
        ]);
    }
    eprintln!("\n{table}");

    let counts = session.status_counts()?;
    eprintln!(
        "answered {}, unanswered {}, marked for review {}",
        counts.answered, counts.unanswered, counts.review
    );
    Ok(())
}

fn status_label(status: QuestionStatus) -> &'static str {
    match status {
        QuestionStatus::Answered => "answered",
        QuestionStatus::Unanswered => "unanswered",
        QuestionStatus::Review => "review",
    }
}

fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(605), "10:05");
    }

    #[test]
    fn parse_answer_file() {
        let file: AnswerFile = toml::from_str(
            r#"
[[answers]]
question = "q1"
options = ["a"]

[[answers]]
question = "q2"
review = true
"#,
        )
        .unwrap();
        assert_eq!(file.answers.len(), 2);
        assert!(file.answers[1].options.is_empty());
        assert!(file.answers[1].review);
    }
}
