//! The `timebox init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_unless_exists(Path::new("timebox.toml"), SAMPLE_CONFIG)?;
    write_unless_exists(Path::new("answers.toml"), EXAMPLE_ANSWERS)?;

    println!("\nNext steps:");
    println!("  1. Edit timebox.toml with your backend URL and token");
    println!("  2. Run: timebox take --session <ID> --answers answers.toml");
    println!("  3. Run: timebox take --session <ID> --answers answers.toml --confirm");
    println!("  4. Run: timebox review --session <ID>");

    Ok(())
}

fn write_unless_exists(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
        return Ok(());
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# timebox configuration

base_url = "http://localhost:8080"
api_token = "${TIMEBOX_TOKEN}"
request_timeout_ms = 15000
tick_interval_ms = 1000

[load]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 8000

[autosave]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 8000
coalesce_window_ms = 300

[finish]
max_attempts = 4
initial_backoff_ms = 500
max_backoff_ms = 8000
"#;

const EXAMPLE_ANSWERS: &str = r#"# One entry per question. `options` may be empty to only flag for review.

[[answers]]
question = "q1"
options = ["a"]

[[answers]]
question = "q2"
options = ["a", "c"]

[[answers]]
question = "q3"
options = []
review = true
"#;
