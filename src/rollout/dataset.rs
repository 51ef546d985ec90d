use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Question {
    #[serde(alias = "user_query")]
    pub question: String,
    #[serde(alias = "ground_truth")]
    pub answer: String,
}

/// Reads a JSONL dataset. Blank lines are skipped; extra columns are ignored.
pub(crate) fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid dataset row at {}:{}", path.display(), idx + 1))
        })
        .collect()
}
