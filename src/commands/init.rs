//! Write a default configuration and an example dataset.
//!
//! Pure logic takes closures for filesystem operations so it can be tested
//! without touching disk.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::CONFIG_FILE;
use crate::templates;

/// Runs the init command in the current directory.
pub(crate) fn run(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    info!("Initializing swe-grep in {}", cwd.display());

    let files = init_files();
    let results = init_project(
        &files,
        force,
        |path| cwd.join(path).exists(),
        |path, content| {
            fs::write(cwd.join(path), content)
                .with_context(|| format!("Failed to write {}", path.display()))
        },
    )?;

    print!("{}", format_results(&results, &files));
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InitFile {
    path: PathBuf,
    content: &'static str,
    description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteResult {
    Created,
    Overwritten,
    Skipped,
}

fn init_files() -> Vec<InitFile> {
    vec![
        InitFile {
            path: PathBuf::from(CONFIG_FILE),
            content: templates::SWE_GREP_TOML,
            description: "Configuration (all values commented at their defaults)",
        },
        InitFile {
            path: PathBuf::from("questions.jsonl"),
            content: templates::QUESTIONS_JSONL,
            description: "Example dataset",
        },
    ]
}

fn init_project<E, W>(
    files: &[InitFile],
    force: bool,
    exists: E,
    mut write_file: W,
) -> Result<Vec<(PathBuf, WriteResult)>>
where
    E: Fn(&Path) -> bool,
    W: FnMut(&Path, &str) -> Result<()>,
{
    let mut results = Vec::new();

    for file in files {
        let existed = exists(&file.path);
        let result = if existed && !force {
            WriteResult::Skipped
        } else {
            write_file(&file.path, file.content)?;
            if existed {
                WriteResult::Overwritten
            } else {
                WriteResult::Created
            }
        };
        results.push((file.path.clone(), result));
    }

    Ok(results)
}

fn format_results(results: &[(PathBuf, WriteResult)], files: &[InitFile]) -> String {
    let mut out = String::new();

    writeln!(&mut out, "\n{} swe-grep initialized\n", "✓".green().bold()).unwrap();

    for (path, result) in results {
        let desc = files
            .iter()
            .find(|f| &f.path == path)
            .map_or("", |f| f.description);

        match result {
            WriteResult::Created => {
                writeln!(&mut out, "  {} - {}", path.display().to_string().cyan(), desc).unwrap();
            }
            WriteResult::Overwritten => {
                writeln!(&mut out, "  {} {} (overwritten)", "↻".blue(), path.display()).unwrap();
            }
            WriteResult::Skipped => {
                writeln!(
                    &mut out,
                    "  {} {} (already exists, use --force to overwrite)",
                    "⊘".yellow(),
                    path.display()
                )
                .unwrap();
            }
        }
    }

    writeln!(&mut out, "\n{}", "Next steps:".yellow().bold()).unwrap();
    writeln!(
        &mut out,
        "  1. Export the API key named in {}",
        CONFIG_FILE.cyan()
    )
    .unwrap();
    writeln!(
        &mut out,
        "  2. Try a tool: {}",
        "swe-grep tool grep registerCommand".green()
    )
    .unwrap();
    writeln!(
        &mut out,
        "  3. Run rollouts: {}",
        "swe-grep run --dataset questions.jsonl".green()
    )
    .unwrap();

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[test]
    fn test_config_template_parses_to_defaults() {
        let config: Config = toml::from_str(templates::SWE_GREP_TOML).unwrap();
        assert_eq!(config.sandbox.max_setup_retries, 3);
        assert_eq!(config.rollout.max_turns, 5);
    }

    #[test]
    fn test_example_dataset_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.jsonl");
        fs::write(&path, templates::QUESTIONS_JSONL).unwrap();

        let questions = crate::rollout::load_questions(&path).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_init_project_creates_files() {
        let files = init_files();
        let written = RefCell::new(HashMap::new());

        let results = init_project(&files, false, |_| false, |path, content| {
            written
                .borrow_mut()
                .insert(path.to_path_buf(), content.to_string());
            Ok(())
        })
        .unwrap();

        assert!(results.iter().all(|(_, r)| *r == WriteResult::Created));
        assert_eq!(written.borrow().len(), files.len());
        assert!(written.borrow().contains_key(Path::new(CONFIG_FILE)));
    }

    #[test]
    fn test_init_project_skips_existing_without_force() {
        let files = init_files();
        let mut writes = 0;

        let results = init_project(&files, false, |_| true, |_, _| {
            writes += 1;
            Ok(())
        })
        .unwrap();

        assert!(results.iter().all(|(_, r)| *r == WriteResult::Skipped));
        assert_eq!(writes, 0);
    }

    #[test]
    fn test_init_project_mixed_with_force() {
        let files = init_files();

        let results = init_project(
            &files,
            true,
            |path| path == Path::new(CONFIG_FILE),
            |_, _| Ok(()),
        )
        .unwrap();

        assert_eq!(results[0].1, WriteResult::Overwritten);
        assert_eq!(results[1].1, WriteResult::Created);
    }

    #[test]
    fn test_format_results_mentions_skips() {
        colored::control::set_override(false);
        let files = init_files();
        let results = vec![(PathBuf::from(CONFIG_FILE), WriteResult::Skipped)];

        let out = format_results(&results, &files);

        assert!(out.contains("swe-grep.toml (already exists, use --force to overwrite)"));
        assert!(out.contains("Next steps:"));
    }
}
