//! Embedded templates for `swe-grep init`.

/// Default `swe-grep.toml` configuration.
pub(crate) const SWE_GREP_TOML: &str = include_str!("swe-grep.toml");

/// Example dataset in the JSONL format `swe-grep run` reads.
pub(crate) const QUESTIONS_JSONL: &str = include_str!("questions.jsonl");
