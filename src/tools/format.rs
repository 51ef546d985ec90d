//! Normalizes raw command output into what the agent sees.

use std::fmt::Write;

use super::command::{ReadWindow, MAX_GREP_LINES};

/// Longest search result line kept before it is cut with `...`.
pub(crate) const MAX_LINE_CHARS: usize = 300;

pub(crate) fn format_grep(stdout: &str) -> String {
    let output = stdout.trim();
    if output.is_empty() {
        return "No matches found.".to_string();
    }

    let lines: Vec<String> = output.split('\n').map(truncate_line).collect();
    if lines.len() > MAX_GREP_LINES {
        return format!(
            "{}\n\n[TRUNCATED - results exceed {MAX_GREP_LINES} lines. Narrow your search with a more specific pattern or file_pattern]",
            lines[..MAX_GREP_LINES].join("\n")
        );
    }
    lines.join("\n")
}

fn truncate_line(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

pub(crate) fn format_list(stdout: &str) -> String {
    let output = stdout.trim();
    if output.is_empty() {
        "Empty directory.".to_string()
    } else {
        output.to_string()
    }
}

/// Renders a ranged read. `stdout` holds up to one line past the window.
pub(crate) fn format_read(path: &str, window: ReadWindow, stdout: &str, stderr: &str) -> String {
    if stdout.trim().is_empty() {
        if stderr.contains("No such file") {
            return format!("File not found: {path}");
        }
        return format!(
            "No content at lines {}-{} (file may be shorter or not exist)",
            window.start,
            window.end()
        );
    }

    let lines: Vec<&str> = stdout.lines().collect();
    let limit = usize::try_from(window.count).unwrap_or(usize::MAX);
    let has_more = lines.len() > limit;
    let shown = &lines[..lines.len().min(limit)];

    let mut out = String::new();
    if has_more {
        write!(out, "Lines {}-{} of {path}:\n{}", window.start, window.end(), shown.join("\n")).unwrap();
        write!(
            out,
            "\n\n[MORE CONTENT BELOW - use start_line={} to continue]",
            window.probe()
        )
        .unwrap();
    } else {
        #[allow(clippy::cast_possible_truncation)]
        let last = window.start + shown.len() as u64 - 1;
        write!(out, "Lines {}-{last} of {path}:\n{}", window.start, shown.join("\n")).unwrap();
    }
    out
}
