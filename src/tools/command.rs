//! Shell commands behind each tool.

use super::{GrepArgs, ReadArgs};

/// Most result lines a search returns; `head` keeps one more to detect overflow.
pub(crate) const MAX_GREP_LINES: usize = 50;
/// Largest context window a search may request.
pub(crate) const MAX_CONTEXT_LINES: i64 = 5;
/// Largest window a single read may request.
pub(crate) const MAX_READ_LINES: u64 = 50;

/// Line window of a ranged read, 1-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadWindow {
    pub start: u64,
    pub count: u64,
}

impl ReadWindow {
    /// Clamps the requested window to `1..` and at most [`MAX_READ_LINES`] lines.
    pub fn new(start_line: i64, num_lines: i64) -> Self {
        let start = u64::try_from(start_line.max(1)).unwrap_or(1);
        let count = u64::try_from(num_lines.max(1))
            .unwrap_or(1)
            .min(MAX_READ_LINES);
        Self { start, count }
    }

    /// Last line of the window.
    pub fn end(self) -> u64 {
        self.start + self.count - 1
    }

    /// Line read past the window to detect more content.
    pub fn probe(self) -> u64 {
        self.end() + 1
    }
}

/// Ripgrep glob for a file filter. A bare extension like `.ts` becomes `*.ts`.
pub(crate) fn normalize_glob(file_pattern: &str) -> String {
    if file_pattern.starts_with('.') {
        format!("*{file_pattern}")
    } else {
        file_pattern.to_string()
    }
}

pub(crate) fn grep_command(args: &GrepArgs, path: &str) -> String {
    let mut flags = vec!["-n".to_string(), "--max-filesize".to_string(), "100K".to_string()];

    let context = args.context_lines.clamp(0, MAX_CONTEXT_LINES);
    if context > 0 {
        flags.push("-C".to_string());
        flags.push(context.to_string());
    }
    if args.case_insensitive {
        flags.push("-i".to_string());
    }
    if !args.file_pattern.is_empty() {
        flags.push("-g".to_string());
        flags.push(shell_words::quote(&normalize_glob(&args.file_pattern)).into_owned());
    }

    format!(
        "rg {} {} {} 2>&1 | head -{}",
        flags.join(" "),
        shell_words::quote(&args.pattern),
        shell_words::quote(path),
        MAX_GREP_LINES + 1
    )
}

pub(crate) fn list_command(path: &str) -> String {
    format!("ls -la {}", shell_words::quote(path))
}

pub(crate) fn read_command(args: &ReadArgs) -> (String, ReadWindow) {
    let window = ReadWindow::new(args.start_line, args.num_lines);
    let command = format!(
        "sed -n '{},{}p' {}",
        window.start,
        window.probe(),
        shell_words::quote(&args.file_path)
    );
    (command, window)
}
