//! Remove sandbox containers left behind by interrupted runs.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;
use std::time::Duration;

use crate::config::Config;
use crate::sandbox::DockerSandboxClient;

/// Format the clean results as a displayable string
pub fn format_results(removed: u32) -> String {
    let mut out = String::new();
    if removed == 0 {
        writeln!(&mut out, "\n{} No orphaned sandboxes found.", "ℹ".blue()).unwrap();
    } else {
        let noun = if removed == 1 { "sandbox" } else { "sandboxes" };
        writeln!(
            &mut out,
            "\n{} Removed {} orphaned {}.",
            "✓".green(),
            removed.to_string().bold(),
            noun
        )
        .unwrap();
    }
    out
}

/// Entry point: removes every container carrying the managed label
pub(crate) async fn run(config: &Config) -> Result<()> {
    let client = DockerSandboxClient::connect(Duration::from_secs(
        config.sandbox.creation_timeout_secs,
    ))
    .await
    .context("Failed to connect to the sandbox backend")?;

    let removed = client
        .cleanup_orphaned()
        .await
        .context("Failed to list sandbox containers")?;

    print!("{}", format_results(removed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results_nothing_removed() {
        colored::control::set_override(false);
        assert!(format_results(0).contains("No orphaned sandboxes found."));
    }

    #[test]
    fn test_format_results_pluralizes() {
        colored::control::set_override(false);
        assert!(format_results(1).contains("Removed 1 orphaned sandbox."));
        assert!(format_results(3).contains("Removed 3 orphaned sandboxes."));
    }
}
