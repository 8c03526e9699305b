use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use crate::config::load_config;
use crate::service::{BackupService, CommitReport};

const DONE: &str = "\x1b[32m✔\x1b[0m";
const FAILED: &str = "\x1b[31m✘\x1b[0m";

// Yellow braille spinner while the backup runs.
fn running_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Replaces the spinner with a fixed `mark` once the backup is over.
fn finished_style(mark: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!("{} {{wide_msg}}", mark))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Read a batch document from `input`, or from stdin when it is `-`.
fn read_batch(input: &Path) -> Result<Value> {
    let txt = if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read batch from stdin")?;
        buf
    } else {
        fs::read_to_string(input)
            .with_context(|| format!("batch not found: {}", input.display()))?
    };
    serde_json::from_str(&txt).context("batch is not valid JSON")
}

/// CLI command: mirror one batch of records and push it.
///
/// The input must look like:
/// ```json
/// {"records": [{"id": "lb1", "data": {"name": "x"}}]}
/// ```
///
/// Example output:
/// ```text
/// ✔ pushed 3f2a9c01d4e7 to main (2 staged, 0 skipped)
/// ```
///
/// # Errors
/// - The configuration or the batch cannot be read.
/// - Any fatal backup error; records that failed to stage are listed but
///   do not fail the command.
pub fn cmd_commit(config: Option<&Path>, input: &Path) -> Result<()> {
    let cfg = load_config(config)?;
    let batch = read_batch(input)?;
    let svc = BackupService::new(cfg);

    let pb = ProgressBar::new_spinner();
    pb.set_style(running_style());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(format!(
        "mirroring {} into {}",
        input.display(),
        svc.config().local_repo_path.display()
    ));

    match svc.commit(&batch) {
        Ok(CommitReport::Disabled) => {
            pb.set_style(finished_style(DONE));
            pb.finish_with_message("backup disabled; nothing to do");
            Ok(())
        }
        Ok(CommitReport::Published {
            write,
            commit,
            branch,
        }) => {
            let short = commit.get(..12).unwrap_or(commit.as_str());
            pb.set_style(finished_style(DONE));
            pb.finish_with_message(format!(
                "pushed {} to {} ({} staged, {} skipped)",
                short,
                branch,
                write.staged.len(),
                write.skipped.len()
            ));
            if !write.is_complete() {
                for s in &write.skipped {
                    eprintln!("  skipped {}: {}", s.id, s.reason);
                }
            }
            Ok(())
        }
        Err(e) => {
            pb.set_style(finished_style(FAILED));
            pb.finish_with_message(format!("backup failed: {}", e));
            Err(e).context("backup failed")
        }
    }
}
