//! Append-only logs recording which athletes a run has already handled.
//!
//! `processed` holds one profile id per line. `failed` holds
//! `profile_id: error message` per line. Both are read in full at startup
//! and only ever appended to.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct Checkpoint {
    processed_path: PathBuf,
    failed_path: PathBuf,
    processed: HashSet<String>,
    failed: HashSet<String>,
    retry_failed: bool,
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading checkpoint log {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening checkpoint log {}", path.display()))?;
    writeln!(file, "{line}")
        .with_context(|| format!("appending to checkpoint log {}", path.display()))?;
    file.flush()?;
    Ok(())
}

/// Flattens an error message onto one line so the log stays line-oriented.
fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Checkpoint {
    /// Reads both logs. With `retry_failed`, athletes in the failed log are not
    /// skipped.
    pub fn load(processed_path: &Path, failed_path: &Path, retry_failed: bool) -> Result<Self> {
        let processed: HashSet<String> = read_lines(processed_path)?.into_iter().collect();
        let failed: HashSet<String> = read_lines(failed_path)?
            .into_iter()
            .filter_map(|line| line.split_once(':').map(|(id, _)| id.trim().to_string()))
            .filter(|id| !id.is_empty())
            .collect();

        info!(
            processed = processed.len(),
            failed = failed.len(),
            retry_failed,
            "Checkpoint loaded"
        );

        Ok(Self {
            processed_path: processed_path.to_path_buf(),
            failed_path: failed_path.to_path_buf(),
            processed,
            failed,
            retry_failed,
        })
    }

    /// Whether `athlete_id` was handled by an earlier run.
    pub fn should_skip(&self, athlete_id: &str) -> bool {
        self.processed.contains(athlete_id)
            || (!self.retry_failed && self.failed.contains(athlete_id))
    }

    /// Records a `DONE` or `SKIPPED` athlete.
    pub fn record_processed(&mut self, athlete_id: &str) -> Result<()> {
        append_line(&self.processed_path, athlete_id)?;
        self.processed.insert(athlete_id.to_string());
        debug!(athlete_id, "Checkpoint: processed");
        Ok(())
    }

    /// Records a `FAILED` athlete together with the reason.
    pub fn record_failed(&mut self, athlete_id: &str, message: &str) -> Result<()> {
        append_line(
            &self.failed_path,
            &format!("{athlete_id}: {}", single_line(message)),
        )?;
        self.failed.insert(athlete_id.to_string());
        debug!(athlete_id, "Checkpoint: failed");
        Ok(())
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Deletes both logs. Returns the paths that existed.
pub fn clear(processed_path: &Path, failed_path: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = vec![];
    for path in [processed_path, failed_path] {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing checkpoint log {}", path.display()))?;
            info!(path = %path.display(), "Cleared checkpoint log");
            removed.push(path.to_path_buf());
        }
    }
    Ok(removed)
}
