//! The resilient ingestion pipeline.
//!
//! population sampling → per-athlete test discovery → per-test fetch →
//! extraction → scoring → record assembly → one batch write.
//!
//! Athletes are processed one at a time; only the tests of a single athlete
//! are fetched in parallel. Every athlete reaching a terminal state is
//! appended to the checkpoint logs before the next one starts.

pub mod assemble;
pub mod athlete;
pub mod gateway;
pub mod population;

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use crate::analyzers::band::rescale;
use crate::analyzers::types::TestResult;
use crate::checkpoint::Checkpoint;
use crate::config::{BaselinePolicy, PipelineConfig};
use crate::fetch::auth::CredentialBroker;
use crate::fetch::{ApiError, RateGovernor};
use crate::output::{Sink, TableSchema};
use crate::services::source_api::{Profile, TestSource, TokenSource};
use crate::stats::PopulationStats;
use athlete::{AthleteContext, AthleteOutcome, process_athlete};
use gateway::ResilientSource;
use population::build_population_stats;

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no population baseline: {0}")]
    NoBaseline(String),
    #[error("baseline is for {found}, run is for {expected}")]
    BaselineMismatch { expected: String, found: String },
    #[error("listing profiles failed: {0}")]
    Profiles(#[source] ApiError),
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub athletes_total: usize,
    /// Skipped because an earlier run already handled them.
    pub athletes_resumed: usize,
    pub athletes_done: usize,
    pub athletes_skipped: usize,
    pub athletes_failed: usize,
    pub tests_processed: usize,
    pub tests_discarded: usize,
    pub rows_written: usize,
}

/// Wires the source, credential broker and rate governor from `config`.
pub fn resilient_source(
    source: Arc<dyn TestSource>,
    tokens: Arc<dyn TokenSource>,
    config: &PipelineConfig,
) -> ResilientSource {
    ResilientSource::new(
        source,
        CredentialBroker::new(tokens, config.token_refresh_interval),
        RateGovernor::new(config.min_request_interval, config.max_in_flight),
        config.retry.clone(),
        config.fetch_timeout,
    )
}

async fn list_profiles(api: &ResilientSource) -> Result<Vec<Profile>, PipelineError> {
    let profiles = api.list_profiles().await.map_err(PipelineError::Profiles)?;
    info!(profiles = profiles.len(), "Profiles fetched");
    Ok(profiles)
}

/// Resolves the baseline according to the configured policy and persists it
/// when asked to.
async fn resolve_baseline(
    api: Arc<ResilientSource>,
    profiles: &[Profile],
    config: &PipelineConfig,
) -> Result<PopulationStats> {
    let stats = match &config.baseline {
        BaselinePolicy::Recompute => build_population_stats(api, profiles, config).await?,
        BaselinePolicy::Fixed(path) => {
            let stats = PopulationStats::load(path)?;
            if stats.test_type != config.test_type {
                return Err(PipelineError::BaselineMismatch {
                    expected: config.test_type.to_string(),
                    found: stats.test_type.to_string(),
                }
                .into());
            }
            if stats.is_empty() {
                return Err(PipelineError::NoBaseline(format!(
                    "{} holds no metrics",
                    path.display()
                ))
                .into());
            }
            info!(path = %path.display(), metrics = stats.metrics.len(), "Using fixed baseline");
            stats
        }
    };

    if let Some(path) = &config.save_baseline {
        stats.save(path)?;
    }
    Ok(stats)
}

/// Builds the population baseline without scoring anything.
#[tracing::instrument(skip_all, fields(test_type = %config.test_type))]
pub async fn build_baseline(
    source: Arc<dyn TestSource>,
    tokens: Arc<dyn TokenSource>,
    config: &PipelineConfig,
) -> Result<PopulationStats> {
    let api = Arc::new(resilient_source(source, tokens, config));
    let profiles = list_profiles(&api).await?;
    resolve_baseline(api, &profiles, config).await
}

/// Replaces every record's raw composite score with its position on the
/// reporting band.
pub fn rescale_scores(records: &mut [TestResult]) {
    let raw: Vec<f64> = records.iter().map(|r| r.composite_score).collect();
    for (record, scaled) in records.iter_mut().zip(rescale(&raw)) {
        record.composite_score = scaled;
    }
}

/// Runs the full pipeline and writes the scored batch to `sink`.
#[tracing::instrument(skip_all, fields(test_type = %config.test_type))]
pub async fn run(
    source: Arc<dyn TestSource>,
    tokens: Arc<dyn TokenSource>,
    sink: &dyn Sink,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    let api = Arc::new(resilient_source(source, tokens, config));
    let mut checkpoint = Checkpoint::load(
        &config.processed_log,
        &config.failed_log,
        config.retry_failed,
    )?;

    let profiles = list_profiles(&api).await?;
    let mut summary = RunSummary {
        athletes_total: profiles.len(),
        ..RunSummary::default()
    };

    let pending: Vec<&Profile> = profiles
        .iter()
        .filter(|p| !checkpoint.should_skip(&p.profile_id))
        .collect();
    summary.athletes_resumed = profiles.len() - pending.len();

    if pending.is_empty() {
        info!(
            resumed = summary.athletes_resumed,
            "Every athlete already handled, nothing to do"
        );
        log_summary(&summary);
        return Ok(summary);
    }

    let baseline = Arc::new(resolve_baseline(api.clone(), &profiles, config).await?);

    let ctx = AthleteContext {
        api,
        baseline,
        test_type: config.test_type,
        since: config.since,
        test_workers: config.test_workers,
        reject_outlier_tests: config.reject_outlier_tests,
    };

    let mut records: Vec<TestResult> = vec![];
    let count = pending.len();

    for (i, profile) in pending.into_iter().enumerate() {
        let span = info_span!(
            "process_athlete",
            athlete_id = %profile.profile_id,
            athlete = %profile.full_name(),
            index = i + 1,
            of = count,
        );

        let outcome = process_athlete(&ctx, profile).instrument(span).await;
        let athlete_id = profile.profile_id.as_str();
        info!(athlete_id, state = %outcome.state(), "Athlete finished");

        match outcome {
            AthleteOutcome::Done {
                records: rows,
                tests_discarded,
            } => {
                summary.athletes_done += 1;
                summary.tests_processed += rows.len();
                summary.tests_discarded += tests_discarded;
                records.extend(rows);
                checkpoint.record_processed(athlete_id)?;
            }
            AthleteOutcome::Skipped {
                reason,
                tests_discarded,
            } => {
                info!(athlete_id, reason, "Athlete skipped");
                summary.athletes_skipped += 1;
                summary.tests_discarded += tests_discarded;
                checkpoint.record_processed(athlete_id)?;
            }
            AthleteOutcome::Failed { error } => {
                error!(athlete_id, error = %error, "Athlete failed");
                summary.athletes_failed += 1;
                checkpoint.record_failed(athlete_id, &error)?;
            }
        }

        if i + 1 < count && !config.athlete_pause.is_zero() {
            tokio::time::sleep(config.athlete_pause).await;
        }
    }

    if records.is_empty() {
        warn!("No records produced, nothing written");
    } else {
        rescale_scores(&mut records);
        let schema = TableSchema::for_test_type(config.test_type);
        summary.rows_written = sink
            .append_batch(&schema, &records)
            .await
            .with_context(|| format!("writing batch to {}", schema.name))?;
    }

    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    info!(
        athletes_total = summary.athletes_total,
        athletes_resumed = summary.athletes_resumed,
        athletes_done = summary.athletes_done,
        athletes_skipped = summary.athletes_skipped,
        athletes_failed = summary.athletes_failed,
        tests_processed = summary.tests_processed,
        tests_discarded = summary.tests_discarded,
        rows_written = summary.rows_written,
        "Run summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::TestType;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(score: f64) -> TestResult {
        TestResult {
            result_id: String::new(),
            assessment_id: String::new(),
            athlete_id: String::new(),
            athlete_name: String::new(),
            test_id: String::new(),
            test_type: TestType::Cmj,
            test_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            age_at_test: None,
            best_trial_number: 1,
            composite_score: score,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_rescale_scores_in_place() {
        let mut records = vec![record(10.0), record(30.0), record(20.0)];
        rescale_scores(&mut records);
        let scores: Vec<f64> = records.iter().map(|r| r.composite_score).collect();
        assert_eq!(scores, vec![50.0, 100.0, 75.0]);
    }
}
