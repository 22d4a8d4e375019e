use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, warn};

use super::assemble::assemble_records;
use super::gateway::ResilientSource;
use super::population::is_test_type;
use crate::analyzers::composite::{best_trial, outlier_metric};
use crate::analyzers::types::{BestTrial, TestResult, TestType};
use crate::analyzers::weights::CompositeWeights;
use crate::fetch::{ApiError, FailureClass};
use crate::parser::{extract_table, parse_payload};
use crate::services::source_api::{Profile, TestSummary};
use crate::stats::PopulationStats;

/// Lifecycle of one athlete within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AthleteState {
    Pending,
    FetchingTests,
    ProcessingTests,
    Skipped,
    Done,
    Failed,
}

impl fmt::Display for AthleteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AthleteState::Pending => "PENDING",
            AthleteState::FetchingTests => "FETCHING_TESTS",
            AthleteState::ProcessingTests => "PROCESSING_TESTS",
            AthleteState::Skipped => "SKIPPED",
            AthleteState::Done => "DONE",
            AthleteState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Terminal result of processing one athlete.
#[derive(Debug)]
pub enum AthleteOutcome {
    Skipped {
        reason: &'static str,
        tests_discarded: usize,
    },
    Done {
        records: Vec<TestResult>,
        tests_discarded: usize,
    },
    Failed {
        error: String,
    },
}

impl AthleteOutcome {
    pub fn state(&self) -> AthleteState {
        match self {
            AthleteOutcome::Skipped { .. } => AthleteState::Skipped,
            AthleteOutcome::Done { .. } => AthleteState::Done,
            AthleteOutcome::Failed { .. } => AthleteState::Failed,
        }
    }
}

/// What happened to a single test.
#[derive(Debug)]
enum TestOutcome {
    Scored(Box<(TestSummary, BestTrial)>),
    /// Dropped by the outlier gate.
    Discarded,
    /// No payload, no usable trial, or a per-test fetch failure.
    Skipped,
}

/// Everything the per-athlete workers share.
pub struct AthleteContext {
    pub api: Arc<ResilientSource>,
    pub baseline: Arc<PopulationStats>,
    pub test_type: TestType,
    pub since: DateTime<Utc>,
    pub test_workers: usize,
    pub reject_outlier_tests: bool,
}

/// Runs one athlete from `PENDING` to a terminal state.
///
/// Test payloads are fetched by a bounded pool of workers. A 401 that
/// survives the token refresh fails the whole athlete; every other per-test
/// failure only skips that test.
pub async fn process_athlete(ctx: &AthleteContext, profile: &Profile) -> AthleteOutcome {
    debug!(state = %AthleteState::Pending);

    debug!(state = %AthleteState::FetchingTests);
    let tests = match ctx.api.list_tests(&profile.profile_id, ctx.since).await {
        Ok(tests) => tests,
        Err(e) => {
            return AthleteOutcome::Failed {
                error: format!("listing tests: {e}"),
            };
        }
    };

    let tests: Vec<TestSummary> = tests
        .into_iter()
        .filter(|t| is_test_type(t, ctx.test_type))
        .collect();
    if tests.is_empty() {
        return AthleteOutcome::Skipped {
            reason: "no tests",
            tests_discarded: 0,
        };
    }

    debug!(state = %AthleteState::ProcessingTests, tests = tests.len());
    let semaphore = Arc::new(Semaphore::new(ctx.test_workers.max(1)));
    let mut tasks = vec![];

    for summary in tests {
        let sem = semaphore.clone();
        let api = ctx.api.clone();
        let baseline = ctx.baseline.clone();
        let test_type = ctx.test_type;
        let reject_outliers = ctx.reject_outlier_tests;
        let span = info_span!("process_test", test_id = %summary.test_id);

        tasks.push(tokio::spawn(
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return Ok(TestOutcome::Skipped);
                };
                process_test(&api, &baseline, test_type, reject_outliers, summary).await
            }
            .instrument(span),
        ));
    }

    let mut scored = vec![];
    let mut discarded = 0;
    let mut escalation: Option<String> = None;

    for task in tasks {
        match task.await {
            Ok(Ok(TestOutcome::Scored(pair))) => scored.push(*pair),
            Ok(Ok(TestOutcome::Discarded)) => discarded += 1,
            Ok(Ok(TestOutcome::Skipped)) => {}
            Ok(Err(e)) => {
                escalation.get_or_insert_with(|| e.to_string());
            }
            Err(e) => {
                escalation.get_or_insert_with(|| format!("test worker panicked: {e}"));
            }
        }
    }

    if let Some(error) = escalation {
        return AthleteOutcome::Failed { error };
    }

    if scored.is_empty() {
        return AthleteOutcome::Skipped {
            reason: "no scorable tests",
            tests_discarded: discarded,
        };
    }

    AthleteOutcome::Done {
        records: assemble_records(profile, ctx.test_type, scored),
        tests_discarded: discarded,
    }
}

/// Fetches, extracts and scores one test. Only an authorization failure that
/// outlived the token refresh is returned as an error.
async fn process_test(
    api: &ResilientSource,
    baseline: &PopulationStats,
    test_type: TestType,
    reject_outliers: bool,
    summary: TestSummary,
) -> Result<TestOutcome, ApiError> {
    let bytes = match api.get_test_results(&summary.test_id).await {
        Ok(bytes) => bytes,
        Err(e) if e.class() == FailureClass::AuthExpired => return Err(e),
        Err(e) if e.class() == FailureClass::Timeout => {
            warn!("Test fetch timed out, skipping");
            return Ok(TestOutcome::Skipped);
        }
        Err(e) => {
            warn!(error = %e, "Test fetch failed, skipping");
            return Ok(TestOutcome::Skipped);
        }
    };

    let trials = match parse_payload(&bytes) {
        Ok(trials) => trials,
        Err(e) => {
            warn!(error = %e, "Unparseable payload, skipping");
            return Ok(TestOutcome::Skipped);
        }
    };
    let table = extract_table(&trials);
    let weights = CompositeWeights::for_test_type(test_type);

    let Some(best) = best_trial(&table, &weights, baseline) else {
        debug!(trials = table.trial_count(), "No valid trial");
        return Ok(TestOutcome::Skipped);
    };

    if reject_outliers {
        if let Some(metric) = outlier_metric(&best, &weights, baseline) {
            info!(metric, "Best trial beyond outlier band, discarding test");
            return Ok(TestOutcome::Discarded);
        }
    }

    debug!(
        best_trial = best.trial_number(),
        score = best.score,
        "Test scored"
    );
    Ok(TestOutcome::Scored(Box::new((summary, best))))
}
