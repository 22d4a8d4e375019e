use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, warn};

use super::PipelineError;
use super::gateway::ResilientSource;
use crate::analyzers::table::MetricTable;
use crate::analyzers::types::TestType;
use crate::analyzers::weights::CompositeWeights;
use crate::config::{PipelineConfig, SamplingConfig};
use crate::parser::{extract_table, parse_payload};
use crate::services::source_api::{Profile, TestSummary};
use crate::stats::PopulationStats;

/// Every `stride`-th profile, starting with the first.
pub fn sample_profiles<'a>(profiles: &'a [Profile], sampling: &SamplingConfig) -> Vec<&'a Profile> {
    profiles.iter().step_by(sampling.stride.max(1)).collect()
}

/// Whether a summary's tag names `test_type`.
pub fn is_test_type(summary: &TestSummary, test_type: TestType) -> bool {
    summary.test_type.trim().eq_ignore_ascii_case(test_type.tag())
}

/// Samples tests across the population and builds the scoring baseline.
///
/// Test lists and payloads are fetched through a small worker pool. Once the
/// sample cap is reached no further test lists are requested. Failures for a
/// single athlete or test only shrink the sample; an empty baseline is fatal.
#[tracing::instrument(skip_all, fields(test_type = %config.test_type, profiles = profiles.len()))]
pub async fn build_population_stats(
    api: Arc<ResilientSource>,
    profiles: &[Profile],
    config: &PipelineConfig,
) -> Result<PopulationStats, PipelineError> {
    let test_type = config.test_type;
    let sampling = &config.sampling;
    let sampled = sample_profiles(profiles, sampling);
    info!(
        sampled = sampled.len(),
        stride = sampling.stride,
        cap = ?sampling.cap,
        "Sampling population"
    );

    let semaphore = Arc::new(Semaphore::new(sampling.workers.max(1)));
    let listed = Arc::new(AtomicUsize::new(0));
    let cap = sampling.cap;

    let mut tasks = vec![];
    for profile in sampled {
        let sem = semaphore.clone();
        let api = api.clone();
        let listed = listed.clone();
        let profile_id = profile.profile_id.clone();
        let since = config.since;
        let span = info_span!("sample_tests", athlete_id = %profile_id);

        tasks.push(tokio::spawn(
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return vec![];
                };
                if cap.is_some_and(|cap| listed.load(Ordering::SeqCst) >= cap) {
                    debug!("Sample cap reached");
                    return vec![];
                }
                match api.list_tests(&profile_id, since).await {
                    Ok(tests) => {
                        let ids: Vec<_> = tests
                            .into_iter()
                            .filter(|t| is_test_type(t, test_type))
                            .map(|t| t.test_id)
                            .collect();
                        listed.fetch_add(ids.len(), Ordering::SeqCst);
                        ids
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping athlete in population sample");
                        vec![]
                    }
                }
            }
            .instrument(span),
        ));
    }

    let mut test_ids = vec![];
    for task in tasks {
        match task.await {
            Ok(ids) => test_ids.extend(ids),
            Err(e) => warn!(error = %e, "Sampling task panicked"),
        }
    }
    if let Some(cap) = cap {
        test_ids.truncate(cap);
    }
    info!(tests = test_ids.len(), "Fetching sampled tests");

    let mut tasks = vec![];
    for test_id in test_ids {
        let sem = semaphore.clone();
        let api = api.clone();
        let span = info_span!("sample_payload", test_id = %test_id);

        tasks.push(tokio::spawn(
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return None;
                };
                let bytes = match api.get_test_results(&test_id).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Skipping test in population sample");
                        return None;
                    }
                };
                match parse_payload(&bytes) {
                    Ok(trials) => Some(extract_table(&trials)),
                    Err(e) => {
                        warn!(error = %e, "Unparseable payload in population sample");
                        None
                    }
                }
            }
            .instrument(span),
        ));
    }

    let mut tables: Vec<MetricTable> = vec![];
    for task in tasks {
        match task.await {
            Ok(Some(table)) if !table.is_empty() => tables.push(table),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Sampling task panicked"),
        }
    }
    debug!(tables = tables.len(), "Sample payloads extracted");

    stats_from_sample(test_type, &tables)
}

/// Builds the baseline from extracted sample tables, failing when nothing
/// usable remains.
pub fn stats_from_sample(
    test_type: TestType,
    tables: &[MetricTable],
) -> Result<PopulationStats, PipelineError> {
    if tables.is_empty() {
        return Err(PipelineError::NoBaseline(
            "the population sample yielded no usable tests".to_string(),
        ));
    }

    let weights = CompositeWeights::for_test_type(test_type);
    let stats = PopulationStats::from_tables(test_type, &weights, tables);
    if stats.is_empty() || stats.sample_tests == 0 {
        return Err(PipelineError::NoBaseline(format!(
            "no weighted {test_type} metric had observations in {} sampled tests",
            tables.len()
        )));
    }

    info!(
        sample_tests = stats.sample_tests,
        metrics = stats.metrics.len(),
        "Population baseline built"
    );
    Ok(stats)
}
