mod common;

use common::{MockSource, cmj_payload, population, profile, summary, test_config};
use forceplate_ingest::config::BaselinePolicy;
use forceplate_ingest::output::CsvSink;
use forceplate_ingest::pipeline::{self, PipelineError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn sink(dir: &tempfile::TempDir) -> CsvSink {
    CsvSink::new(dir.path().join("out"))
}

fn read_scores(path: &std::path::Path) -> Vec<f64> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let idx = headers
        .iter()
        .position(|h| h == "cmj_composite_score")
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap()[idx].parse::<f64>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_run_scores_population_and_writes_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sink = CsvSink::new(dir.path().join("out"));
    let source = Arc::new(population());

    let summary = pipeline::run(source.clone(), source.clone(), &sink, &config)
        .await
        .unwrap();

    assert_eq!(summary.athletes_total, 4);
    assert_eq!(summary.athletes_done, 3);
    assert_eq!(summary.athletes_skipped, 1);
    assert_eq!(summary.athletes_failed, 0);
    assert_eq!(summary.tests_processed, 5);
    assert_eq!(summary.tests_discarded, 0);
    assert_eq!(summary.rows_written, 5);

    assert!(!source.result_calls().contains(&"p1-ppu-1".to_string()));

    let scores = read_scores(&dir.path().join("out/cmj_results.csv"));
    assert_eq!(scores.len(), 5);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(min, 50.0);
    assert_eq!(max, 100.0);

    let processed = std::fs::read_to_string(&config.processed_log).unwrap();
    let mut ids: Vec<_> = processed.lines().collect();
    ids.sort();
    assert_eq!(ids, vec!["p1", "p2", "p3", "p4"]);
}

#[tokio::test]
async fn test_resumed_run_makes_no_calls_for_handled_athletes() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sink = CsvSink::new(dir.path().join("out"));

    let first = Arc::new(population());
    pipeline::run(first.clone(), first, &sink, &config)
        .await
        .unwrap();

    let second = Arc::new(population());
    let summary = pipeline::run(second.clone(), second.clone(), &sink, &config)
        .await
        .unwrap();

    assert_eq!(summary.athletes_resumed, 4);
    assert_eq!(summary.athletes_done, 0);
    assert_eq!(summary.rows_written, 0);
    assert!(second.list_tests_calls().is_empty());
    assert!(second.result_calls().is_empty());
}

#[tokio::test]
async fn test_fixed_baseline_only_touches_new_athletes() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");
    let sink = CsvSink::new(dir.path().join("out"));

    let mut config = test_config(dir.path());
    config.save_baseline = Some(baseline_path.clone());
    let first = Arc::new(population());
    pipeline::run(first.clone(), first, &sink, &config)
        .await
        .unwrap();
    assert!(baseline_path.exists());

    let mut source = population();
    source.add_athlete(
        profile("p5", "Barbara", "Liskov"),
        vec![(summary("p5-cmj-1", "CMJ", 5), cmj_payload(&[1.0, 1.01]))],
    );
    let second = Arc::new(source);
    config.save_baseline = None;
    config.baseline = BaselinePolicy::Fixed(baseline_path);

    let summary = pipeline::run(second.clone(), second.clone(), &sink, &config)
        .await
        .unwrap();

    assert_eq!(summary.athletes_resumed, 4);
    assert_eq!(summary.athletes_done, 1);
    assert_eq!(summary.rows_written, 1);
    assert_eq!(second.list_tests_calls(), vec!["p5".to_string()]);
    assert_eq!(second.result_calls(), vec!["p5-cmj-1".to_string()]);
}

#[tokio::test]
async fn test_unauthorized_fails_only_that_athlete() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    let sink = CsvSink::new(dir.path().join("out"));

    let mut source = population();
    source.unauthorized_tests.insert("p2-cmj-1".to_string());
    let source = Arc::new(source);

    let summary = pipeline::run(source.clone(), source.clone(), &sink, &config)
        .await
        .unwrap();

    assert_eq!(summary.athletes_failed, 1);
    assert_eq!(summary.athletes_done, 2);
    assert_eq!(summary.athletes_skipped, 1);
    assert!(source.token_calls.load(Ordering::SeqCst) >= 2);

    let failed = std::fs::read_to_string(&config.failed_log).unwrap();
    assert!(failed.starts_with("p2: "));
    assert!(failed.contains("401"));

    // Without --retry-failed the failed athlete stays skipped.
    let again = Arc::new(population());
    let summary = pipeline::run(again.clone(), again, &sink, &config)
        .await
        .unwrap();
    assert_eq!(summary.athletes_resumed, 4);

    config.retry_failed = true;
    let retry = Arc::new(population());
    let summary = pipeline::run(retry.clone(), retry, &sink, &config)
        .await
        .unwrap();
    assert_eq!(summary.athletes_resumed, 3);
    assert_eq!(summary.athletes_done, 1);
    assert_eq!(summary.rows_written, 1);
}

#[tokio::test]
async fn test_empty_population_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sink = CsvSink::new(dir.path().join("out"));

    let mut source = MockSource::default();
    source.add_athlete(profile("p1", "Ada", "Lovelace"), vec![]);
    source.add_athlete(profile("p2", "Grace", "Hopper"), vec![]);
    let source = Arc::new(source);

    let err = pipeline::run(source.clone(), source, &sink, &config)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::NoBaseline(_))
    ));
    assert!(!config.processed_log.exists());
    assert!(!dir.path().join("out/cmj_results.csv").exists());
}

#[tokio::test]
async fn test_timed_out_test_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.fetch_timeout = Duration::from_millis(100);
    let sink = CsvSink::new(dir.path().join("out"));

    let mut source = population();
    source.slow_tests.insert("p3-cmj-2".to_string());
    let source = Arc::new(source);

    let summary = pipeline::run(source.clone(), source, &sink, &config)
        .await
        .unwrap();

    assert_eq!(summary.athletes_done, 3);
    assert_eq!(summary.athletes_failed, 0);
    assert_eq!(summary.tests_processed, 4);
}

#[tokio::test]
async fn test_outlier_gate_discards_whole_test() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");
    let sink = CsvSink::new(dir.path().join("out"));

    let mut config = test_config(dir.path());
    config.save_baseline = Some(baseline_path.clone());
    let first = Arc::new(population());
    pipeline::run(first.clone(), first, &sink, &config)
        .await
        .unwrap();

    let with_outlier = || {
        let mut source = population();
        source.add_athlete(
            profile("p5", "Barbara", "Liskov"),
            vec![(summary("p5-cmj-1", "CMJ", 5), cmj_payload(&[3.0, 2.9]))],
        );
        Arc::new(source)
    };

    config.save_baseline = None;
    config.baseline = BaselinePolicy::Fixed(baseline_path.clone());
    let source = with_outlier();
    let summary = pipeline::run(source.clone(), source, &sink, &config)
        .await
        .unwrap();
    assert_eq!(summary.tests_discarded, 1);
    assert_eq!(summary.athletes_skipped, 1);
    assert_eq!(summary.rows_written, 0);

    // Same data with the gate disabled keeps the test.
    let fresh = tempfile::tempdir().unwrap();
    let mut keep = test_config(fresh.path());
    keep.baseline = BaselinePolicy::Fixed(baseline_path);
    keep.reject_outlier_tests = false;
    let source = with_outlier();
    let summary = pipeline::run(
        source.clone(),
        source,
        &CsvSink::new(fresh.path().join("out")),
        &keep,
    )
    .await
    .unwrap();
    assert_eq!(summary.tests_discarded, 0);
    assert_eq!(summary.rows_written, 6);
}

/// An athlete with `tests` CMJ tests, all scoring near the population.
fn busy_athlete(source: &mut common::MockSource, id: &str, tests: u32) {
    let tests = (0..tests)
        .map(|i| {
            let factor = 1.0 + f64::from(i) * 0.01;
            (
                summary(&format!("{id}-cmj-{i}"), "CMJ", 10 + i),
                cmj_payload(&[factor, factor - 0.02]),
            )
        })
        .collect();
    source.add_athlete(profile(id, "Barbara", "Liskov"), tests);
}

#[tokio::test]
async fn test_worker_pools_bound_concurrent_fetches() {
    for workers in [1, 2] {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.max_in_flight = 8;
        config.test_workers = workers;
        config.sampling.workers = workers;

        let mut source = population();
        busy_athlete(&mut source, "p5", 6);
        source.result_delay = Duration::from_millis(20);
        let source = Arc::new(source);

        let summary = pipeline::run(source.clone(), source.clone(), &sink(&dir), &config)
            .await
            .unwrap();

        assert_eq!(summary.tests_processed, 11);
        assert_eq!(source.peak_in_flight.load(Ordering::SeqCst), workers);
    }
}

#[tokio::test]
async fn test_sample_cap_stops_listing_tests() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.sampling.workers = 1;
    config.sampling.cap = Some(2);
    let source = Arc::new(population());

    let stats = pipeline::build_baseline(source.clone(), source.clone(), &config)
        .await
        .unwrap();

    assert_eq!(stats.sample_tests, 2);
    assert_eq!(source.list_tests_calls(), vec!["p1".to_string()]);
    assert_eq!(
        source.result_calls(),
        vec!["p1-cmj-1".to_string(), "p1-cmj-2".to_string()]
    );
}
