#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use forceplate_ingest::config::PipelineConfig;
use forceplate_ingest::fetch::{ApiError, RetryPolicy};
use forceplate_ingest::services::source_api::{Profile, TestSource, TestSummary, TokenSource};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// The weighted CMJ metrics as the source reports them: result, unit and a
/// typical value.
const CMJ_METRICS: &[(&str, &str, f64)] = &[
    ("JUMP_HEIGHT_IMP_MOM", "Centimeter", 35.0),
    ("BODYMASS_RELATIVE_TAKEOFF_POWER", "Watt Per Kilo", 50.0),
    ("RSI_MODIFIED", "RSI_mod", 0.45),
    ("PEAK_CONCENTRIC_FORCE", "Newton", 2000.0),
    ("CONCENTRIC_IMPULSE", "Newton Second", 200.0),
    ("ECCENTRIC_BRAKING_RFD", "Newton Per Second", 6000.0),
    ("CONCENTRIC_DURATION", "Millisecond", 250.0),
];

/// A CMJ results payload with one trial per factor; every metric of trial i
/// is its typical value scaled by `factors[i]`.
pub fn cmj_payload(factors: &[f64]) -> Vec<u8> {
    let trials: Vec<_> = factors
        .iter()
        .map(|f| {
            let results: Vec<_> = CMJ_METRICS
                .iter()
                .map(|(result, unit, typical)| {
                    json!({
                        "value": typical * f,
                        "limb": "Trial",
                        "definition": { "result": result, "unit": unit }
                    })
                })
                .collect();
            json!({ "results": results })
        })
        .collect();
    serde_json::to_vec(&trials).unwrap()
}

pub fn profile(id: &str, given: &str, family: &str) -> Profile {
    Profile {
        profile_id: id.into(),
        given_name: given.into(),
        family_name: family.into(),
        date_of_birth: chrono::NaiveDate::from_ymd_opt(2000, 1, 1),
    }
}

pub fn summary(id: &str, test_type: &str, day: u32) -> TestSummary {
    TestSummary {
        test_id: id.into(),
        test_type: test_type.into(),
        modified_at: at(day),
        recorded_at: None,
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
}

/// In-memory source that counts every call per athlete and per test.
#[derive(Default)]
pub struct MockSource {
    pub profiles: Vec<Profile>,
    /// Profiles missing from this map answer 204.
    pub tests: HashMap<String, Vec<TestSummary>>,
    pub payloads: HashMap<String, Vec<u8>>,
    /// Tests whose results always answer 401.
    pub unauthorized_tests: HashSet<String>,
    /// Tests whose results take longer than any test timeout.
    pub slow_tests: HashSet<String>,
    /// Time every results call takes.
    pub result_delay: Duration,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub list_tests_calls: Mutex<Vec<String>>,
    pub result_calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn list_tests_calls(&self) -> Vec<String> {
        self.list_tests_calls.lock().unwrap().clone()
    }

    pub fn result_calls(&self) -> Vec<String> {
        self.result_calls.lock().unwrap().clone()
    }

    pub fn add_athlete(&mut self, profile: Profile, tests: Vec<(TestSummary, Vec<u8>)>) {
        let id = profile.profile_id.clone();
        self.profiles.push(profile);
        if tests.is_empty() {
            return;
        }
        let mut summaries = vec![];
        for (summary, payload) in tests {
            self.payloads.insert(summary.test_id.clone(), payload);
            summaries.push(summary);
        }
        self.tests.insert(id, summaries);
    }
}

#[async_trait::async_trait]
impl TokenSource for MockSource {
    async fn get_token(&self) -> Result<String, ApiError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }
}

#[async_trait::async_trait]
impl TestSource for MockSource {
    async fn list_profiles(&self, _token: &str) -> Result<Vec<Profile>, ApiError> {
        Ok(self.profiles.clone())
    }

    async fn list_tests(
        &self,
        profile_id: &str,
        _since: DateTime<Utc>,
        _token: &str,
    ) -> Result<Vec<TestSummary>, ApiError> {
        self.list_tests_calls
            .lock()
            .unwrap()
            .push(profile_id.to_string());
        self.tests.get(profile_id).cloned().ok_or(ApiError::NoContent)
    }

    async fn get_test_results(&self, test_id: &str, _token: &str) -> Result<Vec<u8>, ApiError> {
        self.result_calls.lock().unwrap().push(test_id.to_string());
        if self.unauthorized_tests.contains(test_id) {
            return Err(ApiError::Unauthorized);
        }
        if self.slow_tests.contains(test_id) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        } else {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.result_delay.is_zero() {
                tokio::time::sleep(self.result_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.payloads.get(test_id).cloned().ok_or(ApiError::NoContent)
    }
}

/// Four CMJ athletes: three with tests, one with none. `p1` also has a PPU
/// test that a CMJ run must never fetch.
pub fn population() -> MockSource {
    let mut source = MockSource::default();
    source.add_athlete(
        profile("p1", "Ada", "Lovelace"),
        vec![
            (summary("p1-cmj-1", "CMJ", 1), cmj_payload(&[0.90, 1.00, 0.95])),
            (summary("p1-cmj-2", "CMJ", 2), cmj_payload(&[1.00, 1.05, 0.98])),
            (summary("p1-ppu-1", "PPU", 2), b"[]".to_vec()),
        ],
    );
    source.add_athlete(
        profile("p2", "Grace", "Hopper"),
        vec![(summary("p2-cmj-1", "CMJ", 3), cmj_payload(&[1.10, 1.02, 1.08]))],
    );
    source.add_athlete(
        profile("p3", "Alan", "Turing"),
        vec![
            (summary("p3-cmj-1", "CMJ", 4), cmj_payload(&[0.92, 0.97, 1.03])),
            (summary("p3-cmj-2", "CMJ", 4), cmj_payload(&[1.04, 0.99, 0.94])),
        ],
    );
    source.add_athlete(profile("p4", "Edsger", "Dijkstra"), vec![]);
    source
}

/// Production defaults with pacing removed and checkpoint logs under `dir`.
pub fn test_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        min_request_interval: Duration::ZERO,
        athlete_pause: Duration::ZERO,
        fetch_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
        processed_log: dir.join("processed_athletes.txt"),
        failed_log: dir.join("failed_athletes.txt"),
        ..PipelineConfig::default()
    }
}
