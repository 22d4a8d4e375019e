//! Runtime configuration: source credentials from the environment and the
//! pipeline's tuning knobs.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::time::Duration;

use crate::analyzers::types::TestType;
use crate::fetch::RetryPolicy;

/// Credentials and endpoints of the force-plate source.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub profile_url: String,
    pub forcedecks_url: String,
    pub tenant_id: String,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

impl ApiConfig {
    /// Reads `CLIENT_ID`, `CLIENT_SECRET`, `AUTH_URL`, `PROFILE_URL`,
    /// `FORCEDECKS_URL` and `TENANT_ID`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            auth_url: required("AUTH_URL")?,
            profile_url: required("PROFILE_URL")?.trim_end_matches('/').to_string(),
            forcedecks_url: required("FORCEDECKS_URL")?.trim_end_matches('/').to_string(),
            tenant_id: required("TENANT_ID")?,
        })
    }
}

/// Where the population baseline comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BaselinePolicy {
    /// Sample the population and rebuild the baseline on every run.
    Recompute,
    /// Load a previously saved baseline and skip sampling.
    Fixed(PathBuf),
}

/// Which athletes feed the population baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Every Nth athlete is sampled.
    pub stride: usize,
    /// Maximum number of tests fetched for the sample.
    pub cap: Option<usize>,
    pub workers: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            cap: None,
            workers: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub test_type: TestType,
    pub since: DateTime<Utc>,
    pub min_request_interval: Duration,
    pub max_in_flight: usize,
    pub token_refresh_interval: Duration,
    pub test_workers: usize,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub sampling: SamplingConfig,
    pub baseline: BaselinePolicy,
    pub save_baseline: Option<PathBuf>,
    pub processed_log: PathBuf,
    pub failed_log: PathBuf,
    pub retry_failed: bool,
    /// Discard whole tests whose best trial has a weighted metric beyond 3σ.
    pub reject_outlier_tests: bool,
    pub athlete_pause: Duration,
}

/// Start of the test history window.
pub fn default_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_type: TestType::Cmj,
            since: default_since(),
            min_request_interval: Duration::from_millis(500),
            max_in_flight: 2,
            token_refresh_interval: Duration::from_secs(1800),
            test_workers: 2,
            fetch_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            sampling: SamplingConfig::default(),
            baseline: BaselinePolicy::Recompute,
            save_baseline: None,
            processed_log: PathBuf::from("processed_athletes.txt"),
            failed_log: PathBuf::from("failed_athletes.txt"),
            retry_failed: false,
            reject_outlier_tests: true,
            athlete_pause: Duration::from_secs(1),
        }
    }
}
