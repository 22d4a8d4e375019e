//! Population baseline: per-metric mean and standard deviation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::analyzers::table::MetricTable;
use crate::analyzers::types::TestType;
use crate::analyzers::utility::{mean, stddev};
use crate::analyzers::weights::{CompositeWeights, canonical_metric};

/// Observations farther than this many standard deviations from the mean are
/// dropped before the final statistics are computed.
pub const OUTLIER_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    /// Observations that survived outlier filtering.
    pub count: usize,
}

impl Baseline {
    /// Signed distance from the mean in standard deviations, if `std > 0`.
    pub fn z(&self, value: f64) -> Option<f64> {
        (self.std > 0.0).then(|| (value - self.mean) / self.std)
    }
}

/// Per-metric baselines for one test type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub test_type: TestType,
    pub generated_at: DateTime<Utc>,
    /// Number of tests that contributed observations.
    pub sample_tests: usize,
    pub metrics: BTreeMap<String, Baseline>,
}

/// Whether `value` lies within `k` standard deviations of `mean` (inclusive).
pub fn within_band(value: f64, mean: f64, std: f64, k: f64) -> bool {
    (value - mean).abs() <= k * std
}

/// Single-pass outlier filter: computes mean/std over `values` and keeps the
/// observations within [`OUTLIER_SIGMAS`] of that mean.
pub fn filter_outliers(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return values.to_vec();
    }
    let m = mean(values);
    let sd = stddev(values, m);
    values
        .iter()
        .copied()
        .filter(|v| within_band(*v, m, sd, OUTLIER_SIGMAS))
        .collect()
}

impl PopulationStats {
    /// Builds baselines from raw observations keyed by metric.
    ///
    /// Metrics left with no observations after filtering are omitted; they
    /// simply never contribute to a composite score.
    pub fn from_observations(
        test_type: TestType,
        sample_tests: usize,
        observations: &BTreeMap<String, Vec<f64>>,
    ) -> Self {
        let mut metrics = BTreeMap::new();

        for (name, values) in observations {
            let kept = filter_outliers(values);
            if kept.len() != values.len() {
                debug!(
                    metric = %name,
                    removed = values.len() - kept.len(),
                    "Outlier filtering removed observations"
                );
            }
            if kept.is_empty() {
                continue;
            }
            let m = mean(&kept);
            metrics.insert(
                name.clone(),
                Baseline {
                    mean: m,
                    std: stddev(&kept, m),
                    count: kept.len(),
                },
            );
        }

        Self {
            test_type,
            generated_at: Utc::now(),
            sample_tests,
            metrics,
        }
    }

    /// Collects every weighted metric's trial values across `tables` and
    /// builds the baseline from them.
    pub fn from_tables(
        test_type: TestType,
        weights: &CompositeWeights,
        tables: &[MetricTable],
    ) -> Self {
        let mut observations: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut sample_tests = 0;

        for table in tables {
            let mut contributed = false;
            for (name, row) in table.rows().filter(|(name, _)| weights.contains(name)) {
                let values: Vec<f64> = row.iter().flatten().copied().collect();
                if values.is_empty() {
                    continue;
                }
                contributed = true;
                observations.entry(name.to_string()).or_default().extend(values);
            }
            if contributed {
                sample_tests += 1;
            }
        }

        Self::from_observations(test_type, sample_tests, &observations)
    }

    pub fn get(&self, metric: &str) -> Option<&Baseline> {
        self.metrics.get(metric)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Writes the baseline as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)
            .with_context(|| format!("writing baseline to {}", path.display()))?;
        info!(path = %path.display(), metrics = self.metrics.len(), "Baseline saved");
        Ok(())
    }

    /// Loads a saved baseline, resolving legacy metric names through the
    /// alias table.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading baseline from {}", path.display()))?;
        let mut stats: PopulationStats = serde_json::from_str(&content)
            .with_context(|| format!("parsing baseline {}", path.display()))?;
        stats.metrics = stats
            .metrics
            .into_iter()
            .map(|(name, b)| (canonical_metric(&name).to_string(), b))
            .collect();
        Ok(stats)
    }
}
