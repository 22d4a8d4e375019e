use crate::analyzers::table::MetricTable;
use crate::analyzers::types::BestTrial;
use crate::analyzers::weights::CompositeWeights;
use crate::stats::{OUTLIER_SIGMAS, PopulationStats, within_band};

/// Composite score of one trial column.
///
/// Sums `weight * z` over every weighted metric that has a value for this
/// trial and a baseline with `std > 0`. Returns `None` when no metric
/// contributed.
pub fn score_trial(
    table: &MetricTable,
    trial: usize,
    weights: &CompositeWeights,
    baseline: &PopulationStats,
) -> Option<f64> {
    let mut total = 0.0;
    let mut contributing = 0usize;

    for (metric, weight) in weights.iter() {
        let Some(value) = table.value(metric, trial) else {
            continue;
        };
        let Some(z) = baseline.get(metric).and_then(|b| b.z(value)) else {
            continue;
        };
        total += weight * z;
        contributing += 1;
    }

    (contributing > 0).then_some(total)
}

/// Scores every trial of a test and picks the best one.
///
/// The highest defined score wins; on ties the earliest trial is kept.
/// Returns `None` when the table is empty or no trial produced a score.
pub fn best_trial(
    table: &MetricTable,
    weights: &CompositeWeights,
    baseline: &PopulationStats,
) -> Option<BestTrial> {
    if table.is_empty() || table.trial_count() == 0 {
        return None;
    }

    let scores: Vec<Option<f64>> = (0..table.trial_count())
        .map(|trial| score_trial(table, trial, weights, baseline))
        .collect();

    let (trial, score) = select_best(&scores)?;

    Some(BestTrial {
        trial,
        score,
        metrics: table.column(trial),
        scores,
    })
}

/// Index and value of the maximum defined score, first-seen wins on ties.
pub fn select_best(scores: &[Option<f64>]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.iter().enumerate() {
        let Some(s) = *score else { continue };
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best
}

/// First weighted metric of the best trial lying beyond the outlier band,
/// if any. Metrics without a usable baseline are not checked.
pub fn outlier_metric<'a>(
    best: &BestTrial,
    weights: &'a CompositeWeights,
    baseline: &PopulationStats,
) -> Option<&'a str> {
    weights.metrics().find(|metric| {
        let Some(Some(value)) = best.metrics.get(*metric) else {
            return false;
        };
        match baseline.get(metric) {
            Some(b) if b.std > 0.0 => !within_band(*value, b.mean, b.std, OUTLIER_SIGMAS),
            _ => false,
        }
    })
}
