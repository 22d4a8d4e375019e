use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

use crate::analyzers::types::{BestTrial, TestResult, TestType};
use crate::services::source_api::{Profile, TestSummary};

/// Turns one athlete's scored tests into output records.
///
/// Tests sharing a date share one assessment id. Records come out ordered by
/// date, then test id.
pub fn assemble_records(
    profile: &Profile,
    test_type: TestType,
    mut scored: Vec<(TestSummary, BestTrial)>,
) -> Vec<TestResult> {
    scored.sort_by(|(a, _), (b, _)| {
        a.test_date()
            .cmp(&b.test_date())
            .then_with(|| a.test_id.cmp(&b.test_id))
    });

    let athlete_name = profile.full_name();
    let mut assessments: HashMap<NaiveDate, String> = HashMap::new();

    scored
        .into_iter()
        .map(|(summary, best)| {
            let test_date = summary.test_date();
            let assessment_id = assessments
                .entry(test_date)
                .or_insert_with(|| Uuid::new_v4().to_string())
                .clone();
            TestResult {
                result_id: Uuid::new_v4().to_string(),
                assessment_id,
                athlete_id: profile.profile_id.clone(),
                athlete_name: athlete_name.clone(),
                test_id: summary.test_id,
                test_type,
                test_date,
                age_at_test: profile.age_on(test_date),
                best_trial_number: best.trial_number(),
                composite_score: best.score,
                metrics: best.metrics,
            }
        })
        .collect()
}
