//! Data types used by the scoring pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Force-plate protocols the pipeline knows how to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestType {
    /// Countermovement jump.
    Cmj,
    /// Prone push-up.
    Ppu,
    /// Hop test.
    Hj,
    /// Isometric mid-thigh pull.
    Imtp,
}

impl TestType {
    /// The tag the source puts on test summaries.
    pub fn tag(self) -> &'static str {
        match self {
            TestType::Cmj => "CMJ",
            TestType::Ppu => "PPU",
            TestType::Hj => "HJ",
            TestType::Imtp => "IMTP",
        }
    }

    /// Name of the composite score column in the warehouse table.
    pub fn score_column(self) -> String {
        format!("{}_composite_score", self.tag().to_ascii_lowercase())
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TestType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CMJ" => Ok(TestType::Cmj),
            "PPU" => Ok(TestType::Ppu),
            "HJ" => Ok(TestType::Hj),
            "IMTP" => Ok(TestType::Imtp),
            other => Err(anyhow::anyhow!("unknown test type '{other}'")),
        }
    }
}

/// Outcome of scoring every trial of one test.
#[derive(Debug, Clone, PartialEq)]
pub struct BestTrial {
    /// Zero-based index of the winning trial column.
    pub trial: usize,
    pub score: f64,
    /// Composite score per trial; `None` where no metric contributed.
    pub scores: Vec<Option<f64>>,
    /// Every metric value recorded for the winning trial.
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl BestTrial {
    /// One-based trial number as shown to operators.
    pub fn trial_number(&self) -> usize {
        self.trial + 1
    }
}

/// One persisted row: the representative trial of a single test session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub result_id: String,
    pub assessment_id: String,
    pub athlete_id: String,
    pub athlete_name: String,
    pub test_id: String,
    pub test_type: TestType,
    pub test_date: NaiveDate,
    pub age_at_test: Option<i32>,
    pub best_trial_number: usize,
    /// Raw composite score until the batch is rescaled onto the reporting band.
    pub composite_score: f64,
    pub metrics: BTreeMap<String, Option<f64>>,
}
