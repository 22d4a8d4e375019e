//! Warehouse table layouts and row coercion.

use crate::analyzers::types::{TestResult, TestType};
use crate::analyzers::weights::CompositeWeights;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    String,
    Date,
    Int,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    ResultId,
    AssessmentId,
    AthleteId,
    AthleteName,
    TestId,
    TestDate,
    AgeAtTest,
    BestTrialNumber,
    CompositeScore,
    Metric(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    source: Source,
}

/// Metrics reported per test type in addition to the weighted ones.
static CMJ_REPORTED: &[&str] = &[
    "BODY_WEIGHT_LBS_Trial_lb",
    "CONCENTRIC_RFD_Trial_N/s",
    "PEAK_TAKEOFF_POWER_Trial_W",
    "ECCENTRIC_BRAKING_IMPULSE_Trial_Ns",
    "RSI_MODIFIED_IMP_MOM_Trial_RSI_mod",
    "CONCENTRIC_IMPULSE_P1_Trial_Ns",
    "CONCENTRIC_IMPULSE_P2_Trial_Ns",
    "CON_P2_CON_P1_IMPULSE_RATIO_Trial_",
    "CONCENTRIC_IMPULSE_Asym_Trial_Ns",
    "ECCENTRIC_BRAKING_IMPULSE_Asym_Trial_Ns",
    "CONCENTRIC_IMPULSE_P1_Asym_Trial_Ns",
    "CONCENTRIC_IMPULSE_P2_Asym_Trial_Ns",
];

static PPU_REPORTED: &[&str] = &[
    "MEAN_ECCENTRIC_FORCE_Asym_Trial_N",
    "MEAN_TAKEOFF_FORCE_Asym_Trial_N",
    "PEAK_CONCENTRIC_FORCE_Asym_Trial_N",
    "PEAK_ECCENTRIC_FORCE_Asym_Trial_N",
];

static HJ_REPORTED: &[&str] = &[
    "HOP_MEAN_RSI_Trial_",
    "HOP_MEAN_CONTACT_TIME_Trial_ms",
    "HOP_MEAN_HEIGHT_Trial_cm",
];

static IMTP_REPORTED: &[&str] = &[
    "BODY_WEIGHT_LBS_Trial_lb",
    "FORCE_AT_100MS_Trial_N",
    "FORCE_AT_200MS_Trial_N",
    "PEAK_VERTICAL_FORCE_Asym_Trial_N",
];

/// Warehouse columns whose names differ from the sanitized metric id. Every
/// column here resolves back to its metric through the alias table.
static CMJ_COLUMNS: &[(&str, &str)] = &[
    ("CON_P2_CON_P1_IMPULSE_RATIO_Trial_", "CON_P2_CON_P1_IMPULSE_RATIO_Trial"),
    ("CONCENTRIC_IMPULSE_Asym_Trial_Ns", "CONCENTRIC_IMPULSE_Asym_Ns"),
    ("ECCENTRIC_BRAKING_IMPULSE_Asym_Trial_Ns", "ECCENTRIC_BRAKING_IMPULSE_Asym_Ns"),
    ("CONCENTRIC_IMPULSE_P1_Asym_Trial_Ns", "CONCENTRIC_IMPULSE_P1_Asym_Ns"),
    ("CONCENTRIC_IMPULSE_P2_Asym_Trial_Ns", "CONCENTRIC_IMPULSE_P2_Asym_Ns"),
];

static PPU_COLUMNS: &[(&str, &str)] = &[
    ("ECCENTRIC_BRAKING_RFD_Trial_N/s", "ECCENTRIC_BRAKING_RFD_Trial_N_s_"),
    ("MEAN_ECCENTRIC_FORCE_Asym_Trial_N", "MEAN_ECCENTRIC_FORCE_Asym_N"),
    ("MEAN_TAKEOFF_FORCE_Asym_Trial_N", "MEAN_TAKEOFF_FORCE_Asym_N"),
    ("PEAK_CONCENTRIC_FORCE_Asym_Trial_N", "PEAK_CONCENTRIC_FORCE_Asym_N"),
    ("PEAK_ECCENTRIC_FORCE_Asym_Trial_N", "PEAK_ECCENTRIC_FORCE_Asym_N"),
];

/// Column name of `metric` in the test type's table.
pub fn warehouse_column(test_type: TestType, metric: &str) -> String {
    let named = match test_type {
        TestType::Cmj => CMJ_COLUMNS,
        TestType::Ppu => PPU_COLUMNS,
        TestType::Hj | TestType::Imtp => &[],
    };
    named
        .iter()
        .find(|(id, _)| *id == metric)
        .map(|(_, column)| column.to_string())
        .unwrap_or_else(|| sanitize_column(metric))
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_column(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// A named warehouse table and its ordered columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn for_test_type(test_type: TestType) -> Self {
        let fixed = [
            ("result_id", ColumnKind::String, Source::ResultId),
            ("assessment_id", ColumnKind::String, Source::AssessmentId),
            ("athlete_id", ColumnKind::String, Source::AthleteId),
            ("athlete_name", ColumnKind::String, Source::AthleteName),
            ("test_id", ColumnKind::String, Source::TestId),
            ("test_date", ColumnKind::Date, Source::TestDate),
            ("age_at_test", ColumnKind::Int, Source::AgeAtTest),
            ("best_trial_number", ColumnKind::Int, Source::BestTrialNumber),
        ];
        let mut columns: Vec<Column> = fixed
            .into_iter()
            .map(|(name, kind, source)| Column {
                name: name.to_string(),
                kind,
                source,
            })
            .collect();
        columns.push(Column {
            name: test_type.score_column(),
            kind: ColumnKind::Float,
            source: Source::CompositeScore,
        });

        let reported = match test_type {
            TestType::Cmj => CMJ_REPORTED,
            TestType::Ppu => PPU_REPORTED,
            TestType::Hj => HJ_REPORTED,
            TestType::Imtp => IMTP_REPORTED,
        };
        let weights = CompositeWeights::for_test_type(test_type);
        for metric in weights.metrics().chain(reported.iter().copied()) {
            let name = warehouse_column(test_type, metric);
            if columns.iter().any(|c| c.name == name) {
                continue;
            }
            columns.push(Column {
                name,
                kind: ColumnKind::Float,
                source: Source::Metric(metric.to_string()),
            });
        }

        Self {
            name: format!("{}_results", test_type.tag().to_ascii_lowercase()),
            columns,
        }
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Renders one record as CSV fields, coercing each value to its column
    /// kind. Values that cannot be represented become empty fields.
    pub fn render(&self, record: &TestResult) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                let number = |v: Option<f64>| coerce_number(v, column.kind);
                match &column.source {
                    Source::ResultId => record.result_id.clone(),
                    Source::AssessmentId => record.assessment_id.clone(),
                    Source::AthleteId => record.athlete_id.clone(),
                    Source::AthleteName => record.athlete_name.clone(),
                    Source::TestId => record.test_id.clone(),
                    Source::TestDate => record.test_date.format("%Y-%m-%d").to_string(),
                    Source::AgeAtTest => number(record.age_at_test.map(f64::from)),
                    Source::BestTrialNumber => number(Some(record.best_trial_number as f64)),
                    Source::CompositeScore => number(Some(record.composite_score)),
                    Source::Metric(metric) => number(record.metrics.get(metric).copied().flatten()),
                }
            })
            .collect()
    }
}

fn coerce_number(value: Option<f64>, kind: ColumnKind) -> String {
    match value.filter(|v| v.is_finite()) {
        None => String::new(),
        Some(v) => match kind {
            ColumnKind::Int => format!("{}", v.round() as i64),
            _ => v.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::weights::canonical_metric;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record() -> TestResult {
        let mut metrics = BTreeMap::new();
        metrics.insert("PEAK_CONCENTRIC_FORCE_Trial_N".to_string(), Some(1500.5));
        metrics.insert("ECCENTRIC_BRAKING_RFD_Trial_N/s".to_string(), Some(f64::NAN));
        metrics.insert("CONCENTRIC_DURATION_Trial_ms".to_string(), None);
        TestResult {
            result_id: "r1".into(),
            assessment_id: "a1".into(),
            athlete_id: "p1".into(),
            athlete_name: "Ada Lovelace".into(),
            test_id: "t1".into(),
            test_type: TestType::Ppu,
            test_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            age_at_test: None,
            best_trial_number: 2,
            composite_score: 87.5,
            metrics,
        }
    }

    fn field<'a>(schema: &TableSchema, row: &'a [String], name: &str) -> &'a str {
        let idx = schema.header().iter().position(|h| *h == name).unwrap();
        &row[idx]
    }

    #[test]
    fn test_sanitize_column() {
        assert_eq!(
            sanitize_column("ECCENTRIC_BRAKING_RFD_Trial_N/s"),
            "ECCENTRIC_BRAKING_RFD_Trial_N_s"
        );
        assert_eq!(sanitize_column("X_Trial_%"), "X_Trial__");
    }

    #[test]
    fn test_schema_names_and_unique_columns() {
        let schema = TableSchema::for_test_type(TestType::Cmj);
        assert_eq!(schema.name, "cmj_results");
        let header = schema.header();
        assert!(header.contains(&"cmj_composite_score"));
        for column in [
            "BODYMASS_RELATIVE_TAKEOFF_POWER_Trial_W_kg",
            "ECCENTRIC_BRAKING_RFD_Trial_N_s",
            "CONCENTRIC_IMPULSE_P1_Trial_Ns",
            "CONCENTRIC_IMPULSE_P2_Trial_Ns",
            "CON_P2_CON_P1_IMPULSE_RATIO_Trial",
            "CONCENTRIC_IMPULSE_Asym_Ns",
            "ECCENTRIC_BRAKING_IMPULSE_Asym_Ns",
            "CONCENTRIC_IMPULSE_P1_Asym_Ns",
            "CONCENTRIC_IMPULSE_P2_Asym_Ns",
        ] {
            assert!(header.contains(&column), "missing {column}");
        }
        // 7 weighted metrics plus 12 reported ones.
        assert_eq!(header.len(), 9 + 19);
        let mut deduped = header.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), header.len());
    }

    #[test]
    fn test_render_coerces_values() {
        let schema = TableSchema::for_test_type(TestType::Ppu);
        let row = schema.render(&record());
        assert_eq!(row.len(), schema.columns.len());
        assert_eq!(field(&schema, &row, "test_date"), "2024-03-09");
        assert_eq!(field(&schema, &row, "age_at_test"), "");
        assert_eq!(field(&schema, &row, "best_trial_number"), "2");
        assert_eq!(field(&schema, &row, "ppu_composite_score"), "87.5");
        assert_eq!(field(&schema, &row, "PEAK_CONCENTRIC_FORCE_Trial_N"), "1500.5");
        assert_eq!(field(&schema, &row, "ECCENTRIC_BRAKING_RFD_Trial_N_s_"), "");
        assert_eq!(field(&schema, &row, "CONCENTRIC_DURATION_Trial_ms"), "");
        assert_eq!(field(&schema, &row, "MEAN_TAKEOFF_FORCE_Asym_N"), "");
    }

    #[test]
    fn test_ppu_header_uses_warehouse_names() {
        let schema = TableSchema::for_test_type(TestType::Ppu);
        let metrics: Vec<_> = schema.header().into_iter().skip(9).collect();
        assert_eq!(
            metrics,
            vec![
                "PEAK_CONCENTRIC_FORCE_Trial_N",
                "RELATIVE_PEAK_CONCENTRIC_FORCE_Trial_N_kg",
                "ECCENTRIC_BRAKING_RFD_Trial_N_s_",
                "CONCENTRIC_DURATION_Trial_ms",
                "MEAN_ECCENTRIC_FORCE_Asym_N",
                "MEAN_TAKEOFF_FORCE_Asym_N",
                "PEAK_CONCENTRIC_FORCE_Asym_N",
                "PEAK_ECCENTRIC_FORCE_Asym_N",
            ]
        );
    }

    #[test]
    fn test_named_columns_resolve_to_their_metric() {
        for (metric, column) in CMJ_COLUMNS.iter().chain(PPU_COLUMNS) {
            assert_eq!(canonical_metric(column), *metric, "{column}");
        }
        assert_eq!(
            warehouse_column(TestType::Cmj, "ECCENTRIC_BRAKING_RFD_Trial_N/s"),
            "ECCENTRIC_BRAKING_RFD_Trial_N_s"
        );
        assert_eq!(warehouse_column(TestType::Hj, "HOP_RSI_Trial_"), "HOP_RSI_Trial_");
    }

    #[test]
    fn test_int_columns_round() {
        assert_eq!(coerce_number(Some(23.6), ColumnKind::Int), "24");
        assert_eq!(coerce_number(Some(f64::INFINITY), ColumnKind::Int), "");
        assert_eq!(coerce_number(Some(2.25), ColumnKind::Float), "2.25");
    }
}
