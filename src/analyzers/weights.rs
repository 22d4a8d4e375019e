//! Composite score formulas and metric name aliases.

use crate::analyzers::types::TestType;

/// Signed weights per metric. Positive means higher is better, negative means
/// lower is better.
static CMJ_WEIGHTS: &[(&str, f64)] = &[
    ("JUMP_HEIGHT_IMP_MOM_Trial_cm", 0.25),
    ("BODYMASS_RELATIVE_TAKEOFF_POWER_Trial_W/kg", 0.20),
    ("RSI_MODIFIED_Trial_RSI_mod", 0.20),
    ("PEAK_CONCENTRIC_FORCE_Trial_N", 0.10),
    ("CONCENTRIC_IMPULSE_Trial_Ns", 0.10),
    ("ECCENTRIC_BRAKING_RFD_Trial_N/s", 0.10),
    ("CONCENTRIC_DURATION_Trial_ms", -0.05),
];

static PPU_WEIGHTS: &[(&str, f64)] = &[
    ("PEAK_CONCENTRIC_FORCE_Trial_N", 0.40),
    ("RELATIVE_PEAK_CONCENTRIC_FORCE_Trial_N/kg", 0.30),
    ("ECCENTRIC_BRAKING_RFD_Trial_N/s", 0.20),
    ("CONCENTRIC_DURATION_Trial_ms", -0.10),
];

static HJ_WEIGHTS: &[(&str, f64)] = &[("HOP_RSI_Trial_", 1.0)];

static IMTP_WEIGHTS: &[(&str, f64)] = &[
    ("PEAK_VERTICAL_FORCE_Trial_N", 0.50),
    ("ISO_BM_REL_FORCE_PEAK_Trial_N/kg", 0.50),
];

/// Legacy and warehouse spellings of metric names, mapped to the identifiers
/// produced by [`crate::parser::metric_id`].
static ALIASES: &[(&str, &str)] = &[
    ("CONCENTRIC_RFD_Trial_N_s", "CONCENTRIC_RFD_Trial_N/s"),
    ("CONCENTRIC_RFD_Trial_N_s_", "CONCENTRIC_RFD_Trial_N/s"),
    ("ECCENTRIC_BRAKING_RFD_Trial_N_s", "ECCENTRIC_BRAKING_RFD_Trial_N/s"),
    ("ECCENTRIC_BRAKING_RFD_Trial_N_s_", "ECCENTRIC_BRAKING_RFD_Trial_N/s"),
    (
        "BODYMASS_RELATIVE_TAKEOFF_POWER_Trial_W_kg",
        "BODYMASS_RELATIVE_TAKEOFF_POWER_Trial_W/kg",
    ),
    (
        "RELATIVE_PEAK_CONCENTRIC_FORCE_Trial_N_kg",
        "RELATIVE_PEAK_CONCENTRIC_FORCE_Trial_N/kg",
    ),
    ("ISO_BM_REL_FORCE_PEAK_Trial_N_kg", "ISO_BM_REL_FORCE_PEAK_Trial_N/kg"),
    ("CONCENTRIC_IMPULSE_Trial_N/s", "CONCENTRIC_IMPULSE_Trial_Ns"),
    ("CONCENTRIC_DURATION_Trial/ms", "CONCENTRIC_DURATION_Trial_ms"),
    ("CON_P2_CON_P1_IMPULSE_RATIO_Trial", "CON_P2_CON_P1_IMPULSE_RATIO_Trial_"),
    ("HOP_RSI_Trial", "HOP_RSI_Trial_"),
    ("CONCENTRIC_IMPULSE_Asym_Ns", "CONCENTRIC_IMPULSE_Asym_Trial_Ns"),
    ("CONCENTRIC_IMPULSE_P1_Asym_Ns", "CONCENTRIC_IMPULSE_P1_Asym_Trial_Ns"),
    ("CONCENTRIC_IMPULSE_P2_Asym_Ns", "CONCENTRIC_IMPULSE_P2_Asym_Trial_Ns"),
    (
        "ECCENTRIC_BRAKING_IMPULSE_Asym_Ns",
        "ECCENTRIC_BRAKING_IMPULSE_Asym_Trial_Ns",
    ),
    ("MEAN_ECCENTRIC_FORCE_Asym_N", "MEAN_ECCENTRIC_FORCE_Asym_Trial_N"),
    ("MEAN_TAKEOFF_FORCE_Asym_N", "MEAN_TAKEOFF_FORCE_Asym_Trial_N"),
    ("PEAK_CONCENTRIC_FORCE_Asym_N", "PEAK_CONCENTRIC_FORCE_Asym_Trial_N"),
    ("PEAK_ECCENTRIC_FORCE_Asym_N", "PEAK_ECCENTRIC_FORCE_Asym_Trial_N"),
];

/// Resolves a metric name through the alias table. Unknown names resolve to
/// themselves.
pub fn canonical_metric(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// The scoring formula for one test type.
#[derive(Debug, Clone, Copy)]
pub struct CompositeWeights {
    entries: &'static [(&'static str, f64)],
}

impl CompositeWeights {
    pub fn for_test_type(test_type: TestType) -> Self {
        let entries = match test_type {
            TestType::Cmj => CMJ_WEIGHTS,
            TestType::Ppu => PPU_WEIGHTS,
            TestType::Hj => HJ_WEIGHTS,
            TestType::Imtp => IMTP_WEIGHTS,
        };
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| *name == metric)
            .map(|(_, w)| *w)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.get(metric).is_some()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
