//! Parser for force-plate trial payloads.
//!
//! The source returns one JSON object per trial, each carrying a list of
//! results. Every result is tagged with a metric definition (result name and
//! unit) and a limb qualifier. [`extract_table`] flattens those results into a
//! [`MetricTable`] keyed by a canonical metric identifier.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::analyzers::table::MetricTable;

/// Limb qualifier the source uses for whole-body measurements.
pub const WHOLE_BODY_LIMB: &str = "Trial";

/// Long unit names reported by the source and their abbreviations.
static UNIT_MAP: &[(&str, &str)] = &[
    ("Newton", "N"),
    ("Millisecond", "ms"),
    ("Second", "s"),
    ("Percent", "%"),
    ("Kilo", "kg"),
    ("Pound", "lb"),
    ("No Unit", ""),
    ("Newton Per Second", "N/s"),
    ("Newton Per Kilo", "N/kg"),
    ("Newton Per Second Per Kilo", "N/s/kg"),
    ("Centimeter", "cm"),
    ("Inch", "in"),
    ("Newton Second", "Ns"),
    ("Watt", "W"),
    ("Watt Per Kilo", "W/kg"),
];

/// One trial as returned by the results endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrial {
    #[serde(default)]
    pub results: Vec<RawResult>,
}

/// A single metric observation inside a trial.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub limb: Option<String>,
    #[serde(default)]
    pub definition: MetricDefinition,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricDefinition {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub unit: String,
}

/// Decodes a results payload. An empty body decodes to no trials.
///
/// # Errors
///
/// Returns an error if the bytes are not a JSON array of trials.
pub fn parse_payload(bytes: &[u8]) -> Result<Vec<RawTrial>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Abbreviates a unit name, passing unknown units through unchanged.
pub fn abbreviate_unit(unit: &str) -> &str {
    UNIT_MAP
        .iter()
        .find(|(long, _)| *long == unit)
        .map(|(_, short)| *short)
        .unwrap_or(unit)
}

/// Builds the canonical metric identifier `<RESULT>[_<LIMB>]_Trial_<UNIT>`.
///
/// The limb token is omitted when it already is the whole-body `Trial`
/// qualifier so the identifier never repeats it.
pub fn metric_id(result: &str, limb: Option<&str>, unit: &str) -> String {
    let unit = abbreviate_unit(unit);
    match limb {
        None | Some("") | Some(WHOLE_BODY_LIMB) => format!("{result}_{WHOLE_BODY_LIMB}_{unit}"),
        Some(limb) => format!("{result}_{limb}_{WHOLE_BODY_LIMB}_{unit}"),
    }
}

/// Coerces a JSON scalar into a finite float. Anything else is missing.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Pivots raw trial results into a metric-by-trial table.
///
/// Trial indices are assigned per metric identifier in input order, so the
/// n-th occurrence of a metric lands in trial column n. When two values
/// collide on the same cell the first one wins.
pub fn extract_table(trials: &[RawTrial]) -> MetricTable {
    let mut table = MetricTable::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for res in trials.iter().flat_map(|t| t.results.iter()) {
        let id = metric_id(
            &res.definition.result,
            res.limb.as_deref(),
            &res.definition.unit,
        );
        let ordinal = seen.entry(id.clone()).or_insert(0);
        let trial = *ordinal;
        *ordinal += 1;

        table.insert_if_absent(&id, trial, coerce_numeric(&res.value));
    }

    table
}
