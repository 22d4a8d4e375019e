use std::collections::BTreeMap;

/// Metric-by-trial values for one test session.
///
/// Every row has exactly [`MetricTable::trial_count`] cells; a metric that was
/// not reported for a trial holds `None` in that cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    rows: BTreeMap<String, Vec<Option<f64>>>,
    trials: usize,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from rows, padding short rows with missing cells.
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Option<f64>>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in rows {
            let name = name.into();
            for (trial, value) in values.into_iter().enumerate() {
                table.insert_if_absent(&name, trial, value);
            }
            table.rows.entry(name).or_default();
        }
        table.pad();
        table
    }

    /// Stores `value` at `(metric, trial)` unless that cell already holds a value.
    pub fn insert_if_absent(&mut self, metric: &str, trial: usize, value: Option<f64>) {
        if trial >= self.trials {
            self.trials = trial + 1;
            self.pad();
        }
        if !self.rows.contains_key(metric) {
            self.rows
                .insert(metric.to_string(), vec![None; self.trials]);
        }
        if let Some(cell) = self.rows.get_mut(metric).and_then(|r| r.get_mut(trial)) {
            if cell.is_none() {
                *cell = value;
            }
        }
    }

    fn pad(&mut self) {
        let trials = self.trials;
        for row in self.rows.values_mut() {
            row.resize(trials, None);
        }
    }

    pub fn trial_count(&self) -> usize {
        self.trials
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.rows.contains_key(metric)
    }

    pub fn row(&self, metric: &str) -> Option<&[Option<f64>]> {
        self.rows.get(metric).map(Vec::as_slice)
    }

    pub fn value(&self, metric: &str, trial: usize) -> Option<f64> {
        self.rows.get(metric)?.get(trial).copied().flatten()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// All metric values recorded for one trial column.
    pub fn column(&self, trial: usize) -> BTreeMap<String, Option<f64>> {
        self.rows
            .iter()
            .map(|(k, v)| (k.clone(), v.get(trial).copied().flatten()))
            .collect()
    }

    /// Drops every metric for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.rows.retain(|k, _| keep(k));
    }
}
