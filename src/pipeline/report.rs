//! Per-unit outcome bookkeeping shared by the stages.

use std::collections::BTreeMap;

/// Ordered `name -> success` outcomes of one stage.
///
/// A stage succeeds only when it attempted at least one unit and every
/// attempt succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitResults {
    units: Vec<(String, bool)>,
}

impl UnitResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, ok: bool) {
        self.units.push((name.into(), ok));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.units.iter().filter(|(_, ok)| *ok).count()
    }

    /// Non-empty and all true.
    pub fn success(&self) -> bool {
        !self.units.is_empty() && self.units.iter().all(|(_, ok)| *ok)
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.units
            .iter()
            .find(|(unit, _)| unit == name)
            .map(|(_, ok)| *ok)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.units.iter().map(|(name, ok)| (name.as_str(), *ok))
    }

    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.units.iter().cloned().collect()
    }

    /// Logs one line per unit and a total.
    pub fn log_summary(&self, stage: &str) {
        for (name, ok) in self.iter() {
            if ok {
                tracing::info!(stage, unit = name, "SUCCESS");
            } else {
                tracing::error!(stage, unit = name, "FAILED");
            }
        }
        tracing::info!(
            stage,
            succeeded = self.succeeded(),
            total = self.len(),
            "Stage summary"
        );
    }
}

impl FromIterator<(String, bool)> for UnitResults {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}
