use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};

use crate::baq::filters::{FilterScalar, normalize_cell};

/// Ordered column-to-value mapping for one returned row.
pub type Row = Map<String, Value>;

/// Normalized values seen in response rows, per list filter key.
#[derive(Debug, Default)]
pub struct FoundValues {
    seen: HashMap<String, HashSet<String>>,
}

impl FoundValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the values of column `key` across `rows`.
    ///
    /// Returns `false` when no row carries the column at all.
    pub fn record(&mut self, key: &str, rows: &[Row]) -> bool {
        let mut present = false;
        let seen = self.seen.entry(key.to_string()).or_default();
        for row in rows {
            if let Some(cell) = row.get(key) {
                present = true;
                if let Some(value) = normalize_cell(cell) {
                    seen.insert(value);
                }
            }
        }
        present
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.seen
            .get(key)
            .is_some_and(|values| values.contains(value))
    }
}

/// Requested list-filter values that never came back, per key in filter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingValues {
    entries: Vec<(String, Vec<String>)>,
}

impl MissingValues {
    /// Compares every requested value with the found set by string form.
    pub fn compute<'a, I>(requested: I, found: &FoundValues) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [FilterScalar])>,
    {
        let mut entries = Vec::new();
        for (key, values) in requested {
            let missing = values
                .iter()
                .map(FilterScalar::normalized)
                .filter(|value| !found.contains(key, value))
                .collect::<BTreeSet<_>>();
            if !missing.is_empty() {
                entries.push((key.to_string(), missing.into_iter().collect()));
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Total number of (key, value) pairs.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, values)| values.len()).sum()
    }

    /// Number of distinct values regardless of key.
    pub fn unique_values(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|(_, values)| values.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Drops rows whose full field set equals an earlier row's.
///
/// Key order is ignored at every depth, nested objects included.
pub fn dedupe_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row_fingerprint(row)))
        .collect()
}

fn row_fingerprint(row: &Row) -> String {
    serde_json::to_string(&sorted_object(row)).unwrap_or_default()
}

fn sorted_object(object: &Row) -> Value {
    let mut entries = object.iter().collect::<Vec<_>>();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));
    entries
        .into_iter()
        .map(|(key, value)| (key.clone(), sorted_value(value)))
        .collect::<Row>()
        .into()
}

fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Object(object) => sorted_object(object),
        Value::Array(items) => items.iter().map(sorted_value).collect(),
        other => other.clone(),
    }
}
