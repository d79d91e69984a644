//! Flat records and tables: the common shape every source is reduced to.
//!
//! A [`FlatRecord`] is an insertion-ordered map from a compound key to a leaf
//! value. A [`FlatTable`] is a list of records sharing one ordered column set,
//! where missing cells are padded with the empty string.

use serde_json::Value;

/// Rendered for a field that is absent, and for the explicit `"."` field.
pub const MISSING_VALUE: &str = ".";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    entries: Vec<(String, Value)>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Rendered value of `field`, or [`MISSING_VALUE`] when absent or when
    /// `field` is itself `"."`.
    pub fn value_or_missing(&self, field: &str) -> String {
        if field == MISSING_VALUE {
            return MISSING_VALUE.to_string();
        }
        self.get(field)
            .map(render)
            .unwrap_or_else(|| MISSING_VALUE.to_string())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert every entry of `other`; on collision `other` wins.
    pub fn extend(&mut self, other: FlatRecord) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// `base` overlaid with `top`: base keys first, `top` wins on collision.
    pub fn overlay(base: &FlatRecord, top: FlatRecord) -> FlatRecord {
        let mut merged = base.clone();
        merged.extend(top);
        merged
    }
}

impl FromIterator<(String, Value)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = FlatRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Render a leaf value as a table cell.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTable {
    columns: Vec<String>,
    records: Vec<FlatRecord>,
}

impl FlatTable {
    /// Columns are the union of all record keys in first-seen order; every
    /// record is padded with `""` and reordered to match.
    pub fn from_records(records: Vec<FlatRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.to_string());
                }
            }
        }
        Self::with_columns(columns, records)
    }

    /// Keep exactly `columns`; cells outside them are dropped, missing ones padded.
    pub fn with_columns(columns: Vec<String>, records: Vec<FlatRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| {
                        let value = record
                            .get(column)
                            .cloned()
                            .unwrap_or_else(|| Value::String(String::new()));
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect();
        FlatTable { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[FlatRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every row rendered in column order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.records.iter().map(move |record| {
            self.columns
                .iter()
                .map(|column| record.get(column).map(render).unwrap_or_default())
                .collect()
        })
    }

    /// Rendered cells of one column, or `None` if the table lacks it.
    pub fn column(&self, name: &str) -> Option<Vec<String>> {
        if !self.columns.iter().any(|column| column == name) {
            return None;
        }
        Some(
            self.records
                .iter()
                .map(|record| record.get(name).map(render).unwrap_or_default())
                .collect(),
        )
    }
}
