//! Output shaping: map a source table onto the columns the annotation
//! platform expects.
//!
//! The shaped table optionally starts with a `metadata` column holding a JSON
//! object built from `(key, field)` pairs, followed by named columns each bound
//! to one source field. The field `"."`, or any field the source lacks,
//! renders as `"."`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::record::{FlatRecord, FlatTable};

pub const METADATA_COLUMN: &str = "metadata";

/// Column names the platform recognises.
pub const STANDARD_COLUMNS: [&str; 10] = [
    "workitem_id",
    "image",
    "image_name",
    "image_link",
    "prompt",
    "question",
    "model_a",
    "model_b",
    "file_path",
    "video_name",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub key: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
    #[serde(default)]
    pub columns: Vec<OutputColumn>,
}

fn default_include_metadata() -> bool {
    true
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec {
            include_metadata: true,
            metadata: Vec::new(),
            columns: Vec::new(),
        }
    }
}

impl OutputSpec {
    fn output_columns(&self) -> Vec<&OutputColumn> {
        let mut kept: Vec<&OutputColumn> = Vec::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                continue;
            }
            if self.include_metadata && column.name == METADATA_COLUMN {
                warn!(column = %column.name, "Column clashes with the metadata column, skipping");
                continue;
            }
            if kept.iter().any(|existing| existing.name == column.name) {
                warn!(column = %column.name, "Duplicate output column, keeping the first");
                continue;
            }
            if !STANDARD_COLUMNS.contains(&column.name.as_str()) {
                warn!(column = %column.name, "Output column is not a standard platform column");
            }
            kept.push(column);
        }
        kept
    }
}

/// Metadata cell for one record: a compact JSON object, `{}` when empty.
pub fn metadata_cell(record: &FlatRecord, fields: &[MetadataField]) -> String {
    let object: Map<String, Value> = fields
        .iter()
        .filter(|pair| !pair.key.trim().is_empty())
        .map(|pair| {
            (
                pair.key.clone(),
                Value::String(record.value_or_missing(&pair.field)),
            )
        })
        .collect();
    Value::Object(object).to_string()
}

pub fn shape(table: &FlatTable, spec: &OutputSpec) -> FlatTable {
    let columns = spec.output_columns();
    let mut names: Vec<String> = Vec::with_capacity(columns.len() + 1);
    if spec.include_metadata {
        names.push(METADATA_COLUMN.to_string());
    }
    names.extend(columns.iter().map(|column| column.name.clone()));

    let records = table
        .records()
        .iter()
        .map(|source| {
            let mut record = FlatRecord::new();
            if spec.include_metadata {
                record.insert(
                    METADATA_COLUMN,
                    Value::String(metadata_cell(source, &spec.metadata)),
                );
            }
            for column in &columns {
                record.insert(
                    column.name.clone(),
                    Value::String(source.value_or_missing(&column.field)),
                );
            }
            record
        })
        .collect();
    FlatTable::with_columns(names, records)
}
