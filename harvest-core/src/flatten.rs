//! Flattening of nested annotation documents into one row per work item.
//!
//! Keys are joined with [`KEY_SEPARATOR`]. Document-level `fileMetadata` is
//! flattened under its own prefix and merged into every row, with the work
//! item's own keys winning on collision. Inside `inputData`, keys matching
//! `Image_<n>` are collated into a single `workitems-inputData-Image` cell,
//! sorted by `n`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FlattenError;
use crate::record::{render, FlatRecord, FlatTable};

pub const KEY_SEPARATOR: &str = "-";
pub const WORK_ITEMS_KEY: &str = "workitems";
pub const FILE_METADATA_KEY: &str = "fileMetadata";
pub const INPUT_DATA_KEY: &str = "inputData";
pub const WORK_ITEM_ID_KEY: &str = "workItemId";
pub const IMAGE_KEY: &str = "Image";
pub const IMAGE_SEPARATOR: &str = ", ";

fn image_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Image_(\d+)$").expect("image key pattern is valid"))
}

/// The numeric index of an `Image_<n>` key.
pub fn image_index(key: &str) -> Option<u64> {
    let captures = image_key_pattern().captures(key)?;
    // Absurdly long indices still match; they sort last.
    Some(captures[1].parse().unwrap_or(u64::MAX))
}

pub fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_SEPARATOR}{key}")
    }
}

/// Flatten every leaf of `map` under `prefix`. Nested mappings recurse;
/// lists and scalars are leaves.
pub fn flatten(map: &Map<String, Value>, prefix: &str) -> FlatRecord {
    let mut record = FlatRecord::new();
    flatten_into(map, prefix, &mut record);
    record
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, record: &mut FlatRecord) {
    for (key, value) in map {
        let path = join_key(prefix, key);
        match value {
            Value::Object(nested) => flatten_into(nested, &path, record),
            leaf => record.insert(path, leaf.clone()),
        }
    }
}

/// Flatten a single work item. `workitems-workItemId` is the first of the
/// item's keys when present (merged metadata columns still precede it).
pub fn flatten_work_item(item: &Map<String, Value>) -> FlatRecord {
    let mut record = FlatRecord::new();
    if let Some(id) = item.get(WORK_ITEM_ID_KEY) {
        record.insert(join_key(WORK_ITEMS_KEY, WORK_ITEM_ID_KEY), id.clone());
    }
    for (key, value) in item {
        if key == WORK_ITEM_ID_KEY {
            continue;
        }
        let path = join_key(WORK_ITEMS_KEY, key);
        match value {
            Value::Object(nested) if key == INPUT_DATA_KEY => {
                flatten_input_data(nested, &path, &mut record)
            }
            Value::Object(nested) => flatten_into(nested, &path, &mut record),
            leaf => record.insert(path, leaf.clone()),
        }
    }
    record
}

fn flatten_input_data(input: &Map<String, Value>, prefix: &str, record: &mut FlatRecord) {
    let mut images: Vec<(u64, &Value)> = Vec::new();
    for (key, value) in input {
        if let Some(index) = image_index(key) {
            images.push((index, value));
            continue;
        }
        let path = join_key(prefix, key);
        match value {
            Value::Object(nested) => flatten_into(nested, &path, record),
            leaf => record.insert(path, leaf.clone()),
        }
    }
    if images.is_empty() {
        return;
    }
    // Stable: equal indices keep the order they were encountered in.
    images.sort_by_key(|(index, _)| *index);
    let joined = images
        .iter()
        .map(|(_, value)| render(value))
        .collect::<Vec<_>>()
        .join(IMAGE_SEPARATOR);
    record.insert(join_key(prefix, IMAGE_KEY), Value::String(joined));
}

/// Build a table with one row per work item from a parsed document.
pub fn build_document_table(document: &Value) -> Result<FlatTable, FlattenError> {
    let root = document
        .as_object()
        .ok_or_else(|| FlattenError::UnexpectedShape {
            field: "<document>".to_string(),
            expected: "a JSON object",
        })?;

    let file_metadata = match root.get(FILE_METADATA_KEY) {
        None | Some(Value::Null) => FlatRecord::new(),
        Some(Value::Object(map)) => flatten(map, FILE_METADATA_KEY),
        Some(_) => {
            return Err(FlattenError::UnexpectedShape {
                field: FILE_METADATA_KEY.to_string(),
                expected: "an object",
            })
        }
    };

    let items: &[Value] = match root.get(WORK_ITEMS_KEY) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            return Err(FlattenError::UnexpectedShape {
                field: WORK_ITEMS_KEY.to_string(),
                expected: "a list",
            })
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item = item.as_object().ok_or_else(|| FlattenError::UnexpectedShape {
            field: format!("{WORK_ITEMS_KEY}[{index}]"),
            expected: "an object",
        })?;
        records.push(FlatRecord::overlay(&file_metadata, flatten_work_item(item)));
    }
    debug!(
        work_items = records.len(),
        metadata_keys = file_metadata.len(),
        "Flattened document"
    );
    Ok(FlatTable::from_records(records))
}

/// Parse raw JSON bytes and flatten them.
pub fn flatten_document(bytes: &[u8]) -> Result<FlatTable, FlattenError> {
    let document: Value = serde_json::from_slice(bytes)?;
    build_document_table(&document)
}
