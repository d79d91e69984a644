//! CSV input and output for [`FlatTable`].

use std::io::{Read, Write};

use serde_json::Value;

use crate::error::TableError;
use crate::record::{FlatRecord, FlatTable};

/// Read a CSV with a header row. Every cell is kept as a string; short rows
/// are padded and duplicate header names get a `.1`, `.2`... suffix.
pub fn read_csv<R: Read>(reader: R) -> Result<FlatTable, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(TableError::MissingHeader);
    }
    let columns = dedupe_headers(headers.iter());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: FlatRecord = columns
            .iter()
            .zip(row.iter())
            .map(|(column, cell)| (column.clone(), Value::String(cell.to_string())))
            .collect();
        records.push(record);
    }
    Ok(FlatTable::with_columns(columns, records))
}

fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for header in headers {
        let mut name = header.to_string();
        let mut suffix = 0;
        while columns.contains(&name) {
            suffix += 1;
            name = format!("{header}.{suffix}");
        }
        columns.push(name);
    }
    columns
}

pub fn write_csv<W: Write>(table: &FlatTable, writer: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_csv_bytes(table: &FlatTable) -> Result<Vec<u8>, TableError> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    Ok(buffer)
}
