//! Null normalization
//!
//! The dumps encode "unknown" as the literal token `\N`; decoding and
//! padding also produce empty cells. Both become `None`, which the sink
//! writes as SQL `NULL`.

use imdb_common::Result;

use crate::schema::{Record, TableSchema};
use crate::tsv::RawRow;

/// The dumps' literal null token
pub const NULL_SENTINEL: &str = "\\N";

pub fn normalize_cell(cell: &str) -> Option<String> {
    if cell.is_empty() || cell == NULL_SENTINEL {
        None
    } else {
        Some(cell.to_string())
    }
}

pub fn normalize_row(row: &RawRow) -> Vec<Option<String>> {
    row.fields.iter().map(|cell| normalize_cell(cell)).collect()
}

/// Normalize a row and validate it into a [`Record`]
pub fn normalize_record(schema: &TableSchema, row: &RawRow) -> Result<Record> {
    Record::new(schema, normalize_row(row))
}
