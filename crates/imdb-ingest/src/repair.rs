//! Row repair
//!
//! A title beginning with a double quote makes the decoder treat everything
//! up to the next quote as one value, so the free-text column absorbs the
//! tab and the auxiliary column after it. Every later column then sits one
//! slot off, and the decoder leaves a spurious empty slot at the end.
//!
//! Repair is two pure steps: [`is_candidate`] detects the pattern and
//! [`repair_row`] rebuilds the row. [`repair_table`] applies both to a whole
//! table, replacing candidates by natural key and line.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::TableSchema;
use crate::tsv::RawRow;

/// Field separator of the raw dumps
pub const SEPARATOR: char = '\t';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("free-text value contains {count} separators; only a two-way split is supported")]
    MultipleSeparators { count: usize },

    #[error("{fields} fields cannot be realigned to {width} columns")]
    Misaligned { fields: usize, width: usize },
}

/// A candidate row that could not be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrepairedRow {
    pub key: String,
    pub line: u64,
    pub error: RepairError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Input rows in their original order with candidates replaced; rows
    /// that could not be repaired are left out
    pub rows: Vec<RawRow>,
    pub repaired: usize,
    pub unrepaired: Vec<UnrepairedRow>,
}

/// True when the schema's free-text value still contains the separator
pub fn is_candidate(schema: &TableSchema, row: &RawRow) -> bool {
    schema
        .free_text
        .and_then(|index| row.field(index))
        .is_some_and(|value| value.contains(SEPARATOR))
}

/// Rebuild a candidate row to exactly the schema's width.
///
/// The free-text value is split once: the first part stays, the second
/// becomes the auxiliary column. Of the values after the free-text column,
/// the trailing empty slot and any stale value left in the auxiliary slot
/// are dropped, keeping the last `width - field - 2` values for the
/// remaining columns. Rows that are not candidates are returned unchanged.
pub fn repair_row(schema: &TableSchema, row: &RawRow) -> Result<RawRow, RepairError> {
    let Some(index) = schema.free_text else {
        return Ok(row.clone());
    };
    let Some(value) = row.field(index) else {
        return Ok(row.clone());
    };

    let count = value.matches(SEPARATOR).count();
    if count == 0 {
        return Ok(row.clone());
    }
    if count > 1 {
        return Err(RepairError::MultipleSeparators { count });
    }

    let width = schema.width();
    let misaligned = RepairError::Misaligned {
        fields: row.fields.len(),
        width,
    };
    let Some((part_a, part_b)) = value.split_once(SEPARATOR) else {
        return Err(misaligned);
    };
    let Some(downstream) = width.checked_sub(index + 2) else {
        return Err(misaligned);
    };

    let mut tail = &row.fields[index + 1..];
    if tail.last().is_some_and(|last| last.is_empty()) {
        tail = &tail[..tail.len() - 1];
    }
    // At most the one stale auxiliary value may be discarded
    if tail.len() < downstream || tail.len() > downstream + 1 {
        return Err(misaligned);
    }
    let tail = &tail[tail.len() - downstream..];

    let mut fields = Vec::with_capacity(width);
    fields.extend_from_slice(&row.fields[..index]);
    fields.push(part_a.to_string());
    fields.push(part_b.to_string());
    fields.extend_from_slice(tail);

    Ok(RawRow::new(row.line, fields))
}

fn row_key(schema: &TableSchema, row: &RawRow) -> String {
    row.field(schema.natural_key_index()).unwrap_or_default().to_string()
}

/// Detect and repair every candidate of a table
pub fn repair_table(schema: &TableSchema, rows: Vec<RawRow>) -> RepairOutcome {
    if schema.free_text.is_none() {
        return RepairOutcome {
            rows,
            ..Default::default()
        };
    }

    // Keyed by line too: a dump can repeat a natural key
    let mut fixes: HashMap<(String, u64), RawRow> = HashMap::new();
    let mut unrepaired = Vec::new();

    for row in rows.iter().filter(|row| is_candidate(schema, row)) {
        let key = row_key(schema, row);
        match repair_row(schema, row) {
            Ok(fixed) => {
                debug!(table = schema.name, key = %key, line = row.line, "Repaired row");
                fixes.insert((key, row.line), fixed);
            },
            Err(error) => {
                warn!(
                    table = schema.name,
                    key = %key,
                    line = row.line,
                    error = %error,
                    "Row left unrepaired and excluded"
                );
                unrepaired.push(UnrepairedRow {
                    key,
                    line: row.line,
                    error,
                });
            },
        }
    }

    let repaired = fixes.len();
    let rows = rows
        .into_iter()
        .filter_map(|row| {
            if !is_candidate(schema, &row) {
                return Some(row);
            }
            fixes.remove(&(row_key(schema, &row), row.line))
        })
        .collect();

    if repaired > 0 || !unrepaired.is_empty() {
        info!(
            table = schema.name,
            repaired,
            unrepaired = unrepaired.len(),
            "Fixed {} row(s)",
            repaired
        );
    }

    RepairOutcome {
        rows,
        repaired,
        unrepaired,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{TITLE_BASICS, TITLE_RATINGS};

    fn row(line: u64, fields: &[&str]) -> RawRow {
        RawRow::new(line, fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn test_detects_only_split_free_text() {
        let broken = row(2, &["tt1", "movie", "Part A\tPart B", "0", "1990", "\\N", "90", "Drama", ""]);
        let clean = row(3, &["tt2", "movie", "Title", "Title", "0", "1990", "\\N", "90", "Drama"]);

        assert!(is_candidate(&TITLE_BASICS, &broken));
        assert!(!is_candidate(&TITLE_BASICS, &clean));
        assert!(!is_candidate(&TITLE_RATINGS, &row(2, &["tt1\tx", "5.0", "3"])));
    }

    #[test]
    fn test_repairs_row_with_extra_segment() {
        let broken = row(
            7,
            &["id1", "type", "Part A\tPart B", "orig", "0", "1990", "", "90", "Drama", ""],
        );
        let fixed = repair_row(&TITLE_BASICS, &broken).unwrap();

        assert_eq!(
            fixed.fields,
            vec!["id1", "type", "Part A", "Part B", "0", "1990", "", "90", "Drama"]
        );
        assert_eq!(fixed.line, 7);
    }

    #[test]
    fn test_repairs_shifted_row() {
        let broken = row(2, &["tt1", "movie", "Part A\tPart B", "0", "1990", "\\N", "90", "Drama", ""]);
        let fixed = repair_row(&TITLE_BASICS, &broken).unwrap();

        assert_eq!(
            fixed.fields,
            vec!["tt1", "movie", "Part A", "Part B", "0", "1990", "\\N", "90", "Drama"]
        );
    }

    #[test]
    fn test_multiple_separators_are_not_split() {
        let broken = row(2, &["tt1", "movie", "A\tB\tC", "0", "1990", "\\N", "90", "Drama", ""]);
        assert_eq!(
            repair_row(&TITLE_BASICS, &broken),
            Err(RepairError::MultipleSeparators { count: 2 })
        );
    }

    #[test]
    fn test_unalignable_row_is_rejected() {
        let broken = row(2, &["tt1", "movie", "A\tB", "0"]);
        assert!(matches!(
            repair_row(&TITLE_BASICS, &broken),
            Err(RepairError::Misaligned { fields: 4, width: 9 })
        ));
    }

    #[test]
    fn test_repair_table_keeps_order_and_reports() {
        let rows = vec![
            row(2, &["tt1", "short", "Clean", "Clean", "0", "1894", "\\N", "1", "Short"]),
            row(3, &["tt2", "movie", "Part A\tPart B", "0", "1990", "\\N", "90", "Drama", ""]),
            row(4, &["tt3", "movie", "A\tB\tC", "0", "1990", "\\N", "90", "Drama", ""]),
            row(5, &["tt4", "movie", "Last", "Last", "0", "2001", "\\N", "100", "Drama"]),
        ];

        let outcome = repair_table(&TITLE_BASICS, rows);

        assert_eq!(outcome.repaired, 1);
        assert_eq!(outcome.unrepaired.len(), 1);
        assert_eq!(outcome.unrepaired[0].key, "tt3");
        assert_eq!(outcome.unrepaired[0].line, 4);

        let keys: Vec<&str> = outcome.rows.iter().map(|r| r.fields[0].as_str()).collect();
        assert_eq!(keys, vec!["tt1", "tt2", "tt4"]);
        assert_eq!(outcome.rows[1].fields[3], "Part B");
        assert!(outcome.rows.iter().all(|r| r.fields.len() == 9));
    }

    #[test]
    fn test_repair_is_idempotent_on_clean_data() {
        let rows = vec![row(2, &["tt2", "movie", "Part A\tPart B", "0", "1990", "\\N", "90", "Drama", ""])];
        let once = repair_table(&TITLE_BASICS, rows);
        let twice = repair_table(&TITLE_BASICS, once.rows.clone());

        assert_eq!(twice.rows, once.rows);
        assert_eq!(twice.repaired, 0);
    }

    #[test]
    fn test_dependent_table_is_never_repaired() {
        let rows = vec![row(2, &["tt1", "5.6", "10"])];
        let outcome = repair_table(&TITLE_RATINGS, rows.clone());
        assert_eq!(outcome.rows, rows);
        assert_eq!(outcome.repaired, 0);
    }

    #[test]
    fn test_unrepaired_row_sharing_a_key_stays_excluded() {
        let rows = vec![
            row(2, &["tt1", "movie", "Part A\tPart B", "0", "1990", "\\N", "90", "Drama", ""]),
            row(3, &["tt1", "movie", "A\tB\tC", "0", "1990", "\\N", "90", "Drama", ""]),
        ];

        let outcome = repair_table(&TITLE_BASICS, rows);

        assert_eq!(outcome.repaired, 1);
        assert_eq!(outcome.unrepaired.len(), 1);
        assert_eq!(outcome.unrepaired[0].line, 3);
        let lines: Vec<u64> = outcome.rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2]);
        assert_eq!(outcome.rows[0].fields[2], "Part A");
    }
}
