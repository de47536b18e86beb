//! Tabular codec for the raw TSV dumps and the cleaned CSV artifacts
//!
//! The IMDb dumps are tab separated with a header line. Double quotes are
//! honoured as quoting characters, which is exactly how a title beginning
//! with `"` can swallow the tab after it and merge two columns into one;
//! `repair` undoes that. Rows shorter than the header are padded with empty
//! cells so every column position exists.

use imdb_common::Result;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// One decoded line of a raw dump, before repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the source file
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// A fully materialized file: header plus data rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

fn collect_rows<R: Read>(mut reader: csv::Reader<R>, pad: bool) -> Result<Table> {
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let width = header.len();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
        if pad && fields.len() < width {
            fields.resize(width, String::new());
        }
        rows.push(RawRow::new(line, fields));
    }

    Ok(Table { header, rows })
}

/// Decode a tab-separated dump from any reader
pub fn parse_tsv<R: Read>(input: R) -> Result<Table> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    collect_rows(reader, true)
}

pub fn read_tsv(path: &Path) -> Result<Table> {
    parse_tsv(BufReader::new(File::open(path)?))
}

/// Decode a cleaned comma-separated artifact. Every row must match the header width.
pub fn parse_csv<R: Read>(input: R) -> Result<Table> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(input);
    collect_rows(reader, false)
}

pub fn read_csv(path: &Path) -> Result<Table> {
    parse_csv(BufReader::new(File::open(path)?))
}

/// Encode rows as CSV; absent cells are written as empty fields
pub fn write_csv<W, I, R>(output: W, header: &[String], rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: AsRef<[Option<String>]>,
{
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row.as_ref().iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}
