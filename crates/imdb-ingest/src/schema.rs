//! Table schemas for the two IMDb datasets and the records loaded into them
//!
//! Schemas are static: column order is the positional order of both the
//! tabular artifacts and the `INSERT` statements built from them.

use imdb_common::{IngestError, Result};
use sqlx::types::BigDecimal;
use std::fmt::Write as _;
use std::str::FromStr;

/// Semantic type of a column, mapped onto a PostgreSQL type in DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text { max_len: u32 },
    Bool,
    SmallInt,
    Int,
    Decimal { precision: u8, scale: u8 },
}

impl ColumnType {
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Text { max_len } => format!("varchar({})", max_len),
            ColumnType::Bool => "bool".to_string(),
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Int => "int".to_string(),
            ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
        }
    }

    /// Convert a normalized cell into a typed bind value.
    ///
    /// Width and precision limits are left to the database; only values
    /// that cannot be represented in the column's type at all are rejected.
    pub fn coerce(&self, cell: Option<&str>) -> std::result::Result<SqlValue, String> {
        let Some(raw) = cell else {
            return Ok(self.null());
        };

        match self {
            ColumnType::Text { .. } => Ok(SqlValue::Text(Some(raw.to_string()))),
            ColumnType::Bool => match raw {
                "1" | "true" | "t" => Ok(SqlValue::Bool(Some(true))),
                "0" | "false" | "f" => Ok(SqlValue::Bool(Some(false))),
                other => Err(format!("invalid bool value '{}'", other)),
            },
            ColumnType::SmallInt => raw
                .parse::<i16>()
                .map(|v| SqlValue::SmallInt(Some(v)))
                .map_err(|e| format!("invalid smallint value '{}': {}", raw, e)),
            ColumnType::Int => raw
                .parse::<i32>()
                .map(|v| SqlValue::Int(Some(v)))
                .map_err(|e| format!("invalid int value '{}': {}", raw, e)),
            ColumnType::Decimal { .. } => BigDecimal::from_str(raw)
                .map(|v| SqlValue::Decimal(Some(v)))
                .map_err(|e| format!("invalid decimal value '{}': {}", raw, e)),
        }
    }

    fn null(&self) -> SqlValue {
        match self {
            ColumnType::Text { .. } => SqlValue::Text(None),
            ColumnType::Bool => SqlValue::Bool(None),
            ColumnType::SmallInt => SqlValue::SmallInt(None),
            ColumnType::Int => SqlValue::Int(None),
            ColumnType::Decimal { .. } => SqlValue::Decimal(None),
        }
    }
}

/// A typed positional parameter. Nulls stay typed so the server sees the
/// column's own type rather than `text`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    Decimal(Option<BigDecimal>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::SmallInt(v) => v.is_none(),
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Decimal(v) => v.is_none(),
        }
    }
}

/// Role a column plays in the table's keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Primary,
    Foreign {
        table: &'static str,
        column: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub key: KeyRole,
}

impl Column {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: true,
            key: KeyRole::None,
        }
    }

    pub const fn primary(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            key: KeyRole::Primary,
        }
    }

    pub const fn foreign(
        name: &'static str,
        column_type: ColumnType,
        table: &'static str,
        column: &'static str,
    ) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            key: KeyRole::Foreign { table, column },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Free-text column that can absorb the auxiliary column directly after
    /// it when a quoted value swallows the separator between them
    pub free_text: Option<usize>,
}

impl TableSchema {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Index of the dataset-provided identifier: the primary key, or the
    /// foreign key for tables without one.
    pub fn natural_key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c.key == KeyRole::Primary)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| matches!(c.key, KeyRole::Foreign { .. }))
            })
            .unwrap_or(0)
    }

    /// `CREATE TABLE` statement for this schema
    pub fn ddl(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("\"{}\" {}", c.name, c.column_type.sql_type());
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();

        for column in self.columns {
            match column.key {
                KeyRole::Primary => lines.push(format!("PRIMARY KEY (\"{}\")", column.name)),
                KeyRole::Foreign { table, column: target } => lines.push(format!(
                    "FOREIGN KEY (\"{}\") REFERENCES {}(\"{}\")",
                    column.name, table, target
                )),
                KeyRole::None => {},
            }
        }

        let mut ddl = format!("CREATE TABLE {} (\n", self.name);
        for (i, line) in lines.iter().enumerate() {
            let sep = if i + 1 < lines.len() { "," } else { "" };
            let _ = writeln!(ddl, "    {}{}", line, sep);
        }
        ddl.push(')');
        ddl
    }

    /// Positional `INSERT` statement matching the column order
    pub fn insert_sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.width()).map(|i| format!("${}", i)).collect();
        format!("INSERT INTO {} VALUES ({})", self.name, placeholders.join(", "))
    }

    /// Check that a header row names exactly this schema's columns, in order
    pub fn check_header(&self, header: &[String]) -> Result<()> {
        let expected = self.column_names();
        if header.len() != expected.len()
            || header.iter().zip(&expected).any(|(got, want)| got != want)
        {
            return Err(IngestError::schema(format!(
                "{}: header {:?} does not match columns {:?}",
                self.name, header, expected
            )));
        }
        Ok(())
    }

    /// Convert every cell of a record into its typed bind value
    pub fn coerce(&self, record: &Record) -> std::result::Result<Vec<SqlValue>, String> {
        self.columns
            .iter()
            .zip(record.values())
            .map(|(column, cell)| {
                column
                    .column_type
                    .coerce(cell.as_deref())
                    .map_err(|e| format!("column {}: {}", column.name, e))
            })
            .collect()
    }
}

pub static TITLE_BASICS: TableSchema = TableSchema {
    name: "title_basics",
    columns: &[
        Column::primary("tconst", ColumnType::Text { max_len: 20 }),
        Column::new("titleType", ColumnType::Text { max_len: 20 }),
        Column::new("primaryTitle", ColumnType::Text { max_len: 1000 }),
        Column::new("originalTitle", ColumnType::Text { max_len: 1000 }),
        Column::new("isAdult", ColumnType::Bool),
        Column::new("startYear", ColumnType::SmallInt),
        Column::new("endYear", ColumnType::SmallInt),
        Column::new("runtimeMinutes", ColumnType::Int),
        Column::new("genres", ColumnType::Text { max_len: 255 }),
    ],
    free_text: Some(2),
};

pub static TITLE_RATINGS: TableSchema = TableSchema {
    name: "title_ratings",
    columns: &[
        Column::foreign(
            "tconst",
            ColumnType::Text { max_len: 20 },
            "title_basics",
            "tconst",
        ),
        Column::new(
            "averageRating",
            ColumnType::Decimal {
                precision: 3,
                scale: 1,
            },
        ),
        Column::new("numVotes", ColumnType::Int),
    ],
    free_text: None,
};

/// Tables in the order they must be loaded: referenced tables first
pub static LOAD_ORDER: [&TableSchema; 2] = [&TITLE_BASICS, &TITLE_RATINGS];

/// Look up the schema a dataset's base name loads into
pub fn for_table(name: &str) -> Option<&'static TableSchema> {
    LOAD_ORDER.iter().copied().find(|schema| schema.name == name)
}

/// One row of a table, validated against its schema's width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<Option<String>>,
    key_index: usize,
}

impl Record {
    pub fn new(schema: &TableSchema, values: Vec<Option<String>>) -> Result<Self> {
        if values.len() != schema.width() {
            return Err(IngestError::schema(format!(
                "{}: expected {} fields, got {}",
                schema.name,
                schema.width(),
                values.len()
            )));
        }
        Ok(Self {
            values,
            key_index: schema.natural_key_index(),
        })
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Natural key, or `None` when the key cell itself is absent
    pub fn key(&self) -> Option<&str> {
        self.values[self.key_index].as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cells(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_lookup_and_load_order() {
        assert_eq!(for_table("title_basics"), Some(&TITLE_BASICS));
        assert_eq!(for_table("title_ratings"), Some(&TITLE_RATINGS));
        assert_eq!(for_table("name_basics"), None);
        assert_eq!(LOAD_ORDER[0].name, "title_basics");
    }

    #[test]
    fn test_basics_ddl() {
        let ddl = TITLE_BASICS.ddl();
        assert!(ddl.starts_with("CREATE TABLE title_basics (\n"));
        assert!(ddl.contains("\"tconst\" varchar(20) NOT NULL,"));
        assert!(ddl.contains("\"isAdult\" bool,"));
        assert!(ddl.contains("\"runtimeMinutes\" int,"));
        assert!(ddl.trim_end().ends_with("PRIMARY KEY (\"tconst\")\n)"));
    }

    #[test]
    fn test_ratings_ddl_references_basics() {
        let ddl = TITLE_RATINGS.ddl();
        assert!(ddl.contains("\"averageRating\" decimal(3, 1),"));
        assert!(ddl.contains("FOREIGN KEY (\"tconst\") REFERENCES title_basics(\"tconst\")"));
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_insert_sql_is_positional() {
        assert_eq!(
            TITLE_RATINGS.insert_sql(),
            "INSERT INTO title_ratings VALUES ($1, $2, $3)"
        );
        assert_eq!(TITLE_BASICS.insert_sql().matches('$').count(), 9);
    }

    #[test]
    fn test_record_width_is_validated() {
        let ok = Record::new(&TITLE_RATINGS, cells(&[Some("tt1"), Some("5.6"), Some("10")]));
        assert_eq!(ok.unwrap().key(), Some("tt1"));

        let short = Record::new(&TITLE_RATINGS, cells(&[Some("tt1"), Some("5.6")]));
        assert!(matches!(short, Err(IngestError::Schema(_))));
    }

    #[test]
    fn test_header_check() {
        let header: Vec<String> = TITLE_RATINGS.column_names().iter().map(|s| s.to_string()).collect();
        assert!(TITLE_RATINGS.check_header(&header).is_ok());
        assert!(TITLE_BASICS.check_header(&header).is_err());
    }

    #[test]
    fn test_coerce_typed_values() {
        let record = Record::new(
            &TITLE_BASICS,
            cells(&[
                Some("tt0000001"),
                Some("short"),
                Some("Carmencita"),
                Some("Carmencita"),
                Some("0"),
                Some("1894"),
                None,
                Some("1"),
                Some("Documentary,Short"),
            ]),
        )
        .unwrap();

        let values = TITLE_BASICS.coerce(&record).unwrap();
        assert_eq!(values[4], SqlValue::Bool(Some(false)));
        assert_eq!(values[5], SqlValue::SmallInt(Some(1894)));
        assert_eq!(values[6], SqlValue::SmallInt(None));
        assert!(values[6].is_null());
        assert_eq!(values[7], SqlValue::Int(Some(1)));
    }

    #[test]
    fn test_coerce_rejects_malformed_cell() {
        let record = Record::new(&TITLE_RATINGS, cells(&[Some("tt1"), Some("high"), Some("10")])).unwrap();
        let err = TITLE_RATINGS.coerce(&record).unwrap_err();
        assert!(err.starts_with("column averageRating: invalid decimal value 'high'"));
    }
}
