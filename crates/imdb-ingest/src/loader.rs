//! Bulk loader
//!
//! Inserts every record of one table through a [`Sink`], one row at a time.
//! A row the sink refuses is counted and skipped; the rest of the batch
//! continues. All surviving inserts become durable in a single commit at
//! the end of the table.

use imdb_common::Result;
use std::fmt;
use tracing::{debug, info, warn};

use crate::schema::{Record, TableSchema};
use crate::sink::{InsertError, Sink};

/// Number of row failures echoed to the log
const SAMPLE_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Pending,
    Inserting,
    Committing,
    Done,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Pending => write!(f, "pending"),
            LoadPhase::Inserting => write!(f, "inserting"),
            LoadPhase::Committing => write!(f, "committing"),
            LoadPhase::Done => write!(f, "done"),
        }
    }
}

/// A row that was not inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Natural key, or `None` when the key cell was empty
    pub key: Option<String>,
    pub cause: String,
}

/// Result of loading one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub table: &'static str,
    pub inserted: usize,
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
}

impl LoadOutcome {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            inserted: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    fn skip(&mut self, record: &Record, cause: String) {
        self.skipped += 1;
        self.failures.push(RowFailure {
            key: record.key().map(str::to_string),
            cause,
        });
    }

    /// Keys of the skipped rows, in input order
    pub fn skipped_keys(&self) -> Vec<Option<&str>> {
        self.failures.iter().map(|f| f.key.as_deref()).collect()
    }
}

fn enter(table: &str, phase: LoadPhase) -> LoadPhase {
    debug!(table, phase = %phase, "Load phase");
    phase
}

/// Insert `records` into `schema`'s table and commit once at the end.
///
/// Coercion failures and sink rejections skip the row. A sink failure
/// aborts the load without committing and is returned as the error.
pub async fn load<S>(sink: &mut S, schema: &'static TableSchema, records: &[Record]) -> Result<LoadOutcome>
where
    S: Sink + ?Sized,
{
    enter(schema.name, LoadPhase::Pending);
    let mut outcome = LoadOutcome::new(schema.name);

    info!(table = schema.name, rows = records.len(), "Loading table");
    let phase = enter(schema.name, LoadPhase::Inserting);

    for record in records {
        let values = match schema.coerce(record) {
            Ok(values) => values,
            Err(cause) => {
                outcome.skip(record, cause);
                continue;
            },
        };

        match sink.insert(schema, &values).await {
            Ok(()) => outcome.inserted += 1,
            Err(InsertError::Rejected(cause)) => outcome.skip(record, cause),
            Err(InsertError::Connection(e)) => {
                warn!(
                    table = schema.name,
                    phase = %phase,
                    inserted = outcome.inserted,
                    error = %e,
                    "Load aborted, nothing committed"
                );
                return Err(e);
            },
        }
    }

    enter(schema.name, LoadPhase::Committing);
    sink.commit().await?;
    enter(schema.name, LoadPhase::Done);

    if outcome.skipped > 0 {
        warn!(
            table = schema.name,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            "Load completed with skipped rows"
        );

        for failure in outcome.failures.iter().take(SAMPLE_ERRORS) {
            warn!(
                key = failure.key.as_deref().unwrap_or("<none>"),
                error = %failure.cause,
                "Sample error"
            );
        }

        if outcome.skipped > SAMPLE_ERRORS {
            warn!(
                additional_errors = outcome.skipped - SAMPLE_ERRORS,
                "Additional errors not shown"
            );
        }
    }

    info!(
        table = schema.name,
        "Inserted {} rows, skipped {} rows",
        outcome.inserted,
        outcome.skipped
    );

    Ok(outcome)
}
