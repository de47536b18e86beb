//! Pipeline orchestration
//!
//! Each dataset moves through three gated stages, each producing one file:
//!
//! ```text
//! fetch       url                 -> <name>.<part>.tsv.gz
//! decompress  <name>.<part>.tsv.gz -> <name>_<part>.tsv
//! convert     <name>_<part>.tsv    -> <name>_<part>.csv   (repair + normalize)
//! ```
//!
//! Stages are resolved from the end: when the cleaned artifact exists
//! nothing upstream is touched, otherwise the missing inputs are produced
//! first. The cleaned artifacts are then loaded table by table in
//! [`LOAD_ORDER`], with a commit after each table.

use imdb_common::{IngestError, Result};
use std::fs::File;
use std::io::BufWriter;
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::DatasetDescriptor;
use crate::decompress::Decompressor;
use crate::fetch::Fetcher;
use crate::loader::{self, LoadOutcome};
use crate::normalize::{normalize_record, normalize_row};
use crate::repair::repair_table;
use crate::schema::{self, Record, TableSchema, LOAD_ORDER};
use crate::sink::Sink;
use crate::stage::{gate, partial_path, promote_partial, Stage};
use crate::tsv::{read_csv, read_tsv, write_csv};

/// A stage that did not complete; its output stays absent so the next run
/// retries it
#[derive(Debug, Error)]
#[error("{stage} stage failed for {dataset}: {error}")]
pub struct StageFailure {
    pub dataset: String,
    pub stage: Stage,
    #[source]
    pub error: IngestError,
}

/// A dataset whose cleaned artifact has been read back into records
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub schema: &'static TableSchema,
    pub records: Vec<Record>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// One outcome per loaded table, in load order
    pub loads: Vec<LoadOutcome>,
    /// Datasets that were not loaded this run
    pub failed: Vec<StageFailure>,
}

impl RunReport {
    pub fn inserted(&self) -> usize {
        self.loads.iter().map(|l| l.inserted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.loads.iter().map(|l| l.skipped).sum()
    }
}

fn schema_for(descriptor: &DatasetDescriptor) -> Result<&'static TableSchema> {
    schema::for_table(descriptor.base_name()).ok_or_else(|| {
        IngestError::config(format!(
            "No table schema for dataset '{}' ({})",
            descriptor.base_name(),
            descriptor.url()
        ))
    })
}

pub struct Pipeline<F, D> {
    fetcher: F,
    decompressor: D,
}

impl<F: Fetcher, D: Decompressor> Pipeline<F, D> {
    pub fn new(fetcher: F, decompressor: D) -> Self {
        Self {
            fetcher,
            decompressor,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn decompressor(&self) -> &D {
        &self.decompressor
    }

    /// Run every stage whose output is missing, then read the cleaned
    /// artifact into normalized records.
    pub async fn prepare(
        &self,
        descriptor: &DatasetDescriptor,
    ) -> std::result::Result<PreparedTable, StageFailure> {
        let fail = |stage: Stage| {
            move |error: IngestError| StageFailure {
                dataset: descriptor.base_name().to_string(),
                stage,
                error,
            }
        };

        let schema = schema_for(descriptor).map_err(fail(Stage::Convert))?;

        if gate(Stage::Convert, descriptor.cleaned_path()) {
            if gate(Stage::Decompress, descriptor.decompressed_path()) {
                if gate(Stage::Fetch, descriptor.compressed_path()) {
                    self.fetch(descriptor).await.map_err(fail(Stage::Fetch))?;
                }
                self.decompress(descriptor).map_err(fail(Stage::Decompress))?;
            }
            convert(schema, descriptor).map_err(fail(Stage::Convert))?;
        }

        let records = read_records(schema, descriptor).map_err(fail(Stage::Convert))?;
        info!(
            table = schema.name,
            rows = records.len(),
            path = %descriptor.cleaned_path().display(),
            "Dataset ready"
        );

        Ok(PreparedTable { schema, records })
    }

    async fn fetch(&self, descriptor: &DatasetDescriptor) -> Result<()> {
        let output = descriptor.compressed_path();
        let partial = partial_path(output);

        info!(url = descriptor.url(), "Downloading dataset");
        if let Err(e) = self.fetcher.fetch(descriptor.url(), &partial).await {
            discard(&partial);
            return Err(e);
        }
        promote_partial(output)?;
        Ok(())
    }

    fn decompress(&self, descriptor: &DatasetDescriptor) -> Result<()> {
        let output = descriptor.decompressed_path();
        let partial = partial_path(output);

        info!(archive = %descriptor.compressed_path().display(), "Decompressing dataset");
        if let Err(e) = self
            .decompressor
            .decompress(descriptor.compressed_path(), &partial)
        {
            discard(&partial);
            return Err(e);
        }
        promote_partial(output)?;
        Ok(())
    }

    /// Prepare every dataset, then load the prepared tables into `sink`.
    ///
    /// A dataset that fails to prepare is reported and left out. Failing to
    /// select or create the database, or losing the sink mid-load, is an
    /// error. The sink is closed on every path once it has been opened.
    pub async fn run<S>(&self, descriptors: &[DatasetDescriptor], sink: &mut S) -> Result<RunReport>
    where
        S: Sink + ?Sized,
    {
        for descriptor in descriptors {
            schema_for(descriptor)?;
        }

        let mut report = RunReport::default();
        let mut prepared = Vec::new();

        for descriptor in descriptors {
            match self.prepare(descriptor).await {
                Ok(table) => prepared.push(table),
                Err(failure) => {
                    warn!(
                        dataset = %failure.dataset,
                        stage = %failure.stage,
                        error = %failure.error,
                        transient = failure.error.is_transient(),
                        "Dataset not prepared, skipping its table this run"
                    );
                    report.failed.push(failure);
                },
            }
        }

        let loaded = load_tables(sink, prepared).await;
        let closed = sink.close().await;
        report.loads = loaded?;
        closed?;

        info!(
            tables = report.loads.len(),
            failed = report.failed.len(),
            inserted = report.inserted(),
            skipped = report.skipped(),
            "Pipeline finished"
        );
        Ok(report)
    }
}

async fn load_tables<S>(sink: &mut S, mut prepared: Vec<PreparedTable>) -> Result<Vec<LoadOutcome>>
where
    S: Sink + ?Sized,
{
    sink.select_or_create_database().await?;

    let mut outcomes = Vec::new();
    for schema in LOAD_ORDER {
        let (tables, rest): (Vec<_>, Vec<_>) = prepared
            .into_iter()
            .partition(|t| std::ptr::eq(t.schema, schema));
        prepared = rest;

        for table in tables {
            sink.create_table_if_absent(schema).await?;
            outcomes.push(loader::load(sink, schema, &table.records).await?);
        }
    }
    Ok(outcomes)
}

/// Repair and normalize the decompressed dump into the cleaned artifact
fn convert(schema: &TableSchema, descriptor: &DatasetDescriptor) -> Result<()> {
    let source = descriptor.decompressed_path();
    let output = descriptor.cleaned_path();

    info!(source = %source.display(), "Converting dataset");
    let table = read_tsv(source)?;
    schema.check_header(&table.header)?;

    let outcome = repair_table(schema, table.rows);
    let width = schema.width();
    let rows: Vec<Vec<Option<String>>> = outcome
        .rows
        .iter()
        .filter(|row| {
            let aligned = row.fields.len() == width;
            if !aligned {
                warn!(
                    table = schema.name,
                    line = row.line,
                    fields = row.fields.len(),
                    width,
                    "Dropping row that does not match the table width"
                );
            }
            aligned
        })
        .map(normalize_row)
        .collect();

    let partial = partial_path(output);
    let written = File::create(&partial)
        .map_err(IngestError::from)
        .and_then(|file| write_csv(BufWriter::new(file), &table.header, &rows));
    if let Err(e) = written {
        discard(&partial);
        return Err(e);
    }
    promote_partial(output)?;

    info!(
        table = schema.name,
        rows = rows.len(),
        repaired = outcome.repaired,
        unrepaired = outcome.unrepaired.len(),
        path = %output.display(),
        "Wrote cleaned dataset"
    );
    Ok(())
}

fn read_records(schema: &TableSchema, descriptor: &DatasetDescriptor) -> Result<Vec<Record>> {
    let table = read_csv(descriptor.cleaned_path())?;
    schema.check_header(&table.header)?;
    table
        .rows
        .iter()
        .map(|row| normalize_record(schema, row))
        .collect()
}

fn discard(partial: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %partial.display(), error = %e, "Failed to remove partial file");
        }
    }
}
