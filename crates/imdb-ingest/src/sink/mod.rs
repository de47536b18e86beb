//! Relational sink abstraction
//!
//! The pipeline talks to the database only through [`Sink`], so the bulk
//! loader can be exercised against an in-memory implementation in tests.
//! [`postgres::PgSink`] is the production implementation.

use async_trait::async_trait;
use imdb_common::{IngestError, Result};
use thiserror::Error;

use crate::schema::{SqlValue, TableSchema};

pub mod postgres;

pub use postgres::PgSink;

/// Why a single insert did not happen
#[derive(Debug, Error)]
pub enum InsertError {
    /// The row was refused (constraint violation, bad value). The batch continues.
    #[error("{0}")]
    Rejected(String),

    /// The sink itself failed. The table load is aborted.
    #[error("sink failure: {0}")]
    Connection(#[from] IngestError),
}

#[async_trait]
pub trait Sink: Send {
    /// Select the target database, creating it first if it does not exist
    async fn select_or_create_database(&mut self) -> Result<()>;

    /// Create the table; `false` when it already existed
    async fn create_table_if_absent(&mut self, schema: &TableSchema) -> Result<bool>;

    /// Insert one row of positional values in schema column order
    async fn insert(
        &mut self,
        schema: &TableSchema,
        values: &[SqlValue],
    ) -> std::result::Result<(), InsertError>;

    /// Make every successful insert since the last commit durable
    async fn commit(&mut self) -> Result<()>;

    /// Release the connection; uncommitted work is discarded
    async fn close(&mut self) -> Result<()>;
}
