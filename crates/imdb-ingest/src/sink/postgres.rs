//! PostgreSQL sink
//!
//! One connection, one transaction per table, one savepoint per row. A
//! failed statement aborts a PostgreSQL transaction, so each insert runs
//! inside `SAVEPOINT row_insert` and a rejected row is rolled back to it
//! without losing the rows before it.

use async_trait::async_trait;
use imdb_common::{IngestError, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Connection, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{InsertError, Sink};
use crate::config::DatabaseConfig;
use crate::credentials::Credentials;
use crate::schema::{SqlValue, TableSchema};

/// SQLSTATE codes the sink reacts to
mod sqlstate {
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    pub const DUPLICATE_DATABASE: &str = "42P04";
    pub const DUPLICATE_TABLE: &str = "42P07";
}

fn has_code(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|c| c == code)
}

pub struct PgSink {
    options: PgConnectOptions,
    database: String,
    maintenance_database: String,
    connect_timeout: Duration,
    pool: Option<PgPool>,
    tx: Option<Transaction<'static, Postgres>>,
    /// Insert statements by table name
    inserts: HashMap<&'static str, Arc<str>>,
}

impl PgSink {
    pub fn new(config: &DatabaseConfig, credentials: &Credentials) -> Self {
        let options = PgConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.user)
            .password(credentials.secret.expose_secret())
            .application_name("imdb-ingest");

        Self {
            options,
            database: config.name.clone(),
            maintenance_database: config.maintenance_database.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            pool: None,
            tx: None,
            inserts: HashMap::new(),
        }
    }

    async fn connect(&self, database: &str) -> std::result::Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.options.clone().database(database))
            .await
    }

    async fn create_database(&self) -> Result<()> {
        let mut conn =
            PgConnection::connect_with(&self.options.clone().database(&self.maintenance_database))
                .await?;

        let sql = format!("CREATE DATABASE \"{}\"", self.database);
        match sqlx::query(&sql).execute(&mut conn).await {
            Ok(_) => info!(database = %self.database, "Database created"),
            Err(e) if has_code(&e, sqlstate::DUPLICATE_DATABASE) => {
                info!(database = %self.database, "Database already exists")
            },
            Err(e) => return Err(e.into()),
        }

        conn.close().await?;
        Ok(())
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| IngestError::config("Sink used before a database was selected"))
    }

    /// Insert statement for `schema`, built once per table
    fn insert_statement(&mut self, schema: &TableSchema) -> Arc<str> {
        self.inserts
            .entry(schema.name)
            .or_insert_with(|| Arc::from(schema.insert_sql()))
            .clone()
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        if self.tx.is_none() {
            let tx = self.pool()?.begin().await?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| IngestError::config("Transaction was not started"))
    }
}

fn bind_values<'q>(sql: &'q str, values: &'q [SqlValue]) -> Query<'q, Postgres, PgArguments> {
    values.iter().fold(sqlx::query(sql), |query, value| match value {
        SqlValue::Text(v) => query.bind(v.as_deref()),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::SmallInt(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(v.clone()),
    })
}

#[async_trait]
impl Sink for PgSink {
    async fn select_or_create_database(&mut self) -> Result<()> {
        info!(database = %self.database, "Connecting to database");

        let pool = match self.connect(&self.database).await {
            Ok(pool) => pool,
            Err(e) if has_code(&e, sqlstate::INVALID_CATALOG_NAME) => {
                info!(database = %self.database, "Database does not exist, creating it");
                self.create_database().await?;
                self.connect(&self.database).await?
            },
            Err(e) => return Err(e.into()),
        };

        self.pool = Some(pool);
        info!(database = %self.database, "Connected to database");
        Ok(())
    }

    async fn create_table_if_absent(&mut self, schema: &TableSchema) -> Result<bool> {
        let ddl = schema.ddl();
        match sqlx::query(&ddl).execute(self.pool()?).await {
            Ok(_) => {
                info!(table = schema.name, "Created table");
                Ok(true)
            },
            Err(e) if has_code(&e, sqlstate::DUPLICATE_TABLE) => {
                info!(table = schema.name, "Table already exists");
                Ok(false)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(
        &mut self,
        schema: &TableSchema,
        values: &[SqlValue],
    ) -> std::result::Result<(), InsertError> {
        let sql = self.insert_statement(schema);
        let tx = self.transaction().await?;

        sqlx::query("SAVEPOINT row_insert")
            .execute(&mut **tx)
            .await
            .map_err(IngestError::from)?;

        match bind_values(&sql, values).execute(&mut **tx).await {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT row_insert")
                    .execute(&mut **tx)
                    .await
                    .map_err(IngestError::from)?;
                Ok(())
            },
            Err(e) if e.as_database_error().is_some() => {
                sqlx::query("ROLLBACK TO SAVEPOINT row_insert")
                    .execute(&mut **tx)
                    .await
                    .map_err(IngestError::from)?;
                Err(InsertError::Rejected(e.to_string()))
            },
            Err(e) => Err(IngestError::from(e).into()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(database = %self.database, "Committed");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping an open transaction rolls it back
        self.tx = None;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!(database = %self.database, "Connection closed");
        }
        Ok(())
    }
}
