//! Warehouse driver abstraction.
//!
//! A [`WarehouseConnector`] opens one [`WarehouseSession`] per logical
//! database. A session is bound to the database it was opened for and owns
//! its own connection pool.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use common::config::{DatabaseConfig, PoolSettings};
use common::models::{ColumnDescriptor, TableSlice};
use thiserror::Error;

pub use postgres::PgConnector;

/// Result alias for driver calls.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors raised by a warehouse driver.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("invalid connection settings: {0}")]
    Settings(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

/// SQL text with positional `$n` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends the next positional parameter.
    pub fn bind(mut self, param: SqlParam) -> Self {
        self.params.push(param);
        self
    }
}

/// Opens warehouse sessions.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Opens a session for `config`. Must fail if the warehouse cannot be
    /// reached.
    async fn connect(
        &self,
        config: &DatabaseConfig,
        pool: &PoolSettings,
    ) -> WarehouseResult<Arc<dyn WarehouseSession>>;
}

/// An open, pooled connection to one warehouse database.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Runs a trivial round trip.
    async fn ping(&self) -> WarehouseResult<()>;

    /// Names of every database visible to the session.
    async fn list_databases(&self) -> WarehouseResult<Vec<String>>;

    /// Schema names of the bound database, in warehouse order.
    async fn list_schemas(&self) -> WarehouseResult<Vec<String>>;

    /// Table and view names of `schema`, in warehouse order.
    async fn list_tables(&self, schema: &str) -> WarehouseResult<Vec<String>>;

    /// Column descriptions of `schema.table`. Empty when the table does not
    /// exist.
    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> WarehouseResult<Vec<ColumnDescriptor>>;

    /// Executes a read statement. Column names are reported even when no row
    /// is returned.
    async fn query(&self, statement: &Statement) -> WarehouseResult<TableSlice>;

    /// Closes the underlying pool.
    async fn close(&self);
}
