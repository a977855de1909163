//! Table reads.
//!
//! Builds parameterized statements for paginated and searched reads and
//! describes tables. Identifiers are quoted, values are always bound.

use std::sync::Arc;

use common::errors::{AppError, AppResult};
use common::models::{TableInfo, TableSlice};
use common::utils::{contains_pattern, qualified_name, quote_ident, validate_identifier};

use crate::pool_manager::PoolManager;
use crate::warehouse::{SqlParam, Statement};

/// One page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub limit: u32,
    pub offset: u64,
    /// Empty means no filtering.
    pub search: &'a str,
}

pub struct QueryExecutor {
    pools: Arc<PoolManager>,
}

impl QueryExecutor {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }

    /// Reads one page of `table`.
    ///
    /// With a search term every column, cast to text, is matched
    /// case-insensitively as a substring; a row is kept when any column
    /// matches. The column list comes from a zero-row query of the table.
    /// Row order is whatever the warehouse returns.
    ///
    /// # Errors
    /// `UnknownDatabaseKey`, `Validation` for unusable identifiers,
    /// `ConnectionFailure`, or `FetchFailure` for anything the warehouse
    /// rejects.
    pub async fn fetch(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
        page: PageRequest<'_>,
    ) -> AppResult<TableSlice> {
        let config = self.pools.resolve(key)?;
        let table = validate_identifier("table", table)?;
        let schema = validate_identifier("schema", schema.unwrap_or(&config.schema))?;
        let session = self.pools.acquire(key).await?;

        let target = qualified_name(schema, table);
        let fetch_failed = |e: crate::warehouse::WarehouseError| {
            tracing::error!(key, schema, table, error = %e, "Table fetch failed");
            AppError::FetchFailure(table.to_string())
        };

        let statement = if page.search.is_empty() {
            page_statement(&target, page.limit, page.offset)
        } else {
            let shape = session
                .query(&shape_statement(&target))
                .await
                .map_err(fetch_failed)?;
            if shape.columns.is_empty() {
                return Ok(shape);
            }
            search_statement(&target, &shape.columns, page.search, page.limit, page.offset)
        };

        let slice = session.query(&statement).await.map_err(fetch_failed)?;
        tracing::debug!(
            key,
            schema,
            table,
            rows = slice.rows.len(),
            searched = !page.search.is_empty(),
            "Table page fetched"
        );
        Ok(slice)
    }

    /// Describes `table` in `schema`, or in the key's default schema.
    ///
    /// # Errors
    /// `UnknownDatabaseKey`, `Validation`, `ConnectionFailure`, or
    /// `TableNotFound` when the description is empty or fails.
    pub async fn describe(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
    ) -> AppResult<TableInfo> {
        let config = self.pools.resolve(key)?;
        let table = validate_identifier("table", table)?;
        let schema = validate_identifier("schema", schema.unwrap_or(&config.schema))?;
        let session = self.pools.acquire(key).await?;

        match session.describe_table(schema, table).await {
            Ok(columns) if !columns.is_empty() => Ok(TableInfo {
                table_name: table.to_string(),
                database: key.to_string(),
                schema: schema.to_string(),
                columns,
            }),
            Ok(_) => Err(AppError::TableNotFound(table.to_string())),
            Err(e) => {
                tracing::warn!(key, schema, table, error = %e, "Describe table failed");
                Err(AppError::TableNotFound(table.to_string()))
            }
        }
    }
}

fn shape_statement(target: &str) -> Statement {
    Statement::new(format!("SELECT * FROM {} LIMIT 0", target))
}

fn page_statement(target: &str, limit: u32, offset: u64) -> Statement {
    Statement::new(format!("SELECT * FROM {} LIMIT $1 OFFSET $2", target))
        .bind(SqlParam::Int(i64::from(limit)))
        .bind(SqlParam::Int(clamp_offset(offset)))
}

/// `SELECT * FROM t WHERE (CAST("a" AS TEXT) ILIKE $1 OR ...) LIMIT $2 OFFSET $3`
fn search_statement(
    target: &str,
    columns: &[String],
    term: &str,
    limit: u32,
    offset: u64,
) -> Statement {
    let filter = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT) ILIKE $1", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" OR ");

    Statement::new(format!(
        "SELECT * FROM {} WHERE ({}) LIMIT $2 OFFSET $3",
        target, filter
    ))
    .bind(SqlParam::Text(contains_pattern(term)))
    .bind(SqlParam::Int(i64::from(limit)))
    .bind(SqlParam::Int(clamp_offset(offset)))
}

fn clamp_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}
