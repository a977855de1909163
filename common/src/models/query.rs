//! Table data models.
//!
//! Contains the request parameters and result shapes of paginated table
//! reads.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// One row, column name → decoded value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 100;

/// Longest accepted search term, in characters.
const MAX_SEARCH_LEN: u64 = 256;

/// Optional schema selector.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SchemaQuery {
    /// Schema name; the database's default schema when absent.
    pub schema: Option<String>,
}

impl SchemaQuery {
    /// The schema, treating `?schema=` as absent.
    pub fn schema(&self) -> Option<&str> {
        non_empty(self.schema.as_deref())
    }
}

/// Query parameters of a table data request.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DataQuery {
    /// Schema name; the database's default schema when absent.
    pub schema: Option<String>,

    /// Page size (default: 100).
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: u32,

    /// Rows to skip (default: 0).
    #[serde(default)]
    pub offset: u64,

    /// Case-insensitive substring filter applied to every column.
    #[serde(default)]
    #[validate(length(max = MAX_SEARCH_LEN, message = "search must be at most 256 characters"))]
    pub search: String,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for DataQuery {
    fn default() -> Self {
        Self {
            schema: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            search: String::new(),
        }
    }
}

impl DataQuery {
    /// The schema, treating `?schema=` as absent.
    pub fn schema(&self) -> Option<&str> {
        non_empty(self.schema.as_deref())
    }

    /// Validates the parameters against the configured page ceiling.
    ///
    /// # Errors
    /// Returns `AppError::Validation` when a field is out of range.
    pub fn check(&self, max_page_limit: u32) -> AppResult<()> {
        self.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if self.limit > max_page_limit {
            return Err(AppError::Validation(format!(
                "limit must be at most {}",
                max_page_limit
            )));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Result of a table read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSlice {
    /// Column names in driver order.
    pub columns: Vec<String>,
    /// Rows in result order.
    pub rows: Vec<Row>,
}

/// Pagination metadata returned with table data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataMetadata {
    pub table_name: String,
    /// Logical database key.
    pub database: String,
    /// Present only when the caller selected a schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub limit: u32,
    pub offset: u64,
    /// Rows in this page.
    pub total_rows: usize,
    /// `total_rows == limit`. Reports a phantom next page when exactly
    /// `limit` rows remain.
    pub has_more: bool,
}

/// `GET /api/databases/{key}/data/{table}` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableDataResponse {
    pub columns: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,
    pub metadata: DataMetadata,
}

impl TableDataResponse {
    pub fn new(
        table_name: &str,
        database_key: &str,
        schema: Option<&str>,
        query: &DataQuery,
        slice: TableSlice,
    ) -> Self {
        let total_rows = slice.rows.len();
        Self {
            metadata: DataMetadata {
                table_name: table_name.to_string(),
                database: database_key.to_string(),
                schema: schema.map(str::to_string),
                limit: query.limit,
                offset: query.offset,
                total_rows,
                has_more: total_rows == query.limit as usize,
            },
            columns: slice.columns,
            rows: slice.rows,
        }
    }
}
