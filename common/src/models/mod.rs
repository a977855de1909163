//! Shared data models.

pub mod database;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use database::{
    ClearCacheResponse, ConnectionStatus, ConnectionTestResponse, DatabaseRef, DatabaseStatus,
    DatabasesInfoResponse, DatabasesResponse,
};
pub use query::{DataMetadata, DataQuery, Row, SchemaQuery, TableDataResponse, TableSlice};
pub use schema::{ColumnDescriptor, SchemaRef, SchemasResponse, TableInfo, TableRef, TablesResponse};
