//! Schema and table metadata models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A schema inside a warehouse database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SchemaRef {
    /// Schema name as reported by the warehouse.
    pub name: String,
    /// Lower-cased name.
    pub key: String,
}

impl SchemaRef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.to_lowercase(),
            name,
        }
    }
}

/// A table or view inside a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableRef {
    /// Table name as reported by the warehouse.
    pub name: String,
    /// Lower-cased name.
    pub key: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.to_lowercase(),
            name,
        }
    }
}

/// `GET /api/databases/{key}/schemas` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchemasResponse {
    pub schemas: Vec<SchemaRef>,
}

/// `GET /api/databases/{key}/tables` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TablesResponse {
    pub tables: Vec<TableRef>,
}

/// One column of a table description, in driver order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Declared data type.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Column kind (`COLUMN` for regular columns).
    pub kind: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<String>,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Part of a unique constraint.
    pub unique_key: bool,
    /// Check constraint text.
    pub check: Option<String>,
    /// Generation expression for computed columns.
    pub expression: Option<String>,
    /// Column comment.
    pub comment: Option<String>,
}

impl ColumnDescriptor {
    /// A plain nullable column with no constraints.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            kind: "COLUMN".to_string(),
            nullable: true,
            default: None,
            primary_key: false,
            unique_key: false,
            check: None,
            expression: None,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// `GET /api/databases/{key}/tables/{table}/info` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    pub table_name: String,
    /// Logical database key.
    pub database: String,
    /// Schema the table was resolved in.
    pub schema: String,
    pub columns: Vec<ColumnDescriptor>,
}
