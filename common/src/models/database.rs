//! Database entity models.
//!
//! Contains models for warehouse database discovery.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A warehouse database as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseRef {
    /// Lower-cased database name, used as the logical key.
    pub key: String,
    /// Upper-cased display name.
    pub name: String,
    /// Database name as reported by the warehouse.
    pub database: String,
}

impl DatabaseRef {
    /// Builds the reference for a database name reported by the warehouse.
    pub fn from_warehouse_name(database: &str) -> Self {
        Self {
            key: database.to_lowercase(),
            name: database.to_uppercase(),
            database: database.to_string(),
        }
    }

    /// Synthetic entry describing a configured logical key.
    pub fn for_logical_key(key: &str, database: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_uppercase(),
            database: database.to_string(),
        }
    }
}

/// `GET /api/databases` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabasesResponse {
    pub databases: Vec<DatabaseRef>,
}

/// A database together with its connectivity status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseStatus {
    pub key: String,
    pub name: String,
    pub database: String,
    pub status: ConnectionStatus,
}

/// Connectivity of one logical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
}

impl From<bool> for ConnectionStatus {
    fn from(connected: bool) -> Self {
        if connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Failed
        }
    }
}

/// `GET /api/databases/info` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabasesInfoResponse {
    pub databases: Vec<DatabaseStatus>,
}

/// `GET /api/databases/{key}/test` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub connected: bool,
}

/// `POST /api/clear-cache` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearCacheResponse {
    pub message: String,
    /// Connection handles closed by the reset.
    pub released_connections: usize,
    /// Metadata cache entries dropped by the reset.
    pub cleared_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_ref_casing() {
        let db = DatabaseRef::from_warehouse_name("Sales_Db");
        assert_eq!(db.key, "sales_db");
        assert_eq!(db.name, "SALES_DB");
        assert_eq!(db.database, "Sales_Db");
    }

    #[test]
    fn test_connection_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ConnectionStatus::from(true)).unwrap(),
            "connected"
        );
        assert_eq!(
            serde_json::to_value(ConnectionStatus::from(false)).unwrap(),
            "failed"
        );
    }
}
