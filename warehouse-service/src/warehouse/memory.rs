//! In-memory warehouse for unit tests.
//!
//! Understands exactly the statements the executor emits: a `LIMIT 0` shape
//! query, a plain page and a searched page.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::config::{DatabaseConfig, PoolSettings};
use common::models::{ColumnDescriptor, Row, TableSlice};
use common::utils::qualified_name;
use serde_json::Value;

use super::{
    SqlParam, Statement, WarehouseConnector, WarehouseError, WarehouseResult, WarehouseSession,
};

pub struct MemoryTable {
    schema: String,
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }
}

#[derive(Default)]
struct Inner {
    databases: Mutex<Vec<String>>,
    tables: Mutex<Vec<MemoryTable>>,
    statements: Mutex<Vec<Statement>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    metadata_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_queries: AtomicBool,
    connect_delay_ms: AtomicU64,
    catalog_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
}

/// Connector and shared catalog. Clones observe the same state.
#[derive(Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Inner>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: &str) -> Self {
        self.inner.databases.lock().unwrap().push(name.to_string());
        self
    }

    pub fn with_table(self, table: MemoryTable) -> Self {
        self.inner.tables.lock().unwrap().push(table);
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.inner.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Makes every later connect sleep before answering.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes every later catalog call sleep before answering. `close` waits
    /// for such calls to finish, as a pool close does.
    pub fn set_catalog_delay(&self, delay: Duration) {
        self.inner
            .catalog_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Catalog round trips, ping included.
    pub fn metadata_calls(&self) -> usize {
        self.inner.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.inner.statements.lock().unwrap().clone()
    }

    /// Ready-made catalog with `PUBLIC.USERS` and `PUBLIC.ORDERS`.
    pub fn sample() -> Self {
        Self::new()
            .with_database("ANALYTICS")
            .with_database("llm_eval")
            .with_table(
                MemoryTable::new("PUBLIC", "USERS")
                    .column(ColumnDescriptor::new("ID", "NUMBER(38,0)").primary_key())
                    .column(ColumnDescriptor::new("NAME", "VARCHAR(100)").not_null())
                    .column(ColumnDescriptor::new("EMAIL", "VARCHAR(255)"))
                    .row(vec![1.into(), "alice".into(), "alice@example.com".into()])
                    .row(vec![2.into(), "bob".into(), Value::Null])
                    .row(vec![3.into(), "Alicia".into(), "alicia@example.com".into()])
                    .row(vec![4.into(), "carol".into(), "carol@example.com".into()])
                    .row(vec![5.into(), "dave".into(), "dave@example.com".into()]),
            )
            .with_table(
                MemoryTable::new("PUBLIC", "ORDERS")
                    .column(ColumnDescriptor::new("ORDER_ID", "NUMBER(38,0)").primary_key())
                    .column(ColumnDescriptor::new("AMOUNT", "NUMBER(10,2)"))
                    .row(vec![100.into(), "12.50".into()]),
            )
    }
}

#[async_trait]
impl WarehouseConnector for MemoryWarehouse {
    async fn connect(
        &self,
        _config: &DatabaseConfig,
        _pool: &PoolSettings,
    ) -> WarehouseResult<Arc<dyn WarehouseSession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(WarehouseError::Query("connection refused".into()));
        }
        Ok(Arc::new(MemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    inner: Arc<Inner>,
}

impl MemorySession {
    async fn metadata_call(&self) -> WarehouseResult<()> {
        self.inner.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.catalog_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.inner.fail_queries.load(Ordering::SeqCst) {
            return Err(WarehouseError::Query("simulated failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseSession for MemorySession {
    async fn ping(&self) -> WarehouseResult<()> {
        self.metadata_call().await
    }

    async fn list_databases(&self) -> WarehouseResult<Vec<String>> {
        self.metadata_call().await?;
        Ok(self.inner.databases.lock().unwrap().clone())
    }

    async fn list_schemas(&self) -> WarehouseResult<Vec<String>> {
        self.metadata_call().await?;
        let mut schemas: Vec<String> = Vec::new();
        for table in self.inner.tables.lock().unwrap().iter() {
            if !schemas.contains(&table.schema) {
                schemas.push(table.schema.clone());
            }
        }
        Ok(schemas)
    }

    async fn list_tables(&self, schema: &str) -> WarehouseResult<Vec<String>> {
        self.metadata_call().await?;
        Ok(self
            .inner
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.schema == schema)
            .map(|t| t.name.clone())
            .collect())
    }

    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> WarehouseResult<Vec<ColumnDescriptor>> {
        self.metadata_call().await?;
        Ok(self
            .inner
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.schema == schema && t.name == table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn query(&self, statement: &Statement) -> WarehouseResult<TableSlice> {
        self.inner
            .statements
            .lock()
            .unwrap()
            .push(statement.clone());
        if self.inner.fail_queries.load(Ordering::SeqCst) {
            return Err(WarehouseError::Query("simulated failure".into()));
        }

        let tables = self.inner.tables.lock().unwrap();
        let table = tables
            .iter()
            .find(|t| {
                statement
                    .sql
                    .contains(&format!("FROM {} ", qualified_name(&t.schema, &t.name)))
            })
            .ok_or_else(|| WarehouseError::Query("relation does not exist".into()))?;
        let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();

        if statement.sql.ends_with("LIMIT 0") {
            return Ok(TableSlice {
                columns,
                rows: Vec::new(),
            });
        }

        let term = statement.params.iter().find_map(|p| match p {
            SqlParam::Text(pattern) => Some(unescape_pattern(pattern)),
            SqlParam::Int(_) => None,
        });
        let ints: Vec<i64> = statement
            .params
            .iter()
            .filter_map(|p| match p {
                SqlParam::Int(v) => Some(*v),
                SqlParam::Text(_) => None,
            })
            .collect();
        let (limit, offset) = match ints.as_slice() {
            [.., limit, offset] => (*limit as usize, *offset as usize),
            _ => (usize::MAX, 0),
        };

        let rows = table
            .rows
            .iter()
            .filter(|values| match &term {
                Some(term) => values
                    .iter()
                    .filter_map(cell_text)
                    .any(|text| text.to_lowercase().contains(term)),
                None => true,
            })
            .skip(offset)
            .take(limit)
            .map(|values| columns.iter().cloned().zip(values.iter().cloned()).collect::<Row>())
            .collect();

        Ok(TableSlice { columns, rows })
    }

    async fn close(&self) {
        while self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// `%a\_b%` → `a_b`, lower-cased.
fn unescape_pattern(pattern: &str) -> String {
    let inner = pattern
        .strip_prefix('%')
        .and_then(|p| p.strip_suffix('%'))
        .unwrap_or(pattern);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            other => out.push(other),
        }
    }
    out.to_lowercase()
}

/// `CAST(v AS TEXT)`; NULL never matches.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
