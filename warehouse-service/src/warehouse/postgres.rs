//! PostgreSQL wire protocol driver.
//!
//! Every logical database gets its own `PgPool`. The account string is the
//! warehouse endpoint (`host[:port]`), the warehouse name is reported as
//! `application_name` and a non-empty role is assumed on every new physical
//! connection.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use common::config::{DatabaseConfig, PoolSettings};
use common::models::{ColumnDescriptor, Row, TableSlice};
use common::utils::quote_ident;
use serde_json::Value;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgHasArrayType, PgPoolOptions, PgRow, Postgres};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Executor, PgPool, Row as _, Statement as _, TypeInfo, ValueRef};

use super::{
    SqlParam, Statement, WarehouseConnector, WarehouseError, WarehouseResult, WarehouseSession,
};

const DEFAULT_PORT: u16 = 5432;

const LIST_DATABASES_SQL: &str = "SELECT datname::text FROM pg_database \
     WHERE NOT datistemplate AND datallowconn ORDER BY datname";

const LIST_SCHEMAS_SQL: &str = "SELECT schema_name::text FROM information_schema.schemata \
     WHERE catalog_name = current_database() \
       AND schema_name NOT LIKE 'pg\\_toast%' \
       AND schema_name NOT LIKE 'pg\\_temp%' \
     ORDER BY schema_name";

const LIST_TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_catalog = current_database() AND table_schema = $1 \
     ORDER BY table_name";

const DESCRIBE_TABLE_SQL: &str = r#"
SELECT a.attname::text AS name,
       format_type(a.atttypid, a.atttypmod) AS data_type,
       NOT a.attnotnull AS nullable,
       CASE WHEN a.attgenerated = '' THEN pg_get_expr(d.adbin, d.adrelid) END AS default_expr,
       CASE WHEN a.attgenerated <> '' THEN pg_get_expr(d.adbin, d.adrelid) END AS generation_expr,
       EXISTS (
           SELECT 1 FROM pg_constraint pk
           WHERE pk.conrelid = a.attrelid AND pk.contype = 'p' AND a.attnum = ANY (pk.conkey)
       ) AS primary_key,
       EXISTS (
           SELECT 1 FROM pg_constraint uk
           WHERE uk.conrelid = a.attrelid AND uk.contype = 'u' AND a.attnum = ANY (uk.conkey)
       ) AS unique_key,
       (
           SELECT string_agg(pg_get_constraintdef(ck.oid), ' AND ')
           FROM pg_constraint ck
           WHERE ck.conrelid = a.attrelid AND ck.contype = 'c' AND a.attnum = ANY (ck.conkey)
       ) AS check_clause,
       col_description(a.attrelid, a.attnum) AS comment
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum
"#;

/// Row of [`DESCRIBE_TABLE_SQL`].
#[derive(sqlx::FromRow)]
struct ColumnRow {
    name: String,
    data_type: String,
    nullable: bool,
    default_expr: Option<String>,
    generation_expr: Option<String>,
    primary_key: bool,
    unique_key: bool,
    check_clause: Option<String>,
    comment: Option<String>,
}

impl ColumnRow {
    fn into_descriptor(self) -> ColumnDescriptor {
        ColumnDescriptor {
            name: self.name,
            data_type: self.data_type,
            kind: "COLUMN".to_string(),
            nullable: self.nullable,
            default: self.default_expr,
            primary_key: self.primary_key,
            unique_key: self.unique_key,
            check: self.check_clause,
            expression: self.generation_expr,
            comment: self.comment,
        }
    }
}

/// Opens sqlx pools against a PostgreSQL compatible warehouse.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl WarehouseConnector for PgConnector {
    async fn connect(
        &self,
        config: &DatabaseConfig,
        pool: &PoolSettings,
    ) -> WarehouseResult<Arc<dyn WarehouseSession>> {
        let options = connect_options(config)?;
        let set_role = set_role_sql(&config.role);

        let pool = PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .acquire_timeout(pool.connect_timeout)
            .idle_timeout(Some(pool.idle_timeout))
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let set_role = set_role.clone();
                Box::pin(async move {
                    if let Some(sql) = set_role {
                        conn.execute(sql.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        Ok(Arc::new(PgSession { pool }))
    }
}

fn connect_options(config: &DatabaseConfig) -> WarehouseResult<PgConnectOptions> {
    let (host, port) = split_account(&config.account)?;
    let mut options = PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(&config.user);

    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if !config.database.is_empty() {
        options = options.database(&config.database);
    }
    if !config.warehouse.is_empty() {
        options = options.application_name(&config.warehouse);
    }
    Ok(options)
}

/// Splits `host[:port]`.
fn split_account(account: &str) -> WarehouseResult<(&str, u16)> {
    let account = account.trim();
    if account.is_empty() {
        return Err(WarehouseError::Settings("account is empty".into()));
    }
    match account.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse()
                .map_err(|_| WarehouseError::Settings(format!("invalid port in '{}'", account)))?;
            Ok((host, port))
        }
        Some(_) => Err(WarehouseError::Settings(format!(
            "missing host in '{}'",
            account
        ))),
        None => Ok((account, DEFAULT_PORT)),
    }
}

fn set_role_sql(role: &str) -> Option<String> {
    let role = role.trim();
    (!role.is_empty()).then(|| format!("SET ROLE {}", quote_ident(role)))
}

/// A pooled session bound to one database.
pub struct PgSession {
    pool: PgPool,
}

#[async_trait]
impl WarehouseSession for PgSession {
    async fn ping(&self) -> WarehouseResult<()> {
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one != 1 {
            return Err(WarehouseError::Query(format!(
                "unexpected ping result {}",
                one
            )));
        }
        Ok(())
    }

    async fn list_databases(&self) -> WarehouseResult<Vec<String>> {
        Ok(sqlx::query_scalar(LIST_DATABASES_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_schemas(&self) -> WarehouseResult<Vec<String>> {
        Ok(sqlx::query_scalar(LIST_SCHEMAS_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_tables(&self, schema: &str) -> WarehouseResult<Vec<String>> {
        Ok(sqlx::query_scalar(LIST_TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> WarehouseResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query_as::<_, ColumnRow>(DESCRIBE_TABLE_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ColumnRow::into_descriptor).collect())
    }

    async fn query(&self, statement: &Statement) -> WarehouseResult<TableSlice> {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                SqlParam::Text(value) => query.bind(value.clone()),
                SqlParam::Int(value) => query.bind(*value),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;

        let columns = match rows.first() {
            Some(first) => first
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            // No row to read the shape from.
            None => self
                .pool
                .prepare(&statement.sql)
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        Ok(TableSlice {
            columns,
            rows: rows.iter().map(decode_row).collect(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_cell(row, column.ordinal())))
        .collect()
}

/// Value shapes decoded explicitly. Anything else is tried as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Oid,
    Char,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    Uuid,
    Bytea,
    Inet,
    Text,
}

fn cell_kind(type_name: &str) -> Option<CellKind> {
    Some(match type_name {
        "BOOL" => CellKind::Bool,
        "INT2" => CellKind::Int2,
        "INT4" => CellKind::Int4,
        "INT8" => CellKind::Int8,
        "FLOAT4" => CellKind::Float4,
        "FLOAT8" => CellKind::Float8,
        "NUMERIC" => CellKind::Numeric,
        "MONEY" => CellKind::Money,
        "OID" => CellKind::Oid,
        "\"CHAR\"" => CellKind::Char,
        "DATE" => CellKind::Date,
        "TIME" => CellKind::Time,
        "TIMETZ" => CellKind::TimeTz,
        "TIMESTAMP" => CellKind::Timestamp,
        "TIMESTAMPTZ" => CellKind::TimestampTz,
        "INTERVAL" => CellKind::Interval,
        "JSON" | "JSONB" => CellKind::Json,
        "UUID" => CellKind::Uuid,
        "BYTEA" => CellKind::Bytea,
        "INET" | "CIDR" => CellKind::Inet,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => CellKind::Text,
        _ => return None,
    })
}

/// Decodes one cell by its wire type.
///
/// Arrays of the common scalar types become JSON arrays. Other types are
/// tried as text; a value that still cannot be read becomes `null` and is
/// logged.
fn decode_cell(row: &PgRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let decoded = match type_name.strip_suffix("[]") {
        Some(element) => match cell_kind(element) {
            Some(kind) => decode_array(row, index, kind),
            None => row.try_get::<Vec<Option<String>>, _>(index).map(|values| {
                Value::Array(values.into_iter().map(|v| v.map_or(Value::Null, Value::String)).collect())
            }),
        },
        None => match cell_kind(&type_name) {
            Some(kind) => decode_scalar(row, index, kind),
            None => row.try_get::<String, _>(index).map(Value::String),
        },
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!(index, type_name = %type_name, error = %e, "Column value not decodable");
        Value::Null
    })
}

fn decode_scalar(row: &PgRow, index: usize, kind: CellKind) -> Result<Value, sqlx::Error> {
    Ok(match kind {
        CellKind::Bool => Value::from(row.try_get::<bool, _>(index)?),
        CellKind::Int2 => Value::from(row.try_get::<i16, _>(index)?),
        CellKind::Int4 => Value::from(row.try_get::<i32, _>(index)?),
        CellKind::Int8 => Value::from(row.try_get::<i64, _>(index)?),
        CellKind::Float4 => Value::from(f64::from(row.try_get::<f32, _>(index)?)),
        CellKind::Float8 => Value::from(row.try_get::<f64, _>(index)?),
        CellKind::Numeric => Value::String(row.try_get::<Decimal, _>(index)?.to_string()),
        // Two fractional digits, the default lc_monetary scale.
        CellKind::Money => Value::String(row.try_get::<PgMoney, _>(index)?.to_decimal(2).to_string()),
        CellKind::Oid => Value::from(row.try_get::<Oid, _>(index)?.0),
        CellKind::Char => Value::String(char::from(row.try_get::<i8, _>(index)? as u8).to_string()),
        CellKind::Date => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        CellKind::Time => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        CellKind::TimeTz => {
            let v = row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)?;
            Value::String(format!("{}{}", v.time, v.offset))
        }
        CellKind::Timestamp => Value::String(timestamp_text(row.try_get::<NaiveDateTime, _>(index)?)),
        CellKind::TimestampTz => Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        CellKind::Interval => Value::String(interval_text(&row.try_get::<PgInterval, _>(index)?)),
        CellKind::Json => row.try_get::<Value, _>(index)?,
        CellKind::Uuid => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        CellKind::Bytea => Value::String(bytea_hex(&row.try_get::<Vec<u8>, _>(index)?)),
        CellKind::Inet => {
            let bytes = row
                .try_get_raw(index)?
                .as_bytes()
                .map_err(sqlx::Error::Decode)?;
            Value::String(inet_text(bytes).ok_or_else(|| sqlx::Error::Decode("malformed inet value".into()))?)
        }
        CellKind::Text => Value::String(row.try_get::<String, _>(index)?),
    })
}

fn decode_array(row: &PgRow, index: usize, kind: CellKind) -> Result<Value, sqlx::Error> {
    match kind {
        CellKind::Bool => array::<bool>(row, index, Value::from),
        CellKind::Int2 => array::<i16>(row, index, Value::from),
        CellKind::Int4 => array::<i32>(row, index, Value::from),
        CellKind::Int8 => array::<i64>(row, index, Value::from),
        CellKind::Float4 => array::<f32>(row, index, |v| Value::from(f64::from(v))),
        CellKind::Float8 => array::<f64>(row, index, Value::from),
        CellKind::Numeric => array::<Decimal>(row, index, |v| Value::String(v.to_string())),
        CellKind::Date => array::<NaiveDate>(row, index, |v| Value::String(v.to_string())),
        CellKind::Timestamp => array::<NaiveDateTime>(row, index, |v| Value::String(timestamp_text(v))),
        CellKind::TimestampTz => array::<DateTime<Utc>>(row, index, |v| Value::String(v.to_rfc3339())),
        CellKind::Uuid => array::<Uuid>(row, index, |v| Value::String(v.to_string())),
        CellKind::Json => array::<Value>(row, index, |v| v),
        _ => array::<String>(row, index, Value::String),
    }
}

fn array<T>(row: &PgRow, index: usize, to_json: impl Fn(T) -> Value) -> Result<Value, sqlx::Error>
where
    T: for<'a> sqlx::Decode<'a, Postgres> + sqlx::Type<Postgres> + PgHasArrayType,
{
    let values = row.try_get::<Vec<Option<T>>, _>(index)?;
    Ok(Value::Array(
        values
            .into_iter()
            .map(|v| v.map_or(Value::Null, &to_json))
            .collect(),
    ))
}

fn timestamp_text(v: NaiveDateTime) -> String {
    v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// `\x`-prefixed lowercase hex, as the server prints bytea.
fn bytea_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Server style interval text, e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn interval_text(interval: &PgInterval) -> String {
    fn unit(n: i32, name: &str) -> String {
        format!("{} {}{}", n, name, if n.abs() == 1 { "" } else { "s" })
    }

    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day"));
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let total = interval.microseconds.unsigned_abs();
        let (secs, frac) = (total / 1_000_000, total % 1_000_000);
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if frac > 0 {
            clock.push('.');
            clock.push_str(format!("{:06}", frac).trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Binary inet/cidr: family, prefix bits, cidr flag, address length, address.
fn inet_text(bytes: &[u8]) -> Option<String> {
    let (&[family, bits, is_cidr, len], addr) = bytes.split_first_chunk::<4>()?;
    if addr.len() != usize::from(len) {
        return None;
    }
    let (ip, full) = match family {
        2 => (IpAddr::from(<[u8; 4]>::try_from(addr).ok()?), 32),
        3 => (IpAddr::from(<[u8; 16]>::try_from(addr).ok()?), 128),
        _ => return None,
    };
    Some(if bits == full && is_cidr == 0 {
        ip.to_string()
    } else {
        format!("{}/{}", ip, bits)
    })
}
