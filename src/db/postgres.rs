//! PostgreSQL dispatcher implementation.
//!
//! Provides `PostgresDispatcher`, which implements [`Dispatcher`] on top of
//! sqlx with one short-lived `PgConnection` per call.

use crate::config::ConnectionConfig;
use crate::db::{
    decode_ewkb, ColumnInfo, Dispatcher, GeoTable, GeometryMode, QueryOutput, QueryResult, Row,
    Value, GEOMETRY_COLUMN,
};
use crate::error::{Result, UrbanDbError};
use async_trait::async_trait;
use geo::Geometry;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgColumn, PgConnection, PgRow};
use sqlx::{Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::time::Instant;
use tracing::{debug, warn};

/// Dispatcher backed by a PostgreSQL/PostGIS server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDispatcher;

impl PostgresDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dispatcher for PostgresDispatcher {
    async fn execute_mutation(&self, config: &ConnectionConfig, statements: &[&str]) -> Result<()> {
        ensure_non_empty(statements)?;

        let mut conn = open(config).await?;
        let result = run_sequence(&mut conn, statements).await;
        close(conn).await;

        if let Err(UrbanDbError::Mutation { index, .. }) = &result {
            if *index > 0 {
                warn!(
                    "Sequence failed at statement {}; {} earlier statement(s) remain committed",
                    index + 1,
                    index
                );
            }
        }

        result
    }

    async fn execute_mutation_atomic(
        &self,
        config: &ConnectionConfig,
        statements: &[&str],
    ) -> Result<()> {
        ensure_non_empty(statements)?;

        let mut conn = open(config).await?;
        let result = run_atomic(&mut conn, statements).await;
        close(conn).await;
        result
    }

    async fn execute_query(
        &self,
        config: &ConnectionConfig,
        sql: &str,
        geometry: GeometryMode,
    ) -> Result<QueryOutput> {
        let spatial = geometry.resolve(sql);
        debug!("Executing query (spatial: {spatial})");

        let mut conn = open(config).await?;
        let result = if spatial {
            fetch_spatial(&mut conn, sql).await.map(QueryOutput::Spatial)
        } else {
            fetch_tabular(&mut conn, sql).await.map(QueryOutput::Tabular)
        };
        close(conn).await;
        result
    }
}

fn ensure_non_empty(statements: &[&str]) -> Result<()> {
    if statements.is_empty() {
        return Err(UrbanDbError::query(
            "Mutation requires at least one statement",
        ));
    }
    Ok(())
}

async fn open(config: &ConnectionConfig) -> Result<PgConnection> {
    debug!("Connecting to {}", config.display_string());
    PgConnection::connect_with(&config.connect_options())
        .await
        .map_err(|e| map_connection_error(e, config))
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!("Error while closing connection: {e}");
    }
}

/// Runs each statement in auto-commit mode, stopping at the first failure.
async fn run_sequence(conn: &mut PgConnection, statements: &[&str]) -> Result<()> {
    let total = statements.len();
    for (index, &sql) in statements.iter().enumerate() {
        debug!("Executing statement {} of {}", index + 1, total);
        (&mut *conn)
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| UrbanDbError::mutation(index, total, format_query_error(e)))?;
    }
    Ok(())
}

async fn run_atomic(conn: &mut PgConnection, statements: &[&str]) -> Result<()> {
    let total = statements.len();
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| UrbanDbError::query(format_query_error(e)))?;

    for (index, &sql) in statements.iter().enumerate() {
        debug!("Executing statement {} of {} (transaction)", index + 1, total);
        if let Err(e) = (&mut *tx).execute(sqlx::raw_sql(sql)).await {
            let err = UrbanDbError::mutation(index, total, format_query_error(e));
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback failed: {rollback}");
            }
            return Err(err);
        }
    }

    tx.commit()
        .await
        .map_err(|e| UrbanDbError::query(format!("Commit failed: {}", format_query_error(e))))
}

/// Column metadata from a prepared statement, available even for empty results.
async fn describe_columns(conn: &mut PgConnection, sql: &str) -> Result<Vec<ColumnInfo>> {
    let statement = (&mut *conn)
        .prepare(sql)
        .await
        .map_err(|e| UrbanDbError::query(format_query_error(e)))?;

    Ok(statement
        .columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect())
}

async fn fetch_rows(conn: &mut PgConnection, sql: &str) -> Result<Vec<PgRow>> {
    sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| UrbanDbError::query(format_query_error(e)))
}

async fn fetch_tabular(conn: &mut PgConnection, sql: &str) -> Result<QueryResult> {
    let start = Instant::now();
    let columns = describe_columns(conn, sql).await?;
    let rows = fetch_rows(conn, sql)
        .await?
        .iter()
        .map(convert_row)
        .collect::<Result<Vec<Row>>>()?;

    Ok(QueryResult::with_data(columns, rows).with_execution_time(start.elapsed()))
}

async fn fetch_spatial(conn: &mut PgConnection, sql: &str) -> Result<GeoTable> {
    let start = Instant::now();
    let mut columns = describe_columns(conn, sql).await?;
    let geom_idx = columns
        .iter()
        .position(|c| c.name == GEOMETRY_COLUMN)
        .ok_or_else(|| {
            UrbanDbError::query(format!(
                "Spatial result has no '{GEOMETRY_COLUMN}' column"
            ))
        })?;

    let pg_rows = fetch_rows(conn, sql).await?;
    let mut rows = Vec::with_capacity(pg_rows.len());
    let mut geometries = Vec::with_capacity(pg_rows.len());

    for row in &pg_rows {
        geometries.push(decode_geometry(row, geom_idx)?);
        rows.push(
            row.columns()
                .iter()
                .filter(|col| col.ordinal() != geom_idx)
                .map(|col| convert_value(row, col))
                .collect::<Result<Row>>()?,
        );
    }

    columns.remove(geom_idx);
    Ok(GeoTable::with_data(columns, rows, geometries)?.with_execution_time(start.elapsed()))
}

/// Decodes a PostGIS EWKB value. NULL decodes to `None`.
fn decode_geometry(row: &PgRow, index: usize) -> Result<Option<Geometry<f64>>> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .map_err(|e| {
            UrbanDbError::geometry(format!(
                "Failed to read column '{GEOMETRY_COLUMN}': {e}"
            ))
        })?
        .map(|bytes| decode_ewkb(&bytes))
        .transpose()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|col| convert_value(row, col))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Types without a `Value` counterpart (arrays, intervals, ranges, enums, ...)
/// are an error rather than NULL; cast them in SQL (e.g. `::text`).
fn convert_value(row: &PgRow, col: &PgColumn) -> Result<Value> {
    let index = col.ordinal();
    let type_name = col.type_info().name().to_uppercase();

    let value = match type_name.as_str() {
        "BOOL" => get(row, index, Value::Bool),
        "INT2" => get(row, index, |v: i16| Value::Int(v.into())),
        "INT4" => get(row, index, |v: i32| Value::Int(v.into())),
        "INT8" => get(row, index, Value::Int),
        "OID" => get(row, index, |v: Oid| Value::Int(v.0.into())),
        "FLOAT4" => get(row, index, |v: f32| Value::Float(v.into())),
        "FLOAT8" => get(row, index, Value::Float),
        "NUMERIC" => get(row, index, Value::Decimal),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" | "CITEXT" => {
            get(row, index, Value::String)
        }
        "DATE" => get(row, index, Value::Date),
        "TIME" => get(row, index, Value::Time),
        "TIMESTAMP" => get(row, index, Value::Timestamp),
        "TIMESTAMPTZ" => get(row, index, Value::TimestampTz),
        "UUID" => get(row, index, Value::Uuid),
        "JSON" | "JSONB" => get(row, index, Value::Json),
        "BYTEA" => get(row, index, Value::Bytes),

        // Undecoded spatial values: raw EWKB
        "GEOMETRY" | "GEOGRAPHY" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map(Value::Bytes).unwrap_or(Value::Null)),

        _ => {
            return Err(UrbanDbError::query(format!(
                "Column '{}' has unsupported type {}",
                col.name(),
                type_name
            )))
        }
    };

    value.map_err(|e| {
        UrbanDbError::query(format!(
            "Failed to decode column '{}' ({}): {}",
            col.name(),
            type_name,
            e
        ))
    })
}

/// Reads a nullable column as `T` and wraps it; NULL becomes `Value::Null`.
fn get<'r, T>(
    row: &'r PgRow,
    index: usize,
    wrap: impl FnOnce(T) -> Value,
) -> std::result::Result<Value, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map(|v| v.map(wrap).unwrap_or(Value::Null))
}

/// Maps sqlx connection errors to readable messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> UrbanDbError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let dbname = config.effective_dbname();

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        UrbanDbError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        UrbanDbError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        UrbanDbError::connection(format!(
            "Database '{dbname}' does not exist."
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        UrbanDbError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        UrbanDbError::connection(error.to_string())
    }
}

/// Formats a query error with PostgreSQL detail fields if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        let fields = [
            ("DETAIL", pg_error.detail()),
            ("HINT", pg_error.hint()),
            ("TABLE", pg_error.table()),
            ("CONSTRAINT", pg_error.constraint()),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                result.push_str(&format!("\n  {label}: {value}"));
            }
        }
    }

    result
}
