//! Integration tests for urbandb.
//!
//! These tests require a running PostgreSQL server with PostGIS available.
//! Set DATABASE_URL environment variable to run them. The schema is created
//! in a separate `urbandb_test` database on that server.

pub mod schema_test;

use tokio::sync::OnceCell;
use urbandb::config::ConnectionConfig;
use urbandb::db::{Dispatcher, GeometryMode, PostgresDispatcher, Value};
use urbandb::schema::{InitOptions, SchemaManager};

const TEST_DBNAME: &str = "urbandb_test";

static SCHEMA: OnceCell<()> = OnceCell::const_new();

/// Helper to get the test database config from the environment.
pub fn get_test_config() -> Option<ConnectionConfig> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let mut config = ConnectionConfig::from_connection_string(&url).ok()?;
    config.dbname = Some(TEST_DBNAME.to_string());
    Some(config)
}

/// Helper that initializes the full schema once per test run.
pub async fn get_initialized_config() -> Option<ConnectionConfig> {
    let config = get_test_config()?;
    SCHEMA
        .get_or_init(|| async {
            SchemaManager::new(&PostgresDispatcher::new(), &config)
                .initialize_with(InitOptions {
                    roads: true,
                    cluster_view: true,
                })
                .await
                .expect("schema initialization failed");
        })
        .await;
    Some(config)
}

/// Name unique to this test run, so parallel tests do not share rows.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", std::process::id())
}

/// Inserts a city with a unit-square multipolygon and returns its id.
pub async fn insert_city(config: &ConnectionConfig, name: &str) -> i64 {
    let sql = format!(
        "INSERT INTO city (name, country, population, area, geometry) VALUES \
         ('{name}', 'Testland', 1000, 1.0, \
         ST_GeomFromText('MULTIPOLYGON(((0 0, 1 0, 1 1, 0 1, 0 0)))', 4326))"
    );
    PostgresDispatcher::new()
        .execute_mutation(config, &[sql.as_str()])
        .await
        .expect("insert city");

    scalar(config, &format!("SELECT city_id FROM city WHERE name = '{name}'")).await
}

/// Runs a single-value tabular query and returns it as an integer.
pub async fn scalar(config: &ConnectionConfig, sql: &str) -> i64 {
    let result = PostgresDispatcher::new()
        .execute_query(config, sql, GeometryMode::Tabular)
        .await
        .expect("scalar query")
        .into_tabular()
        .expect("tabular result");

    match result.rows.first().and_then(|row| row.first()) {
        Some(Value::Int(v)) => *v,
        other => panic!("Expected an integer from {sql}, got {other:?}"),
    }
}
