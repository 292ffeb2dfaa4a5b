//! Mock dispatcher for testing.
//!
//! Records every statement it is given instead of talking to a server, so
//! statement ordering and target databases can be asserted offline.

use super::{
    decode_ewkb, Dispatcher, GeoTable, GeometryMode, QueryOutput, QueryResult, Value,
    GEOMETRY_COLUMN,
};
use crate::config::ConnectionConfig;
use crate::error::{Result, UrbanDbError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A statement seen by the mock, with the database it was aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// Zero-based index of the dispatcher call that carried the statement.
    pub call: usize,
    /// Target database; `None` is the administrative database.
    pub dbname: Option<String>,
    pub sql: String,
}

#[derive(Debug, Default)]
struct MockState {
    calls: usize,
    committed: Vec<RecordedStatement>,
    queries: Vec<RecordedStatement>,
    fail_on: Option<String>,
    responses: Vec<(String, QueryResult)>,
}

/// A dispatcher that records statements and returns canned results.
#[derive(Debug, Default)]
pub struct MockDispatcher {
    state: Mutex<MockState>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any statement or query whose text contains `pattern`.
    pub fn failing_on(self, pattern: impl Into<String>) -> Self {
        self.state().fail_on = Some(pattern.into());
        self
    }

    /// Answers queries containing `pattern` with `result`.
    ///
    /// Queries without a matching response return an empty result. For
    /// spatial reads the `geometry` column holds EWKB bytes (or NULL) and is
    /// decoded like a server response.
    pub fn with_response(self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.state().responses.push((pattern.into(), result));
        self
    }

    /// Mutation statements that were committed, in order.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.state().committed.clone()
    }

    /// Read queries that were issued, in order.
    pub fn queries(&self) -> Vec<RecordedStatement> {
        self.state().queries.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, config: &ConnectionConfig, statements: &[&str], atomic: bool) -> Result<()> {
        if statements.is_empty() {
            return Err(UrbanDbError::query("Mutation requires at least one statement"));
        }

        let mut state = self.state();
        let call = state.calls;
        state.calls += 1;

        let total = statements.len();
        let mut staged = Vec::with_capacity(total);
        for (index, &sql) in statements.iter().enumerate() {
            if state.fail_on.as_deref().is_some_and(|p| sql.contains(p)) {
                if !atomic {
                    state.committed.append(&mut staged);
                }
                return Err(UrbanDbError::mutation(index, total, "ERROR: mock failure"));
            }
            let recorded = RecordedStatement {
                call,
                dbname: config.dbname.clone(),
                sql: sql.to_string(),
            };
            if atomic {
                staged.push(recorded);
            } else {
                state.committed.push(recorded);
            }
        }
        state.committed.append(&mut staged);
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn execute_mutation(&self, config: &ConnectionConfig, statements: &[&str]) -> Result<()> {
        self.mutate(config, statements, false)
    }

    async fn execute_mutation_atomic(
        &self,
        config: &ConnectionConfig,
        statements: &[&str],
    ) -> Result<()> {
        self.mutate(config, statements, true)
    }

    async fn execute_query(
        &self,
        config: &ConnectionConfig,
        sql: &str,
        geometry: GeometryMode,
    ) -> Result<QueryOutput> {
        let mut state = self.state();
        let call = state.calls;
        state.calls += 1;
        state.queries.push(RecordedStatement {
            call,
            dbname: config.dbname.clone(),
            sql: sql.to_string(),
        });

        if state.fail_on.as_deref().is_some_and(|p| sql.contains(p)) {
            return Err(UrbanDbError::query("ERROR: mock failure"));
        }

        let result = state
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default();

        if !geometry.resolve(sql) {
            return Ok(QueryOutput::Tabular(result));
        }

        let geom_idx = result.column_index(GEOMETRY_COLUMN).ok_or_else(|| {
            UrbanDbError::query(format!("Spatial result has no '{GEOMETRY_COLUMN}' column"))
        })?;
        let mut columns = result.columns;
        columns.remove(geom_idx);

        let mut rows = Vec::with_capacity(result.rows.len());
        let mut geometries = Vec::with_capacity(result.rows.len());
        for mut row in result.rows {
            geometries.push(match row.remove(geom_idx) {
                Value::Null => None,
                Value::Bytes(bytes) => Some(decode_ewkb(&bytes)?),
                other => {
                    return Err(UrbanDbError::geometry(format!(
                        "Failed to decode column '{GEOMETRY_COLUMN}': not EWKB: {other:?}"
                    )))
                }
            });
            rows.push(row);
        }

        Ok(QueryOutput::Spatial(GeoTable::with_data(
            columns, rows, geometries,
        )?))
    }
}
