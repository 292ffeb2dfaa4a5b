//! Query dispatch layer for urbandb.
//!
//! Every database round trip goes through a [`Dispatcher`]: mutations as an
//! ordered statement sequence, reads as a single statement whose result is
//! returned either as a plain table or as a [`GeoTable`].

mod mock;
mod postgres;
mod spatial;
mod types;

pub use mock::{MockDispatcher, RecordedStatement};
pub use postgres::PostgresDispatcher;
pub use spatial::{decode_ewkb, GeoTable, GEOMETRY_COLUMN, SRID};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// How a read query's result should be materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryMode {
    /// Spatial when the SQL text contains `geom`.
    ///
    /// This is a plain substring test, so a column such as `geom_notes`
    /// triggers it too. Pass an explicit mode when that matters.
    #[default]
    Detect,
    /// Always decode the `geometry` column.
    Spatial,
    /// Never decode geometry.
    Tabular,
}

impl GeometryMode {
    /// Maps an optional explicit flag onto a mode; `None` means detect.
    pub fn from_override(flag: Option<bool>) -> Self {
        match flag {
            None => Self::Detect,
            Some(true) => Self::Spatial,
            Some(false) => Self::Tabular,
        }
    }

    /// Returns true if `sql` should produce a spatial result under this mode.
    pub fn resolve(self, sql: &str) -> bool {
        match self {
            Self::Detect => sql.contains("geom"),
            Self::Spatial => true,
            Self::Tabular => false,
        }
    }
}

/// Result of a read query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Spatial(GeoTable),
    Tabular(QueryResult),
}

impl QueryOutput {
    pub fn is_spatial(&self) -> bool {
        matches!(self, Self::Spatial(_))
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Spatial(t) => t.row_count(),
            Self::Tabular(t) => t.row_count(),
        }
    }

    pub fn into_spatial(self) -> Option<GeoTable> {
        match self {
            Self::Spatial(t) => Some(t),
            Self::Tabular(_) => None,
        }
    }

    pub fn into_tabular(self) -> Option<QueryResult> {
        match self {
            Self::Tabular(t) => Some(t),
            Self::Spatial(_) => None,
        }
    }
}

/// Single entry point for database I/O.
///
/// Implementations open a fresh connection per call and release it before
/// returning, on success and on error alike.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Executes `statements` in order in auto-commit mode.
    ///
    /// Stops at the first failure, which is reported as
    /// [`UrbanDbError::Mutation`](crate::error::UrbanDbError::Mutation).
    /// Statements before the failing one stay committed.
    async fn execute_mutation(&self, config: &ConnectionConfig, statements: &[&str]) -> Result<()>;

    /// Executes `statements` in order inside one transaction.
    ///
    /// Any failure rolls back every statement of the sequence.
    async fn execute_mutation_atomic(
        &self,
        config: &ConnectionConfig,
        statements: &[&str],
    ) -> Result<()>;

    /// Runs one read statement and materialises its result.
    async fn execute_query(
        &self,
        config: &ConnectionConfig,
        sql: &str,
        geometry: GeometryMode,
    ) -> Result<QueryOutput>;
}
