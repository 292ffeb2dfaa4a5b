//! Spatial query results.
//!
//! A `GeoTable` is a tabular result whose `geometry` column has been decoded
//! into `geo` values under a fixed SRID.

use super::types::{ColumnInfo, Row, Value};
use crate::error::{Result, UrbanDbError};
use geo::{Area, Geometry, Intersects};
use geozero::wkb::Ewkb;
use geozero::{ToGeo, ToWkt};
use std::time::Duration;

/// Spatial reference system of every geometry column in the schema.
pub const SRID: i32 = 4326;

/// Name of the column decoded as geometry in spatial results.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Decodes a PostGIS geometry value from its EWKB wire form.
///
/// The embedded SRID is not checked; every geometry column is declared 4326.
pub fn decode_ewkb(bytes: &[u8]) -> Result<Geometry<f64>> {
    Ewkb(bytes).to_geo().map_err(|e| {
        UrbanDbError::geometry(format!(
            "Failed to decode column '{GEOMETRY_COLUMN}': {e}"
        ))
    })
}

/// A query result with a decoded geometry column.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTable {
    /// Non-geometry columns, in result order.
    pub columns: Vec<ColumnInfo>,

    /// Non-geometry values, aligned with `columns`.
    pub rows: Vec<Row>,

    /// One entry per row. `None` for NULL geometry.
    pub geometries: Vec<Option<Geometry<f64>>>,

    /// Spatial reference system the geometries are expressed in.
    pub srid: i32,

    /// Time taken to execute the query.
    pub execution_time: Duration,
}

impl Default for GeoTable {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            geometries: Vec::new(),
            srid: SRID,
            execution_time: Duration::ZERO,
        }
    }
}

impl GeoTable {
    /// Creates a spatial result from columns, rows and their geometries.
    ///
    /// `rows` and `geometries` must have the same length.
    pub fn with_data(
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
        geometries: Vec<Option<Geometry<f64>>>,
    ) -> Result<Self> {
        if rows.len() != geometries.len() {
            return Err(UrbanDbError::geometry(format!(
                "{} rows but {} geometries",
                rows.len(),
                geometries.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            geometries,
            ..Self::default()
        })
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value at `row` in the named (non-geometry) column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Geometry of `row`, if present and not NULL.
    pub fn geometry(&self, row: usize) -> Option<&Geometry<f64>> {
        self.geometries.get(row)?.as_ref()
    }

    /// Planar area of each row's geometry, in squared CRS units.
    ///
    /// Under SRID 4326 these are square degrees.
    pub fn unsigned_areas(&self) -> Vec<Option<f64>> {
        self.geometries
            .iter()
            .map(|g| g.as_ref().map(|g| g.unsigned_area()))
            .collect()
    }

    /// Sum of all non-NULL geometry areas.
    pub fn total_area(&self) -> f64 {
        self.unsigned_areas().into_iter().flatten().sum()
    }

    /// Indices of rows whose geometry intersects `target`.
    pub fn intersecting(&self, target: &Geometry<f64>) -> Vec<usize> {
        self.geometries
            .iter()
            .enumerate()
            .filter_map(|(i, g)| match g {
                Some(g) if g.intersects(target) => Some(i),
                _ => None,
            })
            .collect()
    }

    /// WKT rendering of `row`'s geometry.
    pub fn geometry_wkt(&self, row: usize) -> Result<Option<String>> {
        self.geometry(row)
            .map(|g| {
                g.to_wkt()
                    .map_err(|e| UrbanDbError::geometry(format!("Failed to render WKT: {e}")))
            })
            .transpose()
    }
}
