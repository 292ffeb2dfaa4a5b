//! DDL for the urban-scaling schema.

use crate::error::{Result, UrbanDbError};

/// PostGIS geometry subtype stored by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    MultiPolygon,
    Polygon,
    Point,
    LineString,
}

impl GeometryKind {
    /// The type modifier as written in a `geometry(<kind>, 4326)` column.
    pub fn as_postgis(&self) -> &'static str {
        match self {
            Self::MultiPolygon => "MultiPolygon",
            Self::Polygon => "Polygon",
            Self::Point => "Point",
            Self::LineString => "LineString",
        }
    }
}

/// One table of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub geometry: Option<GeometryKind>,
    pub create: &'static str,
}

pub const CREATE_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS postgis";

pub const CREATE_CITY: &str = r#"
CREATE TABLE IF NOT EXISTS city (
    city_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    name VARCHAR(255),
    country VARCHAR(255),
    population INT,
    area FLOAT,
    geometry geometry(MultiPolygon, 4326)
)
"#;

pub const CREATE_ROAD: &str = r#"
CREATE TABLE IF NOT EXISTS road (
    road_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    city_id INT,
    geometry geometry(LineString, 4326),

    CONSTRAINT fk_city FOREIGN KEY (city_id) REFERENCES city (city_id)
    ON DELETE CASCADE
)
"#;

pub const CREATE_BLOCK: &str = r#"
CREATE TABLE IF NOT EXISTS block (
    block_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    city_id INT,
    cluster_id INT,
    population INT,
    area FLOAT,
    geometry geometry(Polygon, 4326),

    CONSTRAINT fk_city FOREIGN KEY (city_id) REFERENCES city (city_id)
    ON DELETE CASCADE
)
"#;

pub const CREATE_SERVICE: &str = r#"
CREATE TABLE IF NOT EXISTS service (
    service_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    city_id INT,
    name VARCHAR(255),
    geometry geometry(Point, 4326),

    CONSTRAINT fk_city FOREIGN KEY (city_id) REFERENCES city (city_id)
    ON DELETE CASCADE
)
"#;

// servicetag_id stays unconstrained until servicetag exists.
pub const CREATE_TAG: &str = r#"
CREATE TABLE IF NOT EXISTS tag (
    tag_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    servicetag_id INT,
    name VARCHAR(255),
    category VARCHAR(255)
)
"#;

pub const CREATE_SERVICETAG: &str = r#"
CREATE TABLE IF NOT EXISTS servicetag (
    servicetag_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    service_id INT,
    tag_id INT,

    CONSTRAINT fk_service FOREIGN KEY (service_id) REFERENCES service (service_id)
    ON DELETE CASCADE,

    CONSTRAINT fk_tag FOREIGN KEY (tag_id) REFERENCES tag (tag_id)
)
"#;

/// Closes the tag <-> servicetag cycle. Skipped when the constraint exists.
pub const LINK_TAG_TO_SERVICETAG: &str = r#"
DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint
        WHERE conname = 'fk_servicetag' AND conrelid = 'tag'::regclass
    ) THEN
        ALTER TABLE tag
        ADD CONSTRAINT fk_servicetag FOREIGN KEY (servicetag_id)
        REFERENCES servicetag (servicetag_id);
    END IF;
END
$$
"#;

/// Per-cluster aggregates over blocks.
pub const CREATE_CLUSTER_VIEW: &str = r#"
CREATE OR REPLACE VIEW cluster AS
SELECT
    b.city_id,
    b.cluster_id,
    COUNT(*) AS block_count,
    SUM(b.population) AS population,
    SUM(b.area) AS area,
    SUM(b.population) / NULLIF(SUM(b.area), 0) AS density,
    ST_Multi(ST_Union(b.geometry)) AS geometry
FROM block b
WHERE b.cluster_id IS NOT NULL
GROUP BY b.city_id, b.cluster_id
"#;

pub const CITY: TableSpec = TableSpec {
    name: "city",
    geometry: Some(GeometryKind::MultiPolygon),
    create: CREATE_CITY,
};

pub const ROAD: TableSpec = TableSpec {
    name: "road",
    geometry: Some(GeometryKind::LineString),
    create: CREATE_ROAD,
};

pub const BLOCK: TableSpec = TableSpec {
    name: "block",
    geometry: Some(GeometryKind::Polygon),
    create: CREATE_BLOCK,
};

pub const SERVICE: TableSpec = TableSpec {
    name: "service",
    geometry: Some(GeometryKind::Point),
    create: CREATE_SERVICE,
};

pub const TAG: TableSpec = TableSpec {
    name: "tag",
    geometry: None,
    create: CREATE_TAG,
};

pub const SERVICETAG: TableSpec = TableSpec {
    name: "servicetag",
    geometry: None,
    create: CREATE_SERVICETAG,
};

/// Every table, in an order that satisfies foreign keys.
pub const TABLES: [TableSpec; 6] = [CITY, ROAD, BLOCK, SERVICE, TAG, SERVICETAG];

/// Checks that `name` is a plain identifier safe to splice into DDL.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 63 {
        Ok(())
    } else {
        Err(UrbanDbError::config(format!(
            "Invalid database name '{name}'. Use letters, digits and underscores."
        )))
    }
}

pub fn create_database(dbname: &str) -> Result<String> {
    validate_identifier(dbname)?;
    Ok(format!("CREATE DATABASE \"{dbname}\""))
}

pub fn database_exists(dbname: &str) -> Result<String> {
    validate_identifier(dbname)?;
    Ok(format!("SELECT 1 FROM pg_database WHERE datname = '{dbname}'"))
}
