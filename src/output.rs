//! Rendering of query results for the command line.

use crate::cli::OutputFormat;
use serde_json::{Map, Value as JsonValue};
use urbandb::db::{ColumnInfo, GeoTable, QueryOutput, Row, GEOMETRY_COLUMN};
use urbandb::error::Result;
use urbandb::schema::TableSpec;

/// Renders a query result in the requested format.
pub fn render(output: &QueryOutput, format: OutputFormat) -> Result<String> {
    let (columns, rows) = flatten(output)?;
    Ok(match format {
        OutputFormat::Text => render_text(&columns, &rows),
        OutputFormat::Json => render_json(&columns, &rows),
    })
}

/// Lists schema tables, one per line.
pub fn render_tables(tables: &[TableSpec]) -> String {
    tables
        .iter()
        .map(|t| match t.geometry {
            Some(kind) => format!("{}\tgeometry({}, 4326)", t.name, kind.as_postgis()),
            None => format!("{}\t-", t.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Column names and JSON cells, with any geometry appended as WKT.
fn flatten(output: &QueryOutput) -> Result<(Vec<String>, Vec<Vec<JsonValue>>)> {
    match output {
        QueryOutput::Tabular(result) => Ok((
            names(&result.columns),
            result.rows.iter().map(row_to_json).collect(),
        )),
        QueryOutput::Spatial(table) => flatten_spatial(table),
    }
}

fn flatten_spatial(table: &GeoTable) -> Result<(Vec<String>, Vec<Vec<JsonValue>>)> {
    let mut columns = names(&table.columns);
    columns.push(GEOMETRY_COLUMN.to_string());

    let mut rows = Vec::with_capacity(table.row_count());
    for (i, row) in table.rows.iter().enumerate() {
        let mut cells = row_to_json(row);
        cells.push(
            table
                .geometry_wkt(i)?
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        );
        rows.push(cells);
    }
    Ok((columns, rows))
}

fn names(columns: &[ColumnInfo]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

fn row_to_json(row: &Row) -> Vec<JsonValue> {
    row.iter().map(|v| v.to_json()).collect()
}

fn render_text(columns: &[String], rows: &[Vec<JsonValue>]) -> String {
    let mut lines = vec![columns.join("\t")];
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                JsonValue::Null => "NULL".to_string(),
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        lines.push(cells.join("\t"));
    }
    lines.join("\n")
}

fn render_json(columns: &[String], rows: &[Vec<JsonValue>]) -> String {
    let objects: Vec<JsonValue> = rows
        .iter()
        .map(|row| {
            let object: Map<String, JsonValue> =
                columns.iter().cloned().zip(row.iter().cloned()).collect();
            JsonValue::Object(object)
        })
        .collect();
    JsonValue::Array(objects).to_string()
}
