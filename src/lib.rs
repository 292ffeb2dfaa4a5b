//! urbandb - PostGIS schema and query dispatch for urban-scaling analysis.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod schema;
