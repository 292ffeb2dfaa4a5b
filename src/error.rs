//! Error types for urbandb.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for urbandb operations.
#[derive(Error, Debug)]
pub enum UrbanDbError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// A statement inside a mutation sequence failed.
    ///
    /// `index` is zero-based. In auto-commit mode every statement before
    /// `index` has already been committed.
    #[error("Statement {} of {total} failed: {message}", .index + 1)]
    Mutation {
        index: usize,
        total: usize,
        message: String,
    },

    /// Geometry values that could not be decoded from PostGIS.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UrbanDbError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a mutation error for the statement at `index` out of `total`.
    pub fn mutation(index: usize, total: usize, msg: impl Into<String>) -> Self {
        Self::Mutation {
            index,
            total,
            message: msg.into(),
        }
    }

    /// Creates a geometry error with the given message.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Mutation { .. } => "Mutation Error",
            Self::Geometry(_) => "Geometry Error",
            Self::Config(_) => "Configuration Error",
        }
    }

    /// Index of the failing statement when this error came from a sequence.
    pub fn failed_statement(&self) -> Option<usize> {
        match self {
            Self::Mutation { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias using UrbanDbError.
pub type Result<T> = std::result::Result<T, UrbanDbError>;
