//! Crate-wide error type.

use std::io;

use thiserror::Error;

use crate::attributes::AggregationMode;
use crate::query::compound::Combinator;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while building graphs, compiling queries, or applying them.
///
/// Every variant is fatal for the operation that produced it; the engine never
/// retries internally and never returns partial match sets.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query was assembled incorrectly (e.g. `rel()` before `match()`).
    #[error("invalid query path: {0}")]
    InvalidQueryPath(String),
    /// Query text could not be parsed.
    #[error("invalid string dialect query: {message}")]
    Syntax {
        /// Parser diagnostic, including the offending position.
        message: String,
    },
    /// A predicate was applied to data of the wrong kind.
    #[error("invalid query filter: {0}")]
    InvalidQueryFilter(String),
    /// A combinator received the wrong number of subqueries.
    #[error("{combinator} requires {expected} subqueries (got {found})")]
    BadArity {
        /// Combinator being constructed.
        combinator: Combinator,
        /// Human-readable arity requirement.
        expected: &'static str,
        /// Number of subqueries supplied.
        found: usize,
    },
    /// The query's aggregation mode does not fit the attribute store layout.
    #[error(
        "aggregation mode '{mode}' cannot be used with a store that {}",
        if *store_has_secondary { "has a secondary key" } else { "has no secondary key" }
    )]
    MultiIndexModeMismatch {
        /// Mode requested by the query.
        mode: AggregationMode,
        /// Whether the store carries per-observation rows.
        store_has_secondary: bool,
    },
    /// A brace-delimited multi-query could not be expanded.
    #[error("invalid query grouping: {0}")]
    InvalidMacro(String),
    /// Graph construction violated a structural invariant.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    /// I/O failure while reading a literal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidQueryPath(_) => "InvalidQueryPath",
            QueryError::Syntax { .. } => "InvalidQueryPath",
            QueryError::InvalidQueryFilter(_) => "InvalidQueryFilter",
            QueryError::BadArity { .. } => "BadNumberNaryQueryArgs",
            QueryError::MultiIndexModeMismatch { .. } => "MultiIndexModeMismatch",
            QueryError::InvalidMacro(_) => "InvalidQueryGrouping",
            QueryError::InvalidGraph(_) => "InvalidGraph",
            QueryError::Io(_) => "Io",
            QueryError::Json(_) => "Json",
        }
    }

    pub(crate) fn path(message: impl Into<String>) -> Self {
        QueryError::InvalidQueryPath(message.into())
    }

    pub(crate) fn filter(message: impl Into<String>) -> Self {
        QueryError::InvalidQueryFilter(message.into())
    }
}
