//! Query engine for calling-context graphs.
//!
//! A calling-context graph is a DAG of call-site nodes annotated with
//! per-node metrics. Queries describe paths through it: a sequence of
//! quantified hops (`.` exactly one node, `*` zero or more, `+` one or more,
//! or a fixed count), each guarded by a predicate over the node and its
//! metrics. Applying a query returns every node that lies on a matching path.
//!
//! Queries can be built programmatically ([`query::Query`]), from lists of
//! attribute filters ([`query::object`]), or from Cypher-like text
//! ([`query::string`]), and combined with AND, OR, XOR, and NOT.
//!
//! ```
//! use cctql::attributes::AggregationMode;
//! use cctql::query::QueryEngine;
//!
//! let (graph, metrics) = cctql::literal::from_str(
//!     r#"[{"frame": {"name": "main"}, "metrics": {"time": 4.0},
//!          "children": [{"frame": {"name": "MPI_Send"}, "metrics": {"time": 3.0}}]}]"#,
//! )?;
//! let matched = QueryEngine::new().apply_text(
//!     r#"MATCH (".", p)->(q) WHERE q."name" STARTS WITH "MPI_""#,
//!     AggregationMode::Off,
//!     &graph,
//!     &metrics,
//! )?;
//! assert_eq!(matched.len(), 2);
//! # Ok::<(), cctql::QueryError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod error;
pub mod graph;
pub mod literal;
pub mod query;

pub use attributes::{AggregationMode, AttributeStore, AttributeTable, Row, Value};
pub use error::{QueryError, Result};
pub use graph::{Frame, Graph, GraphBuilder, Node, NodeId};
pub use query::{
    parse_string_dialect, AnyQuery, AttrFilter, CompoundQuery, MatchSet, PathElement, Predicate,
    QuantifierSpec, Query, QueryEngine,
};
