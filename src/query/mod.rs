#![forbid(unsafe_code)]

//! Path queries over calling-context graphs.
//!
//! This module provides the query representation, both surface dialects that
//! compile to it, set-algebra combinators, and the matching engine.

/// Compiled path patterns and quantifiers.
///
/// Defines [`Query`], the single representation both dialects compile to.
pub mod pattern;

/// Node predicates and numeric comparison helpers.
pub mod predicate;

/// Object dialect: lists of attribute filters and quantifiers.
///
/// Also reads the same structure from JSON.
pub mod object;

/// String dialect: `MATCH ... WHERE ...` text and brace groupings.
pub mod string;

/// Combinators (AND, OR, XOR, NOT) over subqueries.
pub mod compound;

/// Matching engine.
///
/// Traverses the graph, anchors the pattern at candidate nodes, and returns
/// the set of nodes on any matched path.
pub mod engine;

/// Per-apply counters.
///
/// Collects cache and traversal statistics to explain query cost.
pub mod profile;

pub use compound::{AnyQuery, Combinator, CompoundQuery};
pub use engine::{MatchSet, QueryEngine};
pub use object::{AttrFilter, FilterValue, PathElement};
pub use pattern::{PatternEntry, Quantifier, QuantifierSpec, Query, MAX_PATTERN_LEN};
pub use predicate::{NodeRows, Predicate};
pub use profile::EngineStats;
pub use string::parse_string_dialect;
