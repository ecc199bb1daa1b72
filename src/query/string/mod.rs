//! String dialect: Cypher-like query text.
//!
//! ```text
//! MATCH (".", p)->("*")->(q)
//! WHERE p."name" STARTS WITH "MPI_" AND q."time (inc)" >= 10
//! ```
//!
//! Statements compile to the same [`Query`] representation as the object
//! dialect. Several statements (or several WHERE fragments sharing one MATCH
//! clause) can be wrapped in braces and joined with `AND`, `OR`, or `XOR`; see
//! [`parse_string_dialect`].

mod compile;
mod macros;
mod parser;

pub use compile::HopPredicate;
pub use macros::parse_string_dialect;
pub use parser::{Condition, Connective, Hop, StrOp, StringAst, Test};

use crate::attributes::AggregationMode;
use crate::error::Result;
use crate::query::pattern::Query;

/// Parses a statement without compiling it.
pub fn parse_statement(text: &str) -> Result<StringAst> {
    parser::parse(text)
}

/// Parses and compiles a single statement (no brace groups).
pub fn compile_statement(text: &str, mode: AggregationMode) -> Result<Query> {
    let ast = parser::parse(text)?;
    let query = compile::compile(&ast, mode)?;
    tracing::trace!(hops = ast.hops.len(), entries = query.len(), "compiled string query");
    Ok(query)
}
