//! Set-algebra combinations of queries.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use crate::attributes::AggregationMode;
use crate::error::{QueryError, Result};
use crate::graph::Graph;
use crate::query::engine::MatchSet;
use crate::query::object::PathElement;
use crate::query::pattern::Query;

/// Set operation applied to subquery results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// Intersection.
    And,
    /// Union.
    Or,
    /// Iterated symmetric difference.
    Xor,
    /// Complement against all graph nodes.
    Not,
}

impl Combinator {
    fn arity(self) -> (&'static str, fn(usize) -> bool) {
        match self {
            Combinator::Not => ("exactly 1", |n| n == 1),
            _ => ("at least 2", |n| n >= 2),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
            Combinator::Xor => "XOR",
            Combinator::Not => "NOT",
        })
    }
}

/// Any query form the engine accepts.
#[derive(Clone, Debug)]
pub enum AnyQuery {
    /// Compiled path query.
    Query(Query),
    /// Combination of subqueries.
    Compound(CompoundQuery),
    /// Object-dialect literal, compiled when applied.
    Object(Vec<PathElement>),
    /// String-dialect literal, compiled when applied.
    Text(String),
}

impl From<Query> for AnyQuery {
    fn from(q: Query) -> Self {
        AnyQuery::Query(q)
    }
}

impl From<CompoundQuery> for AnyQuery {
    fn from(q: CompoundQuery) -> Self {
        AnyQuery::Compound(q)
    }
}

impl From<Vec<PathElement>> for AnyQuery {
    fn from(path: Vec<PathElement>) -> Self {
        AnyQuery::Object(path)
    }
}

impl From<&str> for AnyQuery {
    fn from(text: &str) -> Self {
        AnyQuery::Text(text.to_owned())
    }
}

impl From<String> for AnyQuery {
    fn from(text: String) -> Self {
        AnyQuery::Text(text)
    }
}

/// A combinator over subqueries.
#[derive(Clone, Debug)]
pub struct CompoundQuery {
    combinator: Combinator,
    subqueries: Vec<AnyQuery>,
    mode: AggregationMode,
}

impl CompoundQuery {
    /// Builds a compound query, checking the combinator's arity.
    pub fn new<I, Q>(combinator: Combinator, subqueries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<AnyQuery>,
    {
        let subqueries: Vec<AnyQuery> = subqueries.into_iter().map(Into::into).collect();
        let (expected, accepts) = combinator.arity();
        if !accepts(subqueries.len()) {
            return Err(QueryError::BadArity {
                combinator,
                expected,
                found: subqueries.len(),
            });
        }
        Ok(Self {
            combinator,
            subqueries,
            mode: AggregationMode::Off,
        })
    }

    /// Intersection of two or more subqueries.
    pub fn conjunction<I, Q>(subqueries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<AnyQuery>,
    {
        Self::new(Combinator::And, subqueries)
    }

    /// Union of two or more subqueries.
    pub fn disjunction<I, Q>(subqueries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<AnyQuery>,
    {
        Self::new(Combinator::Or, subqueries)
    }

    /// Symmetric difference of two or more subqueries.
    pub fn exclusive_disjunction<I, Q>(subqueries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<AnyQuery>,
    {
        Self::new(Combinator::Xor, subqueries)
    }

    /// Complement of one subquery.
    pub fn negation(subquery: impl Into<AnyQuery>) -> Self {
        Self {
            combinator: Combinator::Not,
            subqueries: vec![subquery.into()],
            mode: AggregationMode::Off,
        }
    }

    pub(crate) fn binary(combinator: Combinator, lhs: AnyQuery, rhs: AnyQuery) -> Self {
        Self {
            combinator,
            subqueries: vec![lhs, rhs],
            mode: AggregationMode::Off,
        }
    }

    /// Sets the mode used to compile literal subqueries.
    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    /// The combinator.
    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    /// The subqueries in order.
    pub fn subqueries(&self) -> &[AnyQuery] {
        &self.subqueries
    }

    /// Mode used to compile literal subqueries.
    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Combines already-evaluated subquery results.
    pub(crate) fn combine(&self, mut results: Vec<MatchSet>, graph: &Graph) -> MatchSet {
        match self.combinator {
            Combinator::And => {
                let mut iter = results.into_iter();
                let first = iter.next().unwrap_or_default();
                iter.fold(first, |acc, next| acc.intersection(&next).copied().collect())
            }
            Combinator::Or => results.into_iter().flatten().collect(),
            Combinator::Xor => {
                let mut iter = results.into_iter();
                let first = iter.next().unwrap_or_default();
                iter.fold(first, |acc, next| {
                    acc.symmetric_difference(&next).copied().collect()
                })
            }
            Combinator::Not => {
                let excluded = results.pop().unwrap_or_default();
                graph.node_ids().filter(|id| !excluded.contains(id)).collect()
            }
        }
    }
}

impl BitAnd for AnyQuery {
    type Output = AnyQuery;

    fn bitand(self, rhs: AnyQuery) -> AnyQuery {
        CompoundQuery::binary(Combinator::And, self, rhs).into()
    }
}

impl BitOr for AnyQuery {
    type Output = AnyQuery;

    fn bitor(self, rhs: AnyQuery) -> AnyQuery {
        CompoundQuery::binary(Combinator::Or, self, rhs).into()
    }
}

impl BitXor for AnyQuery {
    type Output = AnyQuery;

    fn bitxor(self, rhs: AnyQuery) -> AnyQuery {
        CompoundQuery::binary(Combinator::Xor, self, rhs).into()
    }
}

impl Not for AnyQuery {
    type Output = AnyQuery;

    fn not(self) -> AnyQuery {
        CompoundQuery::negation(self).into()
    }
}

impl fmt::Display for AnyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyQuery::Query(q) => write!(f, "{q}"),
            AnyQuery::Compound(c) => write!(f, "{c}"),
            AnyQuery::Object(path) => write!(f, "<object path, {} elements>", path.len()),
            AnyQuery::Text(text) => f.write_str(text),
        }
    }
}

impl fmt::Display for CompoundQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.combinator == Combinator::Not {
            if let Some(only) = self.subqueries.first() {
                return write!(f, "NOT [{only}]");
            }
        }
        for (i, sub) in self.subqueries.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", self.combinator)?;
            }
            write!(f, "[{sub}]")?;
        }
        Ok(())
    }
}
