//! Compiled path patterns.
//!
//! A [`Query`] is an ordered list of [`PatternEntry`] values. Every entry pairs
//! one of the two primitive quantifiers with a shared predicate; the sugared
//! forms of [`QuantifierSpec`] expand into primitives when the entry is added.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::attributes::AggregationMode;
use crate::error::{QueryError, Result};
use crate::query::predicate::Predicate;

/// Primitive quantifier of a compiled pattern entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// Exactly one node (`.`).
    One,
    /// Zero or more nodes (`*`).
    ZeroOrMore,
}

impl Quantifier {
    /// Conventional symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Quantifier::One => ".",
            Quantifier::ZeroOrMore => "*",
        }
    }
}

/// Quantifier as written by users, before expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuantifierSpec {
    /// `.`
    One,
    /// `*`
    ZeroOrMore,
    /// `+`, expanded to `.` followed by `*`.
    OneOrMore,
    /// A positive count, expanded to that many `.` entries.
    Exactly(usize),
}

impl QuantifierSpec {
    fn expand(self) -> Result<Vec<Quantifier>> {
        Ok(match self {
            QuantifierSpec::One => vec![Quantifier::One],
            QuantifierSpec::ZeroOrMore => vec![Quantifier::ZeroOrMore],
            QuantifierSpec::OneOrMore => vec![Quantifier::One, Quantifier::ZeroOrMore],
            QuantifierSpec::Exactly(0) => {
                return Err(QueryError::path("quantifier count must be positive"))
            }
            QuantifierSpec::Exactly(n) => vec![Quantifier::One; n],
        })
    }
}

impl FromStr for QuantifierSpec {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "." => Ok(QuantifierSpec::One),
            "*" => Ok(QuantifierSpec::ZeroOrMore),
            "+" => Ok(QuantifierSpec::OneOrMore),
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse()
                .map(QuantifierSpec::Exactly)
                .map_err(|_| QueryError::path(format!("quantifier '{s}' is out of range"))),
            other => Err(QueryError::path(format!("invalid quantifier '{other}'"))),
        }
    }
}

impl From<usize> for QuantifierSpec {
    fn from(n: usize) -> Self {
        QuantifierSpec::Exactly(n)
    }
}

impl From<Quantifier> for QuantifierSpec {
    fn from(q: Quantifier) -> Self {
        match q {
            Quantifier::One => QuantifierSpec::One,
            Quantifier::ZeroOrMore => QuantifierSpec::ZeroOrMore,
        }
    }
}

impl fmt::Display for QuantifierSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantifierSpec::One => f.write_str("."),
            QuantifierSpec::ZeroOrMore => f.write_str("*"),
            QuantifierSpec::OneOrMore => f.write_str("+"),
            QuantifierSpec::Exactly(n) => write!(f, "{n}"),
        }
    }
}

/// Longest pattern a query may expand to.
pub const MAX_PATTERN_LEN: usize = 1 << 16;

/// One position of a compiled pattern.
#[derive(Clone, Debug)]
pub struct PatternEntry {
    /// Primitive quantifier.
    pub quantifier: Quantifier,
    /// Predicate every node at this position must satisfy.
    pub predicate: Arc<Predicate>,
}

/// A compiled path query.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pattern: Vec<PatternEntry>,
    mode: AggregationMode,
}

impl Query {
    /// Creates an empty query with [`AggregationMode::Off`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty query evaluated with `mode`.
    pub fn with_mode(mode: AggregationMode) -> Self {
        Self {
            pattern: Vec::new(),
            mode,
        }
    }

    /// Resets the pattern and starts it with `quantifier`/`predicate`.
    pub fn r#match(
        mut self,
        quantifier: impl Into<QuantifierSpec>,
        predicate: Predicate,
    ) -> Result<Self> {
        self.pattern.clear();
        self.push(quantifier.into(), Arc::new(predicate))?;
        Ok(self)
    }

    /// Appends a hop. Fails when no [`Query::r#match`] came first.
    pub fn rel(mut self, quantifier: impl Into<QuantifierSpec>, predicate: Predicate) -> Result<Self> {
        if self.pattern.is_empty() {
            return Err(QueryError::path(
                "queries must start with match() before rel() is called",
            ));
        }
        self.push(quantifier.into(), Arc::new(predicate))?;
        Ok(self)
    }

    pub(crate) fn push(&mut self, spec: QuantifierSpec, predicate: Arc<Predicate>) -> Result<()> {
        let added = match spec {
            QuantifierSpec::Exactly(n) => n,
            QuantifierSpec::OneOrMore => 2,
            QuantifierSpec::One | QuantifierSpec::ZeroOrMore => 1,
        };
        if self.pattern.len().saturating_add(added) > MAX_PATTERN_LEN {
            return Err(QueryError::path(format!(
                "pattern would exceed {MAX_PATTERN_LEN} positions"
            )));
        }
        for quantifier in spec.expand()? {
            self.pattern.push(PatternEntry {
                quantifier,
                predicate: Arc::clone(&predicate),
            });
        }
        Ok(())
    }

    /// Compiled entries.
    pub fn entries(&self) -> &[PatternEntry] {
        &self.pattern
    }

    /// Number of compiled entries.
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Whether the pattern is empty.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Aggregation mode used for multi-row stores.
    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Replaces the aggregation mode.
    pub fn set_mode(&mut self, mode: AggregationMode) {
        self.mode = mode;
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.pattern.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "({} {})", entry.quantifier.symbol(), entry.predicate)?;
        }
        Ok(())
    }
}
