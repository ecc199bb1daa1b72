//! Object dialect: queries written as lists of path elements.
//!
//! Each element is an attribute filter (one node), a bare quantifier (any
//! nodes), or a quantifier paired with a filter. Filters are conjunctions of
//! per-attribute tests; a string value is a full-match regex against string
//! attributes, a number is an equality test against numeric attributes, and a
//! string with a leading comparison operator is a numeric comparison.
//!
//! The same elements can be read from JSON, e.g.
//! `[{"name": "MPI_.*"}, "*", {"time (inc)": ">= 10"}]`.

use std::fmt;

use regex::Regex;
use serde_json::Value as Json;

use crate::attributes::{AggregationMode, ColumnKind, Value};
use crate::error::{QueryError, Result};
use crate::query::pattern::{QuantifierSpec, Query};
use crate::query::predicate::{NodeRows, NumericTest, Predicate};

/// Right-hand side of one attribute test.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// Regex, or a comparison such as `"< 5"`.
    Str(String),
    /// Numeric equality.
    Num(f64),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Str(v.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Str(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Num(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Num(v as f64)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Num(f64::from(v))
    }
}

/// Attribute name to values; every value of every attribute must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttrFilter {
    entries: Vec<(String, Vec<FilterValue>)>,
}

impl AttrFilter {
    /// An empty filter, which accepts every node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-valued test.
    pub fn with(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with_all(key, [value])
    }

    /// Adds a multi-valued test; the values are ANDed.
    pub fn with_all<V, I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        self.entries
            .push((key.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Whether the filter has no tests.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compiles the filter into a predicate.
    pub fn compile(&self) -> CompiledFilter {
        let mut terms = Vec::new();
        for (key, values) in &self.entries {
            for value in values {
                terms.push(FilterTerm::new(key, value));
            }
        }
        CompiledFilter { terms }
    }
}

/// One element of an object-dialect path.
#[derive(Clone, Debug, PartialEq)]
pub enum PathElement {
    /// Exactly one node matching the filter.
    Node(AttrFilter),
    /// Any nodes, quantified.
    Wildcard(QuantifierSpec),
    /// Quantified nodes matching the filter.
    Quantified(QuantifierSpec, AttrFilter),
}

impl From<AttrFilter> for PathElement {
    fn from(f: AttrFilter) -> Self {
        PathElement::Node(f)
    }
}

impl From<QuantifierSpec> for PathElement {
    fn from(q: QuantifierSpec) -> Self {
        PathElement::Wildcard(q)
    }
}

impl From<(QuantifierSpec, AttrFilter)> for PathElement {
    fn from((q, f): (QuantifierSpec, AttrFilter)) -> Self {
        PathElement::Quantified(q, f)
    }
}

/// Compiles a path into a [`Query`] evaluated with `mode`.
///
/// A count of zero contributes no positions.
pub fn compile_object_query(path: &[PathElement], mode: AggregationMode) -> Result<Query> {
    let mut query = Query::with_mode(mode);
    for element in path {
        let (spec, predicate) = match element {
            PathElement::Node(filter) => (QuantifierSpec::One, Predicate::Filter(filter.compile())),
            PathElement::Wildcard(spec) => (*spec, Predicate::always()),
            PathElement::Quantified(spec, filter) => (*spec, Predicate::Filter(filter.compile())),
        };
        if spec == QuantifierSpec::Exactly(0) {
            continue;
        }
        query.push(spec, predicate.into())?;
    }
    Ok(query)
}

/// Reads path elements from a JSON array.
pub fn parse_object_json(value: &Json) -> Result<Vec<PathElement>> {
    let Json::Array(items) = value else {
        return Err(QueryError::path("object queries must be JSON arrays"));
    };
    items.iter().map(parse_element).collect()
}

/// Parses JSON text and compiles it with `mode`.
pub fn object_query_from_json(text: &str, mode: AggregationMode) -> Result<Query> {
    let value: Json = serde_json::from_str(text)?;
    compile_object_query(&parse_object_json(&value)?, mode)
}

fn parse_element(item: &Json) -> Result<PathElement> {
    match item {
        Json::Object(_) => Ok(PathElement::Node(parse_filter(item)?)),
        Json::String(_) | Json::Number(_) => Ok(PathElement::Wildcard(parse_quantifier(item)?)),
        Json::Array(pair) if pair.len() == 2 => {
            let spec = parse_quantifier(&pair[0])?;
            if !pair[1].is_object() {
                return Err(QueryError::path(
                    "the second element of a quantified pair must be an object",
                ));
            }
            Ok(PathElement::Quantified(spec, parse_filter(&pair[1])?))
        }
        other => Err(QueryError::path(format!(
            "unrecognized path element {other}"
        ))),
    }
}

fn parse_quantifier(item: &Json) -> Result<QuantifierSpec> {
    match item {
        Json::String(s) => s.parse(),
        Json::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(QuantifierSpec::Exactly)
            .ok_or_else(|| QueryError::path(format!("invalid quantifier {n}"))),
        other => Err(QueryError::path(format!("invalid quantifier {other}"))),
    }
}

fn parse_filter(item: &Json) -> Result<AttrFilter> {
    let Json::Object(map) = item else {
        return Err(QueryError::path("attribute filters must be JSON objects"));
    };
    let mut filter = AttrFilter::new();
    for (key, raw) in map {
        let values = match raw {
            Json::Array(values) => values.iter().map(parse_filter_value).collect::<Result<Vec<_>>>()?,
            single => vec![parse_filter_value(single)?],
        };
        filter = filter.with_all(key.as_str(), values);
    }
    Ok(filter)
}

fn parse_filter_value(raw: &Json) -> Result<FilterValue> {
    match raw {
        Json::String(s) => Ok(FilterValue::Str(s.clone())),
        Json::Number(n) => n
            .as_f64()
            .map(FilterValue::Num)
            .ok_or_else(|| QueryError::filter(format!("unrepresentable number {n}"))),
        other => Err(QueryError::filter(format!(
            "filter values must be strings or numbers, got {other}"
        ))),
    }
}

/// An [`AttrFilter`] prepared for evaluation.
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    terms: Vec<FilterTerm>,
}

impl CompiledFilter {
    /// Evaluates every term, stopping at the first failure.
    pub fn evaluate(&self, ctx: &NodeRows<'_>) -> Result<bool> {
        for term in &self.terms {
            if !term.evaluate(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("true");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Target {
    Depth,
    NodeId,
    Attribute,
}

#[derive(Clone, Debug)]
struct FilterTerm {
    key: String,
    target: Target,
    raw: FilterValue,
    comparison: Option<NumericTest>,
    regex: Option<std::result::Result<Regex, String>>,
}

impl FilterTerm {
    fn new(key: &str, raw: &FilterValue) -> Self {
        let target = match key {
            "depth" => Target::Depth,
            "node_id" => Target::NodeId,
            _ => Target::Attribute,
        };
        let (comparison, regex) = match raw {
            FilterValue::Str(s) => (
                NumericTest::parse(s),
                Some(Regex::new(&format!("^(?:{s})\\z")).map_err(|e| e.to_string())),
            ),
            FilterValue::Num(_) => (None, None),
        };
        Self {
            key: key.to_owned(),
            target,
            raw: raw.clone(),
            comparison,
            regex,
        }
    }

    fn numeric_error(&self) -> QueryError {
        QueryError::filter(format!(
            "attribute '{}' has a numeric type; filters must be numbers or strings starting with a comparison operator",
            self.key
        ))
    }

    fn test_number(&self, value: f64) -> Result<bool> {
        match (&self.raw, &self.comparison) {
            (_, Some(test)) => Ok(test.matches(value)),
            (FilterValue::Num(expected), None) => Ok(value == *expected),
            (FilterValue::Str(_), None) => Err(self.numeric_error()),
        }
    }

    fn evaluate(&self, ctx: &NodeRows<'_>) -> Result<bool> {
        match self.target {
            Target::Depth => {
                if self.raw == FilterValue::Num(-1.0) {
                    return Ok(ctx.node.is_leaf());
                }
                self.test_number(f64::from(ctx.node.depth()))
            }
            Target::NodeId => self.test_number(f64::from(ctx.node.id().0)),
            Target::Attribute => self.evaluate_attribute(ctx),
        }
    }

    fn evaluate_attribute(&self, ctx: &NodeRows<'_>) -> Result<bool> {
        match ctx.rows.column_kind(&self.key) {
            ColumnKind::Missing => Ok(false),
            ColumnKind::Str => {
                let regex = match (&self.raw, &self.regex) {
                    (FilterValue::Str(_), Some(Ok(regex))) => regex,
                    (FilterValue::Str(pattern), Some(Err(e))) => {
                        return Err(QueryError::filter(format!(
                            "invalid regex '{pattern}' for attribute '{}': {e}",
                            self.key
                        )))
                    }
                    _ => {
                        return Err(QueryError::filter(format!(
                            "value for attribute '{}' must be a string",
                            self.key
                        )))
                    }
                };
                ctx.test(|row| {
                    Ok(row
                        .get(&self.key)
                        .and_then(Value::as_str)
                        .is_some_and(|s| regex.is_match(s)))
                })
            }
            ColumnKind::Numeric => {
                if matches!(self.raw, FilterValue::Str(_)) && self.comparison.is_none() {
                    return Err(self.numeric_error());
                }
                ctx.test(|row| match row.get(&self.key).and_then(Value::as_f64) {
                    Some(v) => self.test_number(v),
                    None => Ok(false),
                })
            }
            ColumnKind::Other => Err(QueryError::filter(format!(
                "attribute '{}' is neither a string nor a number; filters must be a regex for string attributes, or a number or comparison string for numeric attributes",
                self.key
            ))),
        }
    }
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.raw, &self.comparison) {
            (_, Some(test)) => write!(f, "{} {}", self.key, test),
            (FilterValue::Num(v), None) => write!(f, "{} == {}", self.key, v),
            (FilterValue::Str(s), None) => write!(f, "{} =~ {:?}", self.key, s),
        }
    }
}
