//! Per-node metric storage.
//!
//! An [`AttributeStore`] hands out the rows associated with a node. Stores
//! without a secondary key carry one row per node; stores with a secondary key
//! (rank, thread, ...) carry one row per observation, and predicates over them
//! are reduced to a single boolean by an [`AggregationMode`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::graph::NodeId;

/// A metric value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicitly missing value.
    Null,
    /// Integer metric.
    Int(i64),
    /// Floating-point metric; may be NaN or infinite.
    Float(f64),
    /// String metric.
    Str(String),
}

impl Value {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Null | Value::Str(_) => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            Value::Str(_) => ColumnKind::Str,
            Value::Int(_) | Value::Float(_) => ColumnKind::Numeric,
            Value::Null => ColumnKind::Other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Column name to value mapping for one observation.
pub type Row = BTreeMap<String, Value>;

/// Builds a [`Row`] from pairs.
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// How per-row predicate results combine when a node has several rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// The store has exactly one row per node.
    #[default]
    Off,
    /// Every row must satisfy the predicate.
    All,
    /// At least one row must satisfy the predicate.
    Any,
}

impl AggregationMode {
    /// Lower-case mode name.
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMode::Off => "off",
            AggregationMode::All => "all",
            AggregationMode::Any => "any",
        }
    }

    /// Errors when the mode does not fit the layout of `store`.
    pub fn check<S: AttributeStore + ?Sized>(self, store: &S) -> Result<()> {
        let has_secondary = store.secondary_key().is_some();
        match (self, has_secondary) {
            (AggregationMode::Off, false)
            | (AggregationMode::All | AggregationMode::Any, true) => Ok(()),
            _ => Err(QueryError::MultiIndexModeMismatch {
                mode: self,
                store_has_secondary: has_secondary,
            }),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(AggregationMode::Off),
            "all" => Ok(AggregationMode::All),
            "any" => Ok(AggregationMode::Any),
            other => Err(format!("unknown aggregation mode '{other}'")),
        }
    }
}

/// What kind of values a column holds for one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// No row carries the column.
    Missing,
    /// Every present value is a string.
    Str,
    /// Every present value is numeric.
    Numeric,
    /// Nulls or a mix of kinds.
    Other,
}

static EMPTY_ROW: Row = BTreeMap::new();

/// The rows a store holds for one node.
#[derive(Clone, Copy, Debug)]
pub enum RowSet<'a> {
    /// Store without a secondary key.
    Single(&'a Row),
    /// Store with a secondary key; may be empty.
    Multi(&'a [Row]),
}

impl<'a> RowSet<'a> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            RowSet::Single(_) => 1,
            RowSet::Multi(rows) => rows.len(),
        }
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the rows.
    pub fn iter(&self) -> impl Iterator<Item = &'a Row> {
        let slice: &'a [Row] = match *self {
            RowSet::Single(row) => std::slice::from_ref(row),
            RowSet::Multi(rows) => rows,
        };
        slice.iter()
    }

    /// Classifies `column` across the present values.
    pub fn column_kind(&self, column: &str) -> ColumnKind {
        let mut kind = ColumnKind::Missing;
        for value in self.iter().filter_map(|row| row.get(column)) {
            let next = value.kind();
            kind = match kind {
                ColumnKind::Missing => next,
                current if current == next => current,
                _ => return ColumnKind::Other,
            };
        }
        kind
    }

    /// Evaluates `test` per row and reduces with `mode`.
    ///
    /// `All` over zero rows is vacuously true; `Any` over zero rows is false.
    /// A single-row set ignores the mode.
    pub fn test<F>(&self, mode: AggregationMode, mut test: F) -> Result<bool>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        match (*self, mode) {
            (RowSet::Single(row), _) => test(row),
            (RowSet::Multi(rows), AggregationMode::All) => {
                for row in rows {
                    if !test(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (RowSet::Multi(rows), AggregationMode::Any) => {
                for row in rows {
                    if test(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (RowSet::Multi(_), AggregationMode::Off) => Err(QueryError::MultiIndexModeMismatch {
                mode,
                store_has_secondary: true,
            }),
        }
    }
}

/// Source of per-node metric rows.
pub trait AttributeStore {
    /// Name of the secondary index column, when rows are per observation.
    fn secondary_key(&self) -> Option<&str>;

    /// Rows for `node`. Nodes without data yield an empty row (or no rows).
    fn rows(&self, node: NodeId) -> RowSet<'_>;
}

/// In-memory [`AttributeStore`] keyed by [`NodeId`].
#[derive(Clone, Debug, Default)]
pub struct AttributeTable {
    secondary_key: Option<String>,
    rows: FxHashMap<NodeId, Vec<Row>>,
}

impl AttributeTable {
    /// A store with one row per node.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one row per `(node, key)` observation.
    pub fn with_secondary_key(key: impl Into<String>) -> Self {
        Self {
            secondary_key: Some(key.into()),
            rows: FxHashMap::default(),
        }
    }

    /// Inserts a row. Single-row stores replace; multi-row stores append.
    pub fn insert(&mut self, node: NodeId, row: Row) {
        let rows = self.rows.entry(node).or_default();
        if self.secondary_key.is_none() {
            rows.clear();
        }
        rows.push(row);
    }

    /// Sets one column on a single-row store, creating the row if needed.
    pub fn set(&mut self, node: NodeId, column: impl Into<String>, value: impl Into<Value>) {
        let rows = self.rows.entry(node).or_default();
        if rows.is_empty() {
            rows.push(Row::new());
        }
        rows[0].insert(column.into(), value.into());
    }

    /// Number of nodes with data.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no node has data.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl AttributeStore for AttributeTable {
    fn secondary_key(&self) -> Option<&str> {
        self.secondary_key.as_deref()
    }

    fn rows(&self, node: NodeId) -> RowSet<'_> {
        let rows = self.rows.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        match self.secondary_key {
            None => RowSet::Single(rows.first().unwrap_or(&EMPTY_ROW)),
            Some(_) => RowSet::Multi(rows),
        }
    }
}
