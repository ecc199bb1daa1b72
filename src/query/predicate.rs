//! Node predicates.
//!
//! Predicates are opaque to the engine: it only asks whether a node satisfies
//! one. Both dialects compile to the variants here, and callers can supply
//! their own closures with [`Predicate::custom`].

use std::fmt;
use std::sync::Arc;

use crate::attributes::{AggregationMode, Row, RowSet};
use crate::error::Result;
use crate::graph::Node;
use crate::query::object::CompiledFilter;
use crate::query::string::HopPredicate;

/// Everything a predicate may inspect about a node.
#[derive(Clone, Copy, Debug)]
pub struct NodeRows<'a> {
    /// Structural node (frame, depth, children).
    pub node: &'a Node,
    /// Metric rows for the node.
    pub rows: RowSet<'a>,
    /// Reduction applied to per-row results.
    pub mode: AggregationMode,
}

impl<'a> NodeRows<'a> {
    /// Applies `test` to every row and reduces with the query's mode.
    pub fn test<F>(&self, test: F) -> Result<bool>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        self.rows.test(self.mode, test)
    }
}

/// Caller-supplied predicate body.
pub type CustomFn = dyn Fn(&NodeRows<'_>) -> Result<bool> + Send + Sync;

/// A node predicate.
#[derive(Clone)]
pub enum Predicate {
    /// Accepts every node.
    Always,
    /// Object-dialect attribute filter.
    Filter(CompiledFilter),
    /// String-dialect condition set for one hop.
    Where(HopPredicate),
    /// Arbitrary closure.
    Custom(Arc<CustomFn>),
}

impl Predicate {
    /// The always-true predicate.
    pub fn always() -> Self {
        Predicate::Always
    }

    /// Wraps a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&NodeRows<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        Predicate::Custom(Arc::new(f))
    }

    /// Whether the node satisfies the predicate.
    pub fn evaluate(&self, ctx: &NodeRows<'_>) -> Result<bool> {
        match self {
            Predicate::Always => Ok(true),
            Predicate::Filter(filter) => filter.evaluate(ctx),
            Predicate::Where(hop) => hop.evaluate(ctx),
            Predicate::Custom(f) => f(ctx),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => f.write_str("Always"),
            Predicate::Filter(filter) => f.debug_tuple("Filter").field(filter).finish(),
            Predicate::Where(hop) => f.debug_tuple("Where").field(hop).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => f.write_str("true"),
            Predicate::Filter(filter) => write!(f, "{filter}"),
            Predicate::Where(hop) => write!(f, "{hop}"),
            Predicate::Custom(_) => f.write_str("<custom>"),
        }
    }
}

/// Numeric comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=` / `==`
    Eq,
    /// `!=` / `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// IEEE comparison; every operator except `Ne` is false when NaN is involved.
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }

    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Splits a leading operator off `text`, longest match first.
    pub fn split_prefix(text: &str) -> Option<(CompareOp, &str)> {
        const OPS: [(&str, CompareOp); 7] = [
            ("==", CompareOp::Eq),
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("<>", CompareOp::Ne),
            ("!=", CompareOp::Ne),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];
        OPS.iter()
            .find_map(|(sym, op)| text.strip_prefix(sym).map(|rest| (*op, rest)))
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a numeric comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    /// A finite literal.
    Number(f64),
    /// The NaN sentinel.
    Nan,
    /// The infinity sentinel, with its sign.
    Inf {
        /// Whether the sentinel was `-inf`.
        negative: bool,
    },
}

impl Operand {
    /// Parses a literal or one of the NaN/infinity sentinels.
    pub fn parse(text: &str) -> Option<Operand> {
        match text.trim() {
            "nan" | "NaN" | "np.nan" => Some(Operand::Nan),
            "inf" | "Inf" | "np.inf" | "+inf" => Some(Operand::Inf { negative: false }),
            "-inf" | "-Inf" | "-np.inf" => Some(Operand::Inf { negative: true }),
            other => other.parse::<f64>().ok().filter(|v| v.is_finite()).map(Operand::Number),
        }
    }

    /// Floating-point value of the operand.
    pub fn value(self) -> f64 {
        match self {
            Operand::Number(v) => v,
            Operand::Nan => f64::NAN,
            Operand::Inf { negative: false } => f64::INFINITY,
            Operand::Inf { negative: true } => f64::NEG_INFINITY,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(v) => write!(f, "{v}"),
            Operand::Nan => f.write_str("nan"),
            Operand::Inf { negative: false } => f.write_str("inf"),
            Operand::Inf { negative: true } => f.write_str("-inf"),
        }
    }
}

/// A comparison such as `>= 5` or `== nan`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericTest {
    /// Operator.
    pub op: CompareOp,
    /// Right-hand side.
    pub operand: Operand,
}

impl NumericTest {
    /// Parses `"<op> <operand>"`. Returns `None` when no operator leads.
    pub fn parse(text: &str) -> Option<NumericTest> {
        let (op, rest) = CompareOp::split_prefix(text.trim_start())?;
        let operand = Operand::parse(rest)?;
        Some(NumericTest { op, operand })
    }

    /// Evaluates the test against a stored value.
    ///
    /// A stored NaN (or infinity) matches whenever the operand is the NaN (or
    /// infinity) sentinel, regardless of operator. Against a finite operand a
    /// stored infinity keeps its sign, so `-inf < 5` holds.
    pub fn matches(&self, value: f64) -> bool {
        if value.is_nan() && self.operand == Operand::Nan {
            return true;
        }
        if value.is_infinite() && matches!(self.operand, Operand::Inf { .. }) {
            return true;
        }
        self.op.apply(value, self.operand.value())
    }
}

impl fmt::Display for NumericTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.operand)
    }
}
