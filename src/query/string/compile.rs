//! Lowering of parsed statements to compiled [`Query`] values.
//!
//! Conditions are grouped by the hop identifier they mention. Each hop gets a
//! [`HopPredicate`] holding its conditions in source order; the first
//! condition's connective is dropped, so a condition list joined across
//! several hops splits into independent per-hop chains.

use std::fmt;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::attributes::{AggregationMode, ColumnKind, Value};
use crate::error::{QueryError, Result};
use crate::query::pattern::Query;
use crate::query::predicate::{CompareOp, NodeRows, Predicate};
use crate::query::string::parser::{Connective, StrOp, StringAst, Test};

/// Conditions attached to one hop.
#[derive(Clone, Debug, Default)]
pub struct HopPredicate {
    fragments: Vec<Fragment>,
}

#[derive(Clone, Debug)]
struct Fragment {
    connective: Option<Connective>,
    negated: bool,
    check: Check,
}

#[derive(Clone, Debug)]
enum Check {
    Const(bool),
    Leaf { negated: bool },
    Depth(CompareOp, f64),
    NodeId(CompareOp, f64),
    Attr { attr: String, test: AttrTest },
}

#[derive(Clone, Debug)]
enum AttrTest {
    Str { op: StrOp, value: String, regex: Option<Regex> },
    Num { op: CompareOp, value: f64 },
    Nan { negated: bool },
    Inf { negated: bool },
    None { negated: bool },
}

impl AttrTest {
    fn guard(&self) -> Option<ColumnKind> {
        match self {
            AttrTest::Str { .. } => Some(ColumnKind::Str),
            AttrTest::Num { .. } | AttrTest::Nan { .. } | AttrTest::Inf { .. } => {
                Some(ColumnKind::Numeric)
            }
            AttrTest::None { .. } => None,
        }
    }

    fn row(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else { return false };
        match self {
            AttrTest::Str { op, value: needle, regex } => {
                let Some(s) = value.as_str() else { return false };
                match op {
                    StrOp::Eq => s == needle,
                    StrOp::StartsWith => s.starts_with(needle.as_str()),
                    StrOp::EndsWith => s.ends_with(needle.as_str()),
                    StrOp::Contains => s.contains(needle.as_str()),
                    StrOp::Regex => regex.as_ref().is_some_and(|r| r.is_match(s)),
                }
            }
            AttrTest::Num { op, value: rhs } => value.as_f64().is_some_and(|v| op.apply(v, *rhs)),
            AttrTest::Nan { negated } => value.as_f64().is_some_and(f64::is_nan) != *negated,
            AttrTest::Inf { negated } => value.as_f64().is_some_and(f64::is_infinite) != *negated,
            AttrTest::None { negated } => matches!(value, Value::Null) != *negated,
        }
    }
}

impl HopPredicate {
    /// Whether the hop has no conditions.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Evaluates the hop's conditions.
    ///
    /// Type guards run first: an attribute absent from the node makes the
    /// whole predicate false, and an attribute of the wrong kind is an error.
    /// Conditions then fold left to right with short-circuiting.
    pub fn evaluate(&self, ctx: &NodeRows<'_>) -> Result<bool> {
        for fragment in &self.fragments {
            let Check::Attr { attr, test } = &fragment.check else {
                continue;
            };
            let kind = ctx.rows.column_kind(attr);
            if kind == ColumnKind::Missing {
                return Ok(false);
            }
            if let Some(expected) = test.guard() {
                if kind != expected {
                    return Err(QueryError::filter(format!(
                        "type mismatch in filter on attribute '{attr}'"
                    )));
                }
            }
        }

        let mut acc: Option<bool> = None;
        for fragment in &self.fragments {
            match (acc, fragment.connective) {
                (Some(false), Some(Connective::And)) | (Some(true), Some(Connective::Or)) => {
                    continue
                }
                _ => {}
            }
            let value = self.check(&fragment.check, ctx)? != fragment.negated;
            acc = Some(match (acc, fragment.connective) {
                (Some(prev), Some(Connective::And)) => prev && value,
                (Some(prev), Some(Connective::Or)) => prev || value,
                _ => value,
            });
        }
        Ok(acc.unwrap_or(true))
    }

    fn check(&self, check: &Check, ctx: &NodeRows<'_>) -> Result<bool> {
        Ok(match check {
            Check::Const(v) => *v,
            Check::Leaf { negated } => ctx.node.is_leaf() != *negated,
            Check::Depth(op, rhs) => op.apply(f64::from(ctx.node.depth()), *rhs),
            Check::NodeId(op, rhs) => op.apply(f64::from(ctx.node.id().0), *rhs),
            Check::Attr { attr, test } => ctx.test(|row| Ok(test.row(row.get(attr))))?,
        })
    }
}

impl fmt::Display for HopPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fragments.is_empty() {
            return f.write_str("true");
        }
        for (i, fragment) in self.fragments.iter().enumerate() {
            match fragment.connective {
                Some(Connective::And) if i > 0 => f.write_str(" AND ")?,
                Some(Connective::Or) if i > 0 => f.write_str(" OR ")?,
                _ => {}
            }
            if fragment.negated {
                f.write_str("NOT ")?;
            }
            match &fragment.check {
                Check::Const(v) => write!(f, "{v}")?,
                Check::Leaf { negated: false } => f.write_str("IS LEAF")?,
                Check::Leaf { negated: true } => f.write_str("IS NOT LEAF")?,
                Check::Depth(op, v) => write!(f, "depth {op} {v}")?,
                Check::NodeId(op, v) => write!(f, "node_id {op} {v}")?,
                Check::Attr { attr, test } => {
                    write!(f, "{attr:?} ")?;
                    match test {
                        AttrTest::Str { op, value, .. } => write!(f, "{} {value:?}", op.keyword())?,
                        AttrTest::Num { op, value } => write!(f, "{op} {value}")?,
                        AttrTest::Nan { negated } => write_is(f, *negated, "NAN")?,
                        AttrTest::Inf { negated } => write_is(f, *negated, "INF")?,
                        AttrTest::None { negated } => write_is(f, *negated, "NONE")?,
                    }
                }
            }
        }
        Ok(())
    }
}

fn write_is(f: &mut fmt::Formatter<'_>, negated: bool, what: &str) -> fmt::Result {
    if negated {
        write!(f, "IS NOT {what}")
    } else {
        write!(f, "IS {what}")
    }
}

/// Lowers a parsed statement into a [`Query`].
pub fn compile(ast: &StringAst, mode: AggregationMode) -> Result<Query> {
    let mut positions: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, hop) in ast.hops.iter().enumerate() {
        if let Some(ident) = hop.ident.as_deref() {
            if positions.insert(ident, i).is_some() {
                return Err(QueryError::path(format!(
                    "identifier '{ident}' is bound to more than one hop"
                )));
            }
        }
    }

    let mut per_hop: Vec<HopPredicate> = vec![HopPredicate::default(); ast.hops.len()];
    for condition in &ast.conditions {
        let ident = condition.test.ident();
        let Some(&position) = positions.get(ident) else {
            return Err(QueryError::path(format!(
                "identifier '{ident}' is not declared in MATCH"
            )));
        };
        let hop = &mut per_hop[position];
        let connective = if hop.fragments.is_empty() {
            None
        } else {
            condition.connective
        };
        hop.fragments.push(Fragment {
            connective,
            negated: condition.negated,
            check: lower_test(&condition.test)?,
        });
    }

    let mut query = Query::with_mode(mode);
    for (hop, predicate) in ast.hops.iter().zip(per_hop) {
        let predicate = if predicate.is_empty() {
            Predicate::always()
        } else {
            Predicate::Where(predicate)
        };
        query.push(hop.quantifier, predicate.into())?;
    }
    Ok(query)
}

fn lower_test(test: &Test) -> Result<Check> {
    Ok(match test {
        Test::Leaf { negated, .. } => Check::Leaf { negated: *negated },
        Test::Num {
            attr, op, value, ..
        } if attr == "depth" || attr == "node_id" => lower_structural(attr, *op, *value),
        Test::Num {
            attr, op, value, ..
        } => Check::Attr {
            attr: attr.clone(),
            test: AttrTest::Num {
                op: *op,
                value: *value,
            },
        },
        Test::Str {
            attr, op, value, ..
        } => {
            let regex = match op {
                StrOp::Regex => Some(Regex::new(&format!("^(?:{value})")).map_err(|e| {
                    QueryError::filter(format!("invalid regex '{value}': {e}"))
                })?),
                _ => None,
            };
            Check::Attr {
                attr: attr.clone(),
                test: AttrTest::Str {
                    op: *op,
                    value: value.clone(),
                    regex,
                },
            }
        }
        Test::IsNan { attr, negated, .. } => Check::Attr {
            attr: attr.clone(),
            test: AttrTest::Nan { negated: *negated },
        },
        Test::IsInf { attr, negated, .. } => Check::Attr {
            attr: attr.clone(),
            test: AttrTest::Inf { negated: *negated },
        },
        Test::IsNone { attr, negated, .. } => Check::Attr {
            attr: attr.clone(),
            test: AttrTest::None { negated: *negated },
        },
    })
}

fn lower_structural(attr: &str, op: CompareOp, value: f64) -> Check {
    let is_depth = attr == "depth";
    if is_depth && op == CompareOp::Eq && value == -1.0 {
        return Check::Leaf { negated: false };
    }
    if value < 0.0 {
        let constant = matches!(op, CompareOp::Gt | CompareOp::Ge | CompareOp::Ne);
        tracing::warn!(
            target: "cctql::redundant_filter",
            attribute = attr,
            op = %op,
            value,
            result = constant,
            "redundant query filter: {attr} is never negative"
        );
        return Check::Const(constant);
    }
    if is_depth {
        Check::Depth(op, value)
    } else {
        Check::NodeId(op, value)
    }
}
