//! Pest front end for the string dialect.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::{QueryError, Result};
use crate::query::pattern::QuantifierSpec;
use crate::query::predicate::CompareOp;

#[derive(Parser)]
#[grammar = "query/string/grammar.pest"]
struct StringDialectParser;

/// Parsed `MATCH ... WHERE ...` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct StringAst {
    /// Hops in path order.
    pub hops: Vec<Hop>,
    /// WHERE conditions in source order.
    pub conditions: Vec<Condition>,
}

/// One `( ... )` element of the MATCH clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Hop {
    /// Quantifier, `.` when omitted.
    pub quantifier: QuantifierSpec,
    /// Identifier bound to the hop, if any.
    pub ident: Option<String>,
}

/// How a condition joins the running result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connective {
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// A WHERE condition with its leading connective.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// `None` for the first condition.
    pub connective: Option<Connective>,
    /// Leading `NOT`.
    pub negated: bool,
    /// The test itself.
    pub test: Test,
}

/// String comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrOp {
    /// `=`
    Eq,
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `CONTAINS`
    Contains,
    /// `=~`, a regex anchored at the start of the value.
    Regex,
}

impl StrOp {
    /// Keyword form.
    pub fn keyword(self) -> &'static str {
        match self {
            StrOp::Eq => "=",
            StrOp::StartsWith => "STARTS WITH",
            StrOp::EndsWith => "ENDS WITH",
            StrOp::Contains => "CONTAINS",
            StrOp::Regex => "=~",
        }
    }
}

/// A single condition body.
#[derive(Clone, Debug, PartialEq)]
pub enum Test {
    /// `p IS [NOT] LEAF`
    Leaf {
        /// Hop identifier.
        ident: String,
        /// `IS NOT`
        negated: bool,
    },
    /// `p."x" IS [NOT] NONE`
    IsNone {
        /// Hop identifier.
        ident: String,
        /// Attribute name.
        attr: String,
        /// `IS NOT`
        negated: bool,
    },
    /// `p."x" IS [NOT] NAN`
    IsNan {
        /// Hop identifier.
        ident: String,
        /// Attribute name.
        attr: String,
        /// `IS NOT`
        negated: bool,
    },
    /// `p."x" IS [NOT] INF`
    IsInf {
        /// Hop identifier.
        ident: String,
        /// Attribute name.
        attr: String,
        /// `IS NOT`
        negated: bool,
    },
    /// `p."x" <str-op> "value"`
    Str {
        /// Hop identifier.
        ident: String,
        /// Attribute name.
        attr: String,
        /// Operator.
        op: StrOp,
        /// Right-hand side.
        value: String,
    },
    /// `p."x" <num-op> 1.5`
    Num {
        /// Hop identifier.
        ident: String,
        /// Attribute name.
        attr: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: f64,
    },
}

impl Test {
    /// Identifier the test refers to.
    pub fn ident(&self) -> &str {
        match self {
            Test::Leaf { ident, .. }
            | Test::IsNone { ident, .. }
            | Test::IsNan { ident, .. }
            | Test::IsInf { ident, .. }
            | Test::Str { ident, .. }
            | Test::Num { ident, .. } => ident,
        }
    }
}

/// Parses one statement.
pub fn parse(text: &str) -> Result<StringAst> {
    let mut pairs = StringDialectParser::parse(Rule::query, text).map_err(|e| QueryError::Syntax {
        message: e.to_string(),
    })?;
    let query = next(pairs.next(), "query")?;
    let mut hops = Vec::new();
    let mut conditions = Vec::new();
    for pair in query.into_inner() {
        match pair.as_rule() {
            Rule::match_clause => {
                for hop in pair.into_inner().filter(|p| p.as_rule() == Rule::hop) {
                    hops.push(build_hop(hop)?);
                }
            }
            Rule::where_clause => {
                for item in pair.into_inner() {
                    match item.as_rule() {
                        Rule::condition => conditions.push(build_condition(None, item)?),
                        Rule::chained => {
                            let mut inner = item.into_inner();
                            let connective = build_connective(next(inner.next(), "connective")?)?;
                            let condition = next(inner.next(), "condition")?;
                            conditions.push(build_condition(Some(connective), condition)?);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(StringAst { hops, conditions })
}

fn next<'i>(pair: Option<Pair<'i, Rule>>, what: &str) -> Result<Pair<'i, Rule>> {
    pair.ok_or_else(|| QueryError::Syntax {
        message: format!("expected {what}"),
    })
}

fn build_hop(pair: Pair<'_, Rule>) -> Result<Hop> {
    let inner = next(pair.into_inner().next(), "hop body")?;
    match inner.as_rule() {
        Rule::quantified_hop => {
            let mut parts = inner.into_inner();
            let quantifier = build_quantifier(next(parts.next(), "quantifier")?)?;
            let ident = next(parts.next(), "identifier")?.as_str().to_owned();
            Ok(Hop {
                quantifier,
                ident: Some(ident),
            })
        }
        Rule::bare_quantifier => {
            let quantifier = build_quantifier(next(inner.into_inner().next(), "quantifier")?)?;
            Ok(Hop {
                quantifier,
                ident: None,
            })
        }
        _ => Ok(Hop {
            quantifier: QuantifierSpec::One,
            ident: Some(inner.as_str().to_owned()),
        }),
    }
}

fn build_quantifier(pair: Pair<'_, Rule>) -> Result<QuantifierSpec> {
    let inner = next(pair.into_inner().next(), "quantifier")?;
    let text = match inner.as_rule() {
        Rule::string => unquote(inner)?,
        _ => inner.as_str().to_owned(),
    };
    match text.as_str() {
        "" | "0" => Ok(QuantifierSpec::One),
        _ => text.parse(),
    }
}

fn build_connective(pair: Pair<'_, Rule>) -> Result<Connective> {
    let inner = next(pair.into_inner().next(), "connective")?;
    Ok(match inner.as_rule() {
        Rule::kw_or => Connective::Or,
        _ => Connective::And,
    })
}

fn build_condition(connective: Option<Connective>, pair: Pair<'_, Rule>) -> Result<Condition> {
    let mut negated = false;
    let mut test = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::negation => negated = true,
            _ => test = Some(build_test(inner)?),
        }
    }
    Ok(Condition {
        connective,
        negated,
        test: test.ok_or_else(|| QueryError::Syntax {
            message: "expected a condition".into(),
        })?,
    })
}

fn build_test(pair: Pair<'_, Rule>) -> Result<Test> {
    let rule = pair.as_rule();
    let mut parts = pair.into_inner();
    if rule == Rule::leaf_test {
        let ident = next(parts.next(), "identifier")?.as_str().to_owned();
        let negated = parts.any(|p| p.as_rule() == Rule::negation);
        return Ok(Test::Leaf { ident, negated });
    }

    let (ident, attr) = build_property(next(parts.next(), "property")?)?;
    match rule {
        Rule::none_test | Rule::nan_test | Rule::inf_test => {
            let negated = parts.any(|p| p.as_rule() == Rule::negation);
            Ok(match rule {
                Rule::none_test => Test::IsNone {
                    ident,
                    attr,
                    negated,
                },
                Rule::nan_test => Test::IsNan {
                    ident,
                    attr,
                    negated,
                },
                _ => Test::IsInf {
                    ident,
                    attr,
                    negated,
                },
            })
        }
        Rule::string_test => {
            let op = match next(parts.next(), "operator")?.as_rule() {
                Rule::op_regex => StrOp::Regex,
                Rule::op_starts_with => StrOp::StartsWith,
                Rule::op_ends_with => StrOp::EndsWith,
                Rule::op_contains => StrOp::Contains,
                _ => StrOp::Eq,
            };
            let value = unquote(next(parts.next(), "string")?)?;
            Ok(Test::Str {
                ident,
                attr,
                op,
                value,
            })
        }
        _ => {
            let op = match next(parts.next(), "operator")?.as_rule() {
                Rule::op_le => CompareOp::Le,
                Rule::op_ge => CompareOp::Ge,
                Rule::op_ne => CompareOp::Ne,
                Rule::op_lt => CompareOp::Lt,
                Rule::op_gt => CompareOp::Gt,
                _ => CompareOp::Eq,
            };
            let literal = next(parts.next(), "number")?;
            let value = literal.as_str().parse::<f64>().map_err(|e| QueryError::Syntax {
                message: format!("invalid number '{}': {e}", literal.as_str()),
            })?;
            Ok(Test::Num {
                ident,
                attr,
                op,
                value,
            })
        }
    }
}

fn build_property(pair: Pair<'_, Rule>) -> Result<(String, String)> {
    let mut parts = pair.into_inner();
    let ident = next(parts.next(), "identifier")?.as_str().to_owned();
    let attr = unquote(next(parts.next(), "attribute name")?)?;
    Ok((ident, attr))
}

fn unquote(pair: Pair<'_, Rule>) -> Result<String> {
    let raw = next(pair.into_inner().next(), "string body")?.as_str();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}
