//! Brace groups: `{MATCH ...} AND {MATCH ...}` and
//! `MATCH (p) WHERE {p."a" = 1} OR {p."b" = 2}`.

use std::sync::OnceLock;

use regex::{Match, Regex};

use crate::attributes::AggregationMode;
use crate::error::{QueryError, Result};
use crate::query::compound::{AnyQuery, Combinator, CompoundQuery};
use crate::query::string::compile_statement;

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{(.*?)\}").expect("brace region pattern"))
}

fn fragment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+\.").expect("where fragment pattern"))
}

fn shared_match_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)MATCH\s+(.*?)\s+WHERE").expect("match clause pattern"))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RegionKind {
    Statement,
    WhereFragment,
}

/// Parses string-dialect text, expanding brace groups.
///
/// Text without braces is a single statement and yields [`AnyQuery::Query`].
/// Otherwise every brace region must be the same kind: whole statements, or
/// WHERE fragments sharing the MATCH clause written before the first brace.
/// Regions are joined by `AND`, `OR`, or `XOR` and fold left into binary
/// [`CompoundQuery`] nodes.
pub fn parse_string_dialect(text: &str, mode: AggregationMode) -> Result<AnyQuery> {
    let text = text.trim();
    let regions: Vec<Match<'_>> = region_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .collect();
    if regions.is_empty() {
        if text.contains(|c| c == '{' || c == '}') {
            return Err(QueryError::InvalidMacro("unbalanced braces".into()));
        }
        return compile_statement(text, mode).map(AnyQuery::Query);
    }
    if text.matches('{').count() != regions.len() || text.matches('}').count() != regions.len() {
        return Err(QueryError::InvalidMacro(
            "braces must enclose non-nested regions".into(),
        ));
    }

    let kinds: Vec<RegionKind> = regions
        .iter()
        .map(|m| classify(m.as_str()))
        .collect::<Result<_>>()?;
    let kind = kinds[0];
    if kinds.iter().any(|k| *k != kind) {
        return Err(QueryError::InvalidMacro(
            "cannot mix full queries and WHERE fragments in one grouping".into(),
        ));
    }

    let mut operators = Vec::with_capacity(regions.len() - 1);
    for pair in regions.windows(2) {
        // region spans exclude the braces themselves
        let between = &text[pair[0].end() + 1..pair[1].start() - 1];
        operators.push(parse_operator(between)?);
    }
    let trailing = &text[regions[regions.len() - 1].end() + 1..];
    if !trailing.trim().is_empty() {
        return Err(QueryError::InvalidMacro(format!(
            "unexpected text after the last group: '{}'",
            trailing.trim()
        )));
    }
    let leading = &text[..regions[0].start() - 1];

    let queries: Vec<AnyQuery> = match kind {
        RegionKind::Statement => {
            if !leading.trim().is_empty() {
                return Err(QueryError::InvalidMacro(format!(
                    "unexpected text before the first group: '{}'",
                    leading.trim()
                )));
            }
            regions
                .iter()
                .map(|m| parse_string_dialect(m.as_str(), mode))
                .collect::<Result<_>>()?
        }
        RegionKind::WhereFragment => {
            let captures = shared_match_pattern()
                .captures(leading)
                .ok_or_else(|| {
                    QueryError::InvalidMacro(
                        "WHERE fragments require a MATCH ... WHERE prefix".into(),
                    )
                })?;
            let (Some(prefix), Some(clause)) = (captures.get(0), captures.get(1)) else {
                return Err(QueryError::InvalidMacro(
                    "WHERE fragments require a MATCH ... WHERE prefix".into(),
                ));
            };
            let stray = format!("{} {}", &leading[..prefix.start()], &leading[prefix.end()..]);
            if !stray.trim().is_empty() {
                return Err(QueryError::InvalidMacro(format!(
                    "unexpected text around the shared MATCH clause: '{}'",
                    stray.trim()
                )));
            }
            regions
                .iter()
                .map(|m| {
                    let statement = format!("MATCH {} WHERE {}", clause.as_str(), m.as_str());
                    compile_statement(&statement, mode).map(AnyQuery::Query)
                })
                .collect::<Result<_>>()?
        }
    };

    let mut queries = queries.into_iter();
    let mut acc = queries
        .next()
        .ok_or_else(|| QueryError::InvalidMacro("empty grouping".into()))?;
    for (op, next) in operators.into_iter().zip(queries) {
        acc = CompoundQuery::binary(op, acc, next).with_mode(mode).into();
    }
    tracing::debug!(groups = regions.len(), kind = ?kind, "expanded query grouping");
    Ok(acc)
}

fn classify(region: &str) -> Result<RegionKind> {
    let region = region.trim();
    if region.starts_with("MATCH") {
        Ok(RegionKind::Statement)
    } else if fragment_pattern().is_match(region) {
        Ok(RegionKind::WhereFragment)
    } else {
        Err(QueryError::InvalidMacro(format!(
            "group '{region}' is neither a query nor a WHERE fragment"
        )))
    }
}

fn parse_operator(between: &str) -> Result<Combinator> {
    match between.trim() {
        "AND" => Ok(Combinator::And),
        "OR" => Ok(Combinator::Or),
        "XOR" => Ok(Combinator::Xor),
        "" => Err(QueryError::InvalidMacro(
            "groups must be joined by AND, OR, or XOR".into(),
        )),
        other => Err(QueryError::InvalidMacro(format!(
            "expected AND, OR, or XOR between groups, found '{other}'"
        ))),
    }
}
