//! Predicates over stores with several rows per node (one per MPI rank).

#![allow(missing_docs)]

use std::collections::BTreeSet;

use cctql::query::object::object_query_from_json;
use cctql::query::QueryEngine;
use cctql::{AggregationMode, AttributeStore, AttributeTable, Graph, Result};

const RANKS: &str = r#"{"secondary_key": "rank", "roots": [
    {"frame": {"name": "main"},
     "metrics": [{"rank": 0, "time": 5.0}, {"rank": 1, "time": 6.0}],
     "children": [
        {"frame": {"name": "MPI_Wait"},
         "metrics": [{"rank": 0, "time": 1.0, "label": "idle"}, {"rank": 1, "time": 30.0, "label": 2}]},
        {"frame": {"name": "compute"},
         "metrics": [{"rank": 0, "time": 20.0}, {"rank": 1, "time": 21.0}]}
     ]}
]}"#;

fn ranks() -> (Graph, AttributeTable) {
    cctql::literal::from_str(RANKS).expect("literal")
}

fn names(graph: &Graph, set: &cctql::MatchSet) -> BTreeSet<String> {
    set.iter()
        .filter_map(|id| graph[*id].frame().name())
        .map(str::to_string)
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn object(json: &str, mode: AggregationMode) -> Result<BTreeSet<String>> {
    let (graph, metrics) = ranks();
    let query = object_query_from_json(json, mode)?;
    let matched = QueryEngine::new().apply_query(&query, &graph, &metrics)?;
    Ok(names(&graph, &matched))
}

fn text(query: &str, mode: AggregationMode) -> Result<BTreeSet<String>> {
    let (graph, metrics) = ranks();
    let matched = QueryEngine::new().apply_text(query, mode, &graph, &metrics)?;
    Ok(names(&graph, &matched))
}

#[test]
fn literal_keeps_every_rank() {
    let (graph, metrics) = ranks();
    assert_eq!(metrics.secondary_key(), Some("rank"));
    for id in graph.node_ids() {
        assert_eq!(metrics.rows(id).len(), 2);
    }
}

#[test]
fn all_requires_every_row() -> Result<()> {
    assert_eq!(object(r#"[{"time": "> 10"}]"#, AggregationMode::All)?, set(&["compute"]));
    assert_eq!(
        text(r#"MATCH (".", p) WHERE p."time" > 10"#, AggregationMode::All)?,
        set(&["compute"])
    );
    Ok(())
}

#[test]
fn any_accepts_one_row() -> Result<()> {
    let expected = set(&["MPI_Wait", "compute"]);
    assert_eq!(object(r#"[{"time": "> 10"}]"#, AggregationMode::Any)?, expected);
    assert_eq!(
        text(r#"MATCH (".", p) WHERE p."time" > 10"#, AggregationMode::Any)?,
        expected
    );
    Ok(())
}

#[test]
fn paths_use_the_same_mode_at_every_hop() -> Result<()> {
    assert_eq!(
        text(
            r#"MATCH (".", p)->(".", q) WHERE p."name" = "main" AND q."time" >= 20"#,
            AggregationMode::All,
        )?,
        set(&["main", "compute"])
    );
    assert_eq!(
        text(
            r#"MATCH (".", p)->(".", q) WHERE p."name" = "main" AND q."time" >= 20"#,
            AggregationMode::Any,
        )?,
        set(&["main", "MPI_Wait", "compute"])
    );
    Ok(())
}

#[test]
fn node_metadata_ignores_rows() -> Result<()> {
    let leaves = set(&["MPI_Wait", "compute"]);
    assert_eq!(object(r#"[{"depth": -1}]"#, AggregationMode::All)?, leaves);
    assert_eq!(text(r#"MATCH (".", p) WHERE p IS LEAF"#, AggregationMode::Any)?, leaves);
    Ok(())
}

#[test]
fn mixed_column_types_are_filter_errors() {
    let err = object(r#"[{"label": "idle"}]"#, AggregationMode::Any).expect_err("mixed column");
    assert_eq!(err.code(), "InvalidQueryFilter");
    let err = text(r#"MATCH (".", p) WHERE p."label" = "idle""#, AggregationMode::Any)
        .expect_err("mixed column");
    assert_eq!(err.code(), "InvalidQueryFilter");
}

#[test]
fn off_mode_is_rejected_for_multi_row_stores() {
    let err = object(r#"[{"time": "> 10"}]"#, AggregationMode::Off).expect_err("mismatch");
    assert_eq!(err.code(), "MultiIndexModeMismatch");
    let err = text(r#"MATCH (p)"#, AggregationMode::Off).expect_err("mismatch");
    assert_eq!(err.code(), "MultiIndexModeMismatch");
}
