//! End-to-end matching over a small calling-context tree.
//!
//! ```text
//! foo ─┬─ bar ── qux
//!      └─ baz
//! quux
//! ```

#![allow(missing_docs)]

use std::collections::BTreeSet;

use cctql::attributes::AttributeStore;
use cctql::query::object::object_query_from_json;
use cctql::query::string::compile_statement;
use cctql::query::{MatchSet, QueryEngine};
use cctql::attributes::row;
use cctql::{AggregationMode, AnyQuery, AttributeTable, Frame, Graph, NodeId, Result, Value};

const TREE: &str = r#"[
    {"frame": {"name": "foo"}, "metrics": {"time": 10.0, "time (inc)": 18.0}, "children": [
        {"frame": {"name": "bar"}, "metrics": {"time": 5.0, "time (inc)": 6.0}, "children": [
            {"frame": {"name": "qux"}, "metrics": {"time": 1.0, "time (inc)": 1.0}}
        ]},
        {"frame": {"name": "baz"}, "metrics": {"time": 2.0, "time (inc)": 2.0}}
    ]},
    {"frame": {"name": "quux"}, "metrics": {"time": 3.0, "time (inc)": 3.0}}
]"#;

fn tree() -> (Graph, AttributeTable) {
    cctql::literal::from_str(TREE).expect("literal")
}

fn names(graph: &Graph, set: &MatchSet) -> BTreeSet<String> {
    set.iter()
        .map(|id| graph[*id].frame().name().unwrap_or_default().to_string())
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn run_object(json: &str) -> Result<BTreeSet<String>> {
    let (graph, metrics) = tree();
    let query = object_query_from_json(json, AggregationMode::Off)?;
    let matched = QueryEngine::new().apply_query(&query, &graph, &metrics)?;
    Ok(names(&graph, &matched))
}

fn run_text(text: &str) -> Result<BTreeSet<String>> {
    let (graph, metrics) = tree();
    let matched = QueryEngine::new().apply_text(text, AggregationMode::Off, &graph, &metrics)?;
    Ok(names(&graph, &matched))
}

#[test]
fn closure_between_two_filters() -> Result<()> {
    let got = run_object(r#"[{"name": "bar"}, "*", {"name": "qux"}]"#)?;
    assert_eq!(got, set(&["bar", "qux"]));
    Ok(())
}

#[test]
fn string_and_object_dialects_agree() -> Result<()> {
    let (graph, metrics) = tree();
    let text = compile_statement(r#"MATCH (p)->("*")->(q) WHERE p."name"="bar""#, AggregationMode::Off)?;
    let object = object_query_from_json(r#"[{"name": "bar"}, "*", "."]"#, AggregationMode::Off)?;

    let text_quants: Vec<_> = text.entries().iter().map(|e| e.quantifier).collect();
    let object_quants: Vec<_> = object.entries().iter().map(|e| e.quantifier).collect();
    assert_eq!(text_quants, object_quants);

    let mut engine = QueryEngine::new();
    let from_text = engine.apply_query(&text, &graph, &metrics)?;
    let from_object = engine.apply_query(&object, &graph, &metrics)?;
    assert_eq!(from_text, from_object);
    assert!(names(&graph, &from_text).contains("bar"));
    Ok(())
}

#[test]
fn single_filter_selects_matching_nodes() -> Result<()> {
    assert_eq!(run_object(r#"[{"time": ">=3"}]"#)?, set(&["foo", "bar", "quux"]));
    assert_eq!(run_object(r#"[{"name": "ba."}]"#)?, set(&["bar", "baz"]));
    assert_eq!(run_object(r#"[{"time": 2}]"#)?, set(&["baz"]));
    Ok(())
}

#[test]
fn multiple_values_under_one_key_are_conjoined() -> Result<()> {
    assert_eq!(
        run_object(r#"[{"time": [">1", "<6"]}]"#)?,
        set(&["bar", "baz", "quux"])
    );
    Ok(())
}

#[test]
fn trailing_closure_covers_subtree() -> Result<()> {
    assert_eq!(
        run_text(r#"MATCH (".", p)->("*") WHERE p."name" = "bar""#)?,
        set(&["bar", "qux"])
    );
    assert_eq!(
        run_object(r#"[{"name": "foo"}, "*"]"#)?,
        set(&["foo", "bar", "baz", "qux"])
    );
    Ok(())
}

#[test]
fn leaf_tests_agree_across_dialects() -> Result<()> {
    let leaves = set(&["qux", "baz", "quux"]);
    assert_eq!(run_object(r#"[{"depth": -1}]"#)?, leaves);
    assert_eq!(run_text(r#"MATCH (".", p) WHERE p IS LEAF"#)?, leaves);
    assert_eq!(
        run_text(r#"MATCH (".", p) WHERE p IS NOT LEAF"#)?,
        set(&["foo", "bar"])
    );
    Ok(())
}

#[test]
fn depth_reads_node_metadata() -> Result<()> {
    assert_eq!(run_object(r#"[{"depth": 1}]"#)?, set(&["bar", "baz"]));
    assert_eq!(run_text(r#"MATCH (".", p) WHERE p."depth" >= 2"#)?, set(&["qux"]));
    Ok(())
}

#[test]
fn one_or_more_with_per_node_cache() -> Result<()> {
    // bar is tested for the `+` position and for the closure that follows it
    // within the same run.
    let got = run_text(
        r#"MATCH ("+", p)->(".", q) WHERE p."time" >= 2 AND q."name" = "qux""#,
    );
    // WHERE conditions on different identifiers belong to different hops.
    assert_eq!(got?, set(&["foo", "bar", "qux"]));

    let expanded = run_text(
        r#"MATCH (".", p)->("*", r)->(".", q) WHERE p."time" >= 2 AND r."time" >= 2 AND q."name" = "qux""#,
    )?;
    assert_eq!(expanded, set(&["foo", "bar", "qux"]));
    Ok(())
}

#[test]
fn fixed_count_expands_to_single_hops() -> Result<()> {
    assert_eq!(
        run_object(r#"[{"name": "foo"}, 2]"#)?,
        set(&["foo", "bar", "qux"])
    );
    Ok(())
}

#[test]
fn redundant_filters_compile_to_constants() -> Result<()> {
    assert!(run_text(r#"MATCH (".", p) WHERE p."depth" < -3"#)?.is_empty());
    assert_eq!(run_text(r#"MATCH (".", p) WHERE p."node_id" > -1"#)?.len(), 5);
    Ok(())
}

#[test]
fn missing_attribute_is_false_not_an_error() -> Result<()> {
    assert!(run_text(r#"MATCH (".", p) WHERE p."absent" > 1"#)?.is_empty());
    assert!(run_object(r#"[{"absent": ">1"}]"#)?.is_empty());
    Ok(())
}

#[test]
fn type_errors_abort_the_whole_apply() {
    let err = run_object(r#"[{"time": "fast"}]"#).expect_err("numeric column with text");
    assert_eq!(err.code(), "InvalidQueryFilter");

    let err = run_text(r#"MATCH (".", p) WHERE p."name" < 3"#).expect_err("string column");
    assert_eq!(err.code(), "InvalidQueryFilter");
}

#[test]
fn mode_must_match_store_shape() {
    let (graph, metrics) = tree();
    assert!(metrics.secondary_key().is_none());
    let err = QueryEngine::new()
        .apply_text(r#"MATCH (p)"#, AggregationMode::Any, &graph, &metrics)
        .expect_err("mode mismatch");
    assert_eq!(err.code(), "MultiIndexModeMismatch");
}

#[test]
fn apply_visits_every_node_once() -> Result<()> {
    let (graph, metrics) = tree();
    let mut engine = QueryEngine::new();
    let query = AnyQuery::from(r#"MATCH (".", p) WHERE p."name" = "nothing""#);
    let matched = engine.apply(&query, &graph, &metrics)?;
    assert!(matched.is_empty());
    assert_eq!(engine.last_stats().nodes_visited, graph.len() as u64);
    Ok(())
}

/// A -> {B, C} -> D, plus R -> A above it.
fn diamond() -> (Graph, AttributeTable, Vec<NodeId>) {
    let mut builder = Graph::builder();
    let r = builder.add_root(Frame::named("R"));
    let a = builder.add_child(r, Frame::named("A")).expect("A");
    let b = builder.add_child(a, Frame::named("B")).expect("B");
    let c = builder.add_child(a, Frame::named("C")).expect("C");
    let d = builder.add_child(b, Frame::named("D")).expect("D");
    builder.link(c, d).expect("C -> D");
    let (graph, ids) = builder.build().expect("diamond");
    let mut metrics = AttributeTable::new();
    for (key, name) in [(r, "R"), (a, "A"), (b, "B"), (c, "C"), (d, "D")] {
        metrics.insert(ids[key], row([("name", Value::from(name))]));
    }
    let order = [r, a, b, c, d].iter().map(|key| ids[*key]).collect();
    (graph, metrics, order)
}

#[test]
fn closure_routes_through_a_diamond() -> Result<()> {
    let (graph, metrics, ids) = diamond();
    assert_eq!(graph[ids[4]].parents().len(), 2);
    let mut engine = QueryEngine::new();

    let query = object_query_from_json(r#"[{"name": "A"}, "*", {"name": "D"}]"#, AggregationMode::Off)?;
    let got = engine.apply_query(&query, &graph, &metrics)?;
    assert_eq!(got, MatchSet::from([ids[1], ids[2], ids[3], ids[4]]));
    assert_eq!(engine.last_stats().paths_accepted, 2);

    // D is shared by both routes of one closure expansion
    let query = object_query_from_json(r#"[{"name": "R"}, "*"]"#, AggregationMode::Off)?;
    let got = engine.apply_query(&query, &graph, &metrics)?;
    assert_eq!(got.len(), graph.len());
    assert_eq!(engine.last_stats().paths_accepted, 2);
    Ok(())
}

#[test]
fn identical_closure_tails_collapse() -> Result<()> {
    // A -> X -> {D, D}: both children end the closure, leaving one tail [X]
    let mut builder = Graph::builder();
    let a = builder.add_root(Frame::named("A"));
    let x = builder.add_child(a, Frame::named("X")).expect("X");
    let d1 = builder.add_child(x, Frame::named("D")).expect("D1");
    let d2 = builder.add_child(x, Frame::named("D")).expect("D2");
    let (graph, ids) = builder.build().expect("graph");
    let mut metrics = AttributeTable::new();
    for (key, name) in [(a, "A"), (x, "X"), (d1, "D"), (d2, "D")] {
        metrics.insert(ids[key], row([("name", Value::from(name))]));
    }

    let query = object_query_from_json(r#"[{"name": "A"}, "*", {"name": "D"}]"#, AggregationMode::Off)?;
    let mut engine = QueryEngine::new();
    let got = engine.apply_query(&query, &graph, &metrics)?;
    assert_eq!(got.len(), 4);
    assert_eq!(engine.last_stats().paths_accepted, 2);
    Ok(())
}

#[test]
fn trailing_closure_over_a_deep_chain() -> Result<()> {
    const DEPTH: usize = 100_000;
    let mut builder = Graph::builder();
    let mut tip = builder.add_root(Frame::named("main"));
    for _ in 1..DEPTH {
        tip = builder.add_child(tip, Frame::named("recurse")).expect("child");
    }
    let (graph, _) = builder.build().expect("chain");
    let metrics = AttributeTable::new();

    let query = object_query_from_json(r#"[{"depth": 0}, "*"]"#, AggregationMode::Off)?;
    let mut engine = QueryEngine::new();
    let got = engine.apply_query(&query, &graph, &metrics)?;
    assert_eq!(got.len(), DEPTH);
    assert_eq!(engine.last_stats().paths_accepted, 1);

    let leaf = object_query_from_json(r#"[{"depth": 0}, "*", {"depth": -1}]"#, AggregationMode::Off)?;
    assert_eq!(engine.apply_query(&leaf, &graph, &metrics)?.len(), DEPTH);
    Ok(())
}
