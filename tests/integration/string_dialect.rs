//! String-dialect queries, including brace groupings and special float values.

#![allow(missing_docs)]

use std::collections::BTreeSet;

use cctql::attributes::row;
use cctql::query::{CompoundQuery, MatchSet, QueryEngine};
use cctql::{parse_string_dialect, AggregationMode, AttributeTable, Frame, Graph, Result, Value};

/// main -> {MPI_Send, MPI_Recv -> poll, compute -> kernel}
fn mpi_graph() -> (Graph, AttributeTable) {
    let mut b = Graph::builder();
    let main = b.add_root(Frame::named("main"));
    let send = b.add_child(main, Frame::named("MPI_Send")).expect("send");
    let recv = b.add_child(main, Frame::named("MPI_Recv")).expect("recv");
    let poll = b.add_child(recv, Frame::named("poll")).expect("poll");
    let compute = b.add_child(main, Frame::named("compute")).expect("compute");
    let kernel = b.add_child(compute, Frame::named("kernel")).expect("kernel");
    let (graph, ids) = b.build().expect("graph");

    let mut table = AttributeTable::new();
    let rows = [
        (main, "main", Value::Float(40.0)),
        (send, "MPI_Send", Value::Float(f64::NAN)),
        (recv, "MPI_Recv", Value::Float(12.0)),
        (poll, "poll", Value::Float(f64::INFINITY)),
        (compute, "compute", Value::Float(20.0)),
        (kernel, "kernel", Value::Float(18.5)),
    ];
    for (key, name, time) in rows {
        let mut r = row([("name", Value::from(name)), ("time", time)]);
        if name == "kernel" {
            r.insert("file".into(), Value::Null);
        }
        table.insert(ids[key], r);
    }
    (graph, table)
}

fn names(graph: &Graph, set: &MatchSet) -> BTreeSet<String> {
    set.iter()
        .filter_map(|id| graph[*id].frame().name())
        .map(str::to_string)
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn run(text: &str) -> Result<BTreeSet<String>> {
    let (graph, metrics) = mpi_graph();
    let matched = QueryEngine::new().apply_text(text, AggregationMode::Off, &graph, &metrics)?;
    Ok(names(&graph, &matched))
}

#[test]
fn string_operators() -> Result<()> {
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."name" STARTS WITH "MPI_""#)?,
        set(&["MPI_Send", "MPI_Recv"])
    );
    assert_eq!(run(r#"MATCH (".", p) WHERE p."name" ENDS WITH "el""#)?, set(&["kernel"]));
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."name" CONTAINS "o""#)?,
        set(&["poll", "compute"])
    );
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."name" =~ "MPI_(Send|Wait)""#)?,
        set(&["MPI_Send"])
    );
    assert_eq!(run(r#"MATCH (".", p) WHERE p.'name' = 'main'"#)?, set(&["main"]));
    Ok(())
}

#[test]
fn regex_match_is_anchored_at_start_only() -> Result<()> {
    assert_eq!(run(r#"MATCH (".", p) WHERE p."name" =~ "ker""#)?, set(&["kernel"]));
    assert!(run(r#"MATCH (".", p) WHERE p."name" =~ "ernel""#)?.is_empty());
    Ok(())
}

#[test]
fn nan_and_inf_sentinels() -> Result<()> {
    assert_eq!(run(r#"MATCH (".", p) WHERE p."time" IS NAN"#)?, set(&["MPI_Send"]));
    assert_eq!(run(r#"MATCH (".", p) WHERE p."time" IS INF"#)?, set(&["poll"]));
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."time" IS NOT NAN AND p."time" IS NOT INF"#)?,
        set(&["main", "MPI_Recv", "compute", "kernel"])
    );
    // NaN never satisfies an ordinary comparison.
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."time" > 15"#)?,
        set(&["main", "poll", "compute", "kernel"])
    );
    Ok(())
}

#[test]
fn none_tests() -> Result<()> {
    assert_eq!(run(r#"MATCH (".", p) WHERE p."file" IS NONE"#)?, set(&["kernel"]));
    Ok(())
}

#[test]
fn negation_and_connectives_fold_left_to_right() -> Result<()> {
    assert_eq!(
        run(r#"MATCH (".", p) WHERE NOT p."name" STARTS WITH "MPI" AND p."time" < 30"#)?,
        set(&["compute", "kernel"])
    );
    // (name = main OR name = kernel) AND time > 30
    assert_eq!(
        run(r#"MATCH (".", p) WHERE p."name" = "main" OR p."name" = "kernel" AND p."time" > 30"#)?,
        set(&["main"])
    );
    Ok(())
}

#[test]
fn path_with_closure_and_leaf() -> Result<()> {
    assert_eq!(
        run(r#"MATCH (".", a)->("*")->(".", b) WHERE a."name" = "main" AND b IS LEAF AND b."name" STARTS WITH "k""#)?,
        set(&["main", "compute", "kernel"])
    );
    Ok(())
}

#[test]
fn where_fragments_joined_by_and_match_a_conjunction() -> Result<()> {
    let (graph, metrics) = mpi_graph();
    let mut engine = QueryEngine::new();

    let grouped = engine.apply_text(
        r#"MATCH (".", p)->("*") WHERE {p."name" STARTS WITH "MPI"} AND {p."time" < 15}"#,
        AggregationMode::Off,
        &graph,
        &metrics,
    )?;

    let lhs = parse_string_dialect(
        r#"MATCH (".", p)->("*") WHERE p."name" STARTS WITH "MPI""#,
        AggregationMode::Off,
    )?;
    let rhs = parse_string_dialect(r#"MATCH (".", p)->("*") WHERE p."time" < 15"#, AggregationMode::Off)?;
    let conjunction = CompoundQuery::conjunction([lhs, rhs])?;
    let expected = engine.apply_compound(&conjunction, &graph, &metrics)?;

    assert_eq!(grouped, expected);
    assert_eq!(names(&graph, &grouped), set(&["MPI_Recv", "poll"]));
    Ok(())
}

#[test]
fn whole_statements_in_braces() -> Result<()> {
    assert_eq!(
        run(r#"{MATCH (".", p) WHERE p."name" = "poll"} OR {MATCH (".", p) WHERE p."name" = "kernel"}"#)?,
        set(&["poll", "kernel"])
    );
    assert_eq!(
        run(r#"{MATCH (".", p)->("*")} XOR {MATCH (".", p) WHERE p IS LEAF}"#)?,
        set(&["main", "MPI_Recv", "compute"])
    );
    Ok(())
}

#[test]
fn malformed_text_is_rejected_before_traversal() {
    let err = run(r#"MATCH (".", p WHERE p."name" = "x""#).expect_err("syntax");
    assert_eq!(err.code(), "InvalidQueryPath");

    let err = run(r#"MATCH (".", p) WHERE q."name" = "x""#).expect_err("undeclared");
    assert_eq!(err.code(), "InvalidQueryPath");

    let err = run(r#"{MATCH (p)} AND"#).expect_err("dangling operator");
    assert_eq!(err.code(), "InvalidQueryGrouping");

    let err = run(r#"{MATCH (p)} NAND {MATCH (q)}"#).expect_err("bad operator");
    assert_eq!(err.code(), "InvalidQueryGrouping");

    let err = run(r#"{MATCH (p)} AND {p."x" = 1}"#).expect_err("mixed kinds");
    assert_eq!(err.code(), "InvalidQueryGrouping");
}
