//! Set algebra over subquery results.

#![allow(missing_docs)]

use cctql::query::{AttrFilter, Combinator, CompoundQuery, MatchSet, PathElement, QueryEngine};
use cctql::{AnyQuery, AttributeTable, Graph, QuantifierSpec, Result};

const TREE: &str = r#"[
    {"frame": {"name": "main"}, "metrics": {"time": 1.0}, "children": [
        {"frame": {"name": "solve"}, "metrics": {"time": 7.0}, "children": [
            {"frame": {"name": "MPI_Allreduce"}, "metrics": {"time": 4.0}},
            {"frame": {"name": "dgemm"}, "metrics": {"time": 9.0}}
        ]},
        {"frame": {"name": "MPI_Finalize"}, "metrics": {"time": 0.5}}
    ]},
    {"frame": {"name": "MPI_Init"}, "metrics": {"time": 2.0}}
]"#;

fn tree() -> (Graph, AttributeTable) {
    cctql::literal::from_str(TREE).expect("literal")
}

fn mpi() -> AnyQuery {
    AnyQuery::from(r#"MATCH (".", p) WHERE p."name" STARTS WITH "MPI_""#)
}

fn slow() -> AnyQuery {
    AnyQuery::Object(vec![PathElement::Node(AttrFilter::new().with("time", ">= 4"))])
}

fn under_solve() -> AnyQuery {
    AnyQuery::Object(vec![
        AttrFilter::new().with("name", "solve").into(),
        QuantifierSpec::ZeroOrMore.into(),
    ])
}

fn apply(query: &AnyQuery) -> Result<MatchSet> {
    let (graph, metrics) = tree();
    QueryEngine::new().apply(query, &graph, &metrics)
}

fn by_name(names: &[&str]) -> MatchSet {
    let (graph, _) = tree();
    graph
        .node_ids()
        .filter(|id| {
            graph[*id]
                .frame()
                .name()
                .is_some_and(|name| names.contains(&name))
        })
        .collect()
}

#[test]
fn conjunction_intersects() -> Result<()> {
    let got = apply(&CompoundQuery::conjunction([mpi(), slow()])?.into())?;
    assert_eq!(got, by_name(&["MPI_Allreduce"]));
    Ok(())
}

#[test]
fn disjunction_unions() -> Result<()> {
    let got = apply(&CompoundQuery::disjunction([mpi(), under_solve()])?.into())?;
    assert_eq!(
        got,
        by_name(&["MPI_Init", "MPI_Finalize", "MPI_Allreduce", "solve", "dgemm"])
    );
    Ok(())
}

#[test]
fn exclusive_disjunction_folds_left_to_right() -> Result<()> {
    // (mpi ^ slow) ^ under_solve
    let got = apply(&CompoundQuery::exclusive_disjunction([mpi(), slow(), under_solve()])?.into())?;
    assert_eq!(got, by_name(&["MPI_Init", "MPI_Finalize", "MPI_Allreduce"]));
    Ok(())
}

#[test]
fn negation_complements_against_all_nodes() -> Result<()> {
    let got = apply(&CompoundQuery::negation(mpi()).into())?;
    assert_eq!(got, by_name(&["main", "solve", "dgemm"]));
    Ok(())
}

#[test]
fn xor_of_a_query_with_itself_is_empty() -> Result<()> {
    let got = apply(&(slow() ^ slow()))?;
    assert!(got.is_empty());
    Ok(())
}

#[test]
fn double_negation_restores_the_query() -> Result<()> {
    assert_eq!(apply(&!!under_solve())?, apply(&under_solve())?);
    Ok(())
}

#[test]
fn operators_nest() -> Result<()> {
    let query = (mpi() | slow()) & !under_solve();
    let got = apply(&query)?;
    assert_eq!(got, by_name(&["MPI_Init", "MPI_Finalize"]));
    let AnyQuery::Compound(outer) = &query else {
        panic!("expected compound");
    };
    assert_eq!(outer.combinator(), Combinator::And);
    Ok(())
}

#[test]
fn arity_is_checked_at_construction() {
    let err = CompoundQuery::conjunction([mpi()]).expect_err("one subquery");
    assert_eq!(err.code(), "BadNumberNaryQueryArgs");
    let err = CompoundQuery::disjunction(Vec::<AnyQuery>::new()).expect_err("none");
    assert_eq!(err.code(), "BadNumberNaryQueryArgs");
    let err = CompoundQuery::exclusive_disjunction([slow()]).expect_err("one subquery");
    assert_eq!(err.code(), "BadNumberNaryQueryArgs");
    let err = CompoundQuery::new(Combinator::Not, [mpi(), slow()]).expect_err("two subqueries");
    assert_eq!(err.code(), "BadNumberNaryQueryArgs");
}

#[test]
fn subquery_errors_abort_the_compound() {
    let bad = AnyQuery::Object(vec![PathElement::Node(AttrFilter::new().with("time", "slow"))]);
    let err = apply(&(mpi() | bad)).expect_err("filter error");
    assert_eq!(err.code(), "InvalidQueryFilter");
}

#[test]
fn stats_count_every_subquery() -> Result<()> {
    let (graph, metrics) = tree();
    let mut engine = QueryEngine::new();
    engine.apply(&(mpi() & slow() & under_solve()), &graph, &metrics)?;
    let stats = engine.last_stats();
    assert_eq!(stats.queries_applied, 3);
    assert_eq!(stats.nodes_visited, 3 * graph.len() as u64);
    assert_eq!(stats.matched_nodes, 1);
    Ok(())
}
