//! Pattern matching over calling-context graphs.
//!
//! The engine walks every node once, in deterministic pre-order from the
//! roots, and tries to anchor the pattern at each node that satisfies its
//! first position (or its second, when the pattern opens with `*`). Matching
//! extends partial paths one pattern position at a time: a `.` position takes
//! one matching child, a `*` position expands a closure over descendants.
//! Every node's satisfied positions are computed once per query and cached.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::attributes::{AggregationMode, AttributeStore};
use crate::error::{QueryError, Result};
use crate::graph::{Graph, NodeId};
use crate::query::compound::{AnyQuery, CompoundQuery};
use crate::query::object::compile_object_query;
use crate::query::pattern::{Quantifier, Query};
use crate::query::predicate::{NodeRows, Predicate};
use crate::query::profile::{self, EngineStats};
use crate::query::string::parse_string_dialect;

/// Set of nodes belonging to at least one matched path.
pub type MatchSet = BTreeSet<NodeId>;

type Path = Vec<NodeId>;
type Positions = SmallVec<[usize; 4]>;

/// Applies queries to graphs.
///
/// The engine owns the per-node cache, which is reset whenever a query is
/// applied, so one engine can be reused across queries and graphs.
#[derive(Debug, Default)]
pub struct QueryEngine {
    cache: FxHashMap<NodeId, Positions>,
    stats: EngineStats,
}

impl QueryEngine {
    /// Creates an engine with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all cached predicate results.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Counters from the most recent top-level apply.
    pub fn last_stats(&self) -> EngineStats {
        self.stats
    }

    /// Applies any query form. Literal queries compile with [`AggregationMode::Off`].
    pub fn apply<S>(&mut self, query: &AnyQuery, graph: &Graph, store: &S) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        self.top_level(graph, |engine| {
            engine.apply_any(query, AggregationMode::Off, graph, store)
        })
    }

    /// Applies a compiled path query.
    pub fn apply_query<S>(&mut self, query: &Query, graph: &Graph, store: &S) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        self.top_level(graph, |engine| engine.run_query(query, graph, store))
    }

    /// Applies a compound query.
    pub fn apply_compound<S>(
        &mut self,
        query: &CompoundQuery,
        graph: &Graph,
        store: &S,
    ) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        self.top_level(graph, |engine| engine.run_compound(query, graph, store))
    }

    /// Parses string-dialect text (brace groups included) and applies it.
    pub fn apply_text<S>(
        &mut self,
        text: &str,
        mode: AggregationMode,
        graph: &Graph,
        store: &S,
    ) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        let query = parse_string_dialect(text, mode)?;
        self.top_level(graph, |engine| engine.apply_any(&query, mode, graph, store))
    }

    fn top_level<F>(&mut self, graph: &Graph, run: F) -> Result<MatchSet>
    where
        F: FnOnce(&mut Self) -> Result<MatchSet>,
    {
        let start = Instant::now();
        self.stats = EngineStats::default();
        let result = run(self);
        self.stats.elapsed_ns = profile::elapsed_ns(start);
        match &result {
            Ok(matched) => {
                self.stats.matched_nodes = matched.len() as u64;
                profile::record(&self.stats);
            }
            Err(err) => {
                tracing::debug!(code = err.code(), nodes = graph.len(), "query failed: {err}");
            }
        }
        result
    }

    fn apply_any<S>(
        &mut self,
        query: &AnyQuery,
        mode: AggregationMode,
        graph: &Graph,
        store: &S,
    ) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        match query {
            AnyQuery::Query(query) => self.run_query(query, graph, store),
            AnyQuery::Compound(compound) => self.run_compound(compound, graph, store),
            AnyQuery::Object(path) => {
                let query = compile_object_query(path, mode)?;
                self.run_query(&query, graph, store)
            }
            AnyQuery::Text(text) => {
                let query = parse_string_dialect(text, mode)?;
                self.apply_any(&query, mode, graph, store)
            }
        }
    }

    fn run_compound<S>(&mut self, query: &CompoundQuery, graph: &Graph, store: &S) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        let mut results = Vec::with_capacity(query.subqueries().len());
        for sub in query.subqueries() {
            results.push(self.apply_any(sub, query.mode(), graph, store)?);
        }
        Ok(query.combine(results, graph))
    }

    fn run_query<S>(&mut self, query: &Query, graph: &Graph, store: &S) -> Result<MatchSet>
    where
        S: AttributeStore + ?Sized,
    {
        query.mode().check(store)?;
        if query.is_empty() {
            return Err(QueryError::path("cannot apply a query with an empty pattern"));
        }
        self.reset_cache();
        self.stats.queries_applied += 1;
        Matcher {
            query,
            graph,
            store,
            cache: &mut self.cache,
            stats: &mut self.stats,
        }
        .run()
    }
}

enum Visit {
    Enter(NodeId),
    Exit(NodeId),
}

/// How a node continues a `*` position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reach {
    /// No continuation passes through the node.
    Dead,
    /// The closure ends before the node (empty tail).
    Resolved,
    /// The node ends the path.
    Leaf,
    /// The node is repeated and at least one child continues.
    Through,
}

enum Emit {
    Node(NodeId),
    Pop,
}

struct Matcher<'a, S: ?Sized> {
    query: &'a Query,
    graph: &'a Graph,
    store: &'a S,
    cache: &'a mut FxHashMap<NodeId, Positions>,
    stats: &'a mut EngineStats,
}

impl<'a, S> Matcher<'a, S>
where
    S: AttributeStore + ?Sized,
{
    fn last_position(&self) -> usize {
        self.query.len() - 1
    }

    fn run(mut self) -> Result<MatchSet> {
        let mut matched = MatchSet::new();
        let mut visited = vec![false; self.graph.len()];
        let mut visited_count = 0usize;
        let opens_with_closure = self.query.entries()[0].quantifier == Quantifier::ZeroOrMore;

        let mut stack: Vec<NodeId> = self.graph.sorted_roots().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if visited[node.index()] {
                continue;
            }
            if opens_with_closure && self.satisfies(node, 1)? {
                self.collect(node, 1, &mut matched)?;
            }
            if self.satisfies(node, 0)? {
                self.collect(node, 0, &mut matched)?;
            }
            visited[node.index()] = true;
            visited_count += 1;
            self.stats.nodes_visited += 1;
            for child in self.graph.sorted_children(node).into_iter().rev() {
                if !visited[child.index()] {
                    stack.push(child);
                }
            }
        }
        debug_assert_eq!(visited_count, self.graph.len(), "every node is reachable from a root");
        Ok(matched)
    }

    fn collect(&mut self, start: NodeId, position: usize, matched: &mut MatchSet) -> Result<()> {
        self.stats.match_attempts += 1;
        if let Some(paths) = self.match_pattern(start, position)? {
            self.stats.paths_accepted += paths.len() as u64;
            for path in paths {
                matched.extend(path);
            }
        }
        Ok(())
    }

    /// Whether `node` satisfies the predicate at `position`, filling the cache
    /// with every position the node satisfies on first use.
    fn satisfies(&mut self, node: NodeId, position: usize) -> Result<bool> {
        if position >= self.query.len() {
            return Ok(false);
        }
        if let Some(positions) = self.cache.get(&node) {
            self.stats.cache_hits += 1;
            return Ok(positions.contains(&position));
        }
        self.stats.cache_misses += 1;

        let Some(node_ref) = self.graph.get(node) else {
            return Err(QueryError::InvalidGraph(format!("node {node} is not in the graph")));
        };
        let ctx = NodeRows {
            node: node_ref,
            rows: self.store.rows(node),
            mode: self.query.mode(),
        };
        let query = self.query;
        let mut positions = Positions::new();
        let mut previous: Option<(&Arc<Predicate>, bool)> = None;
        for (i, entry) in query.entries().iter().enumerate() {
            // expanded quantifiers share one predicate; evaluate it once
            let accepted = match previous {
                Some((pred, accepted)) if Arc::ptr_eq(pred, &entry.predicate) => accepted,
                _ => {
                    self.stats.predicate_evaluations += 1;
                    entry.predicate.evaluate(&ctx)?
                }
            };
            if accepted {
                positions.push(i);
            }
            previous = Some((&entry.predicate, accepted));
        }
        let hit = positions.contains(&position);
        tracing::trace!(%node, ?positions, "cached satisfied positions");
        self.cache.insert(node, positions);
        Ok(hit)
    }

    /// Children of `parent` satisfying the `.` entry at `position`.
    fn match_one(&mut self, parent: NodeId, position: usize) -> Result<Vec<Path>> {
        let mut found = Vec::new();
        for child in self.graph.sorted_children(parent) {
            if self.satisfies(child, position)? {
                found.push(vec![child]);
            }
        }
        Ok(found)
    }

    /// Continuations of the `*` entry at `position` rooted at `start`, or
    /// `None` when no continuation exists.
    ///
    /// A post-order pass classifies every reachable node once; paths are then
    /// emitted top-down through a single shared buffer.
    fn match_closure(&mut self, start: NodeId, position: usize) -> Result<Option<Vec<Path>>> {
        let is_last = position == self.last_position();
        let mut reach: FxHashMap<NodeId, Reach> = FxHashMap::default();
        let mut stack = vec![Visit::Enter(start)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node) => {
                    if reach.contains_key(&node) {
                        continue;
                    }
                    if self.satisfies(node, position + 1)? {
                        reach.insert(node, Reach::Resolved);
                        continue;
                    }
                    if !self.satisfies(node, position)? {
                        let tag = if is_last { Reach::Resolved } else { Reach::Dead };
                        reach.insert(node, tag);
                        continue;
                    }
                    let children = self.graph.sorted_children(node);
                    if children.is_empty() {
                        let tag = if is_last { Reach::Leaf } else { Reach::Dead };
                        reach.insert(node, tag);
                        continue;
                    }
                    stack.push(Visit::Exit(node));
                    for child in children.iter().rev() {
                        if !reach.contains_key(child) {
                            stack.push(Visit::Enter(*child));
                        }
                    }
                }
                Visit::Exit(node) => {
                    let live = self
                        .graph
                        .sorted_children(node)
                        .iter()
                        .any(|child| matches!(reach.get(child), Some(tag) if *tag != Reach::Dead));
                    reach.insert(node, if live { Reach::Through } else { Reach::Dead });
                }
            }
        }

        if reach.get(&start).map_or(true, |tag| *tag == Reach::Dead) {
            return Ok(None);
        }

        let mut paths: Vec<Path> = Vec::new();
        let mut current: Path = Vec::new();
        let mut emit = vec![Emit::Node(start)];
        while let Some(step) = emit.pop() {
            let node = match step {
                Emit::Pop => {
                    current.pop();
                    continue;
                }
                Emit::Node(node) => node,
            };
            match reach.get(&node).copied().unwrap_or(Reach::Dead) {
                Reach::Dead => {}
                Reach::Resolved => paths.push(current.clone()),
                Reach::Leaf => {
                    let mut path = current.clone();
                    path.push(node);
                    paths.push(path);
                }
                Reach::Through => {
                    current.push(node);
                    emit.push(Emit::Pop);
                    for child in self.graph.sorted_children(node).into_iter().rev() {
                        emit.push(Emit::Node(child));
                    }
                }
            }
        }
        dedupe(&mut paths);
        Ok(Some(paths))
    }

    /// All full paths anchored at `start`, which satisfies `position`.
    fn match_pattern(&mut self, start: NodeId, position: usize) -> Result<Option<Vec<Path>>> {
        let query = self.query;
        let entries = query.entries();
        let mut next_position = match entries[position].quantifier {
            Quantifier::ZeroOrMore => position,
            Quantifier::One => position + 1,
        };
        let mut paths: Vec<Path> = vec![vec![start]];

        while next_position < entries.len() {
            let mut extended: Vec<Path> = Vec::new();
            for path in &paths {
                let Some(&tip) = path.last() else { continue };
                let tails = match entries[next_position].quantifier {
                    Quantifier::One => self.match_one(tip, next_position)?,
                    Quantifier::ZeroOrMore => {
                        let children = self.graph.sorted_children(tip);
                        if children.is_empty() {
                            vec![Vec::new()]
                        } else {
                            let mut tails = Vec::new();
                            for child in children {
                                if let Some(found) = self.match_closure(child, next_position)? {
                                    tails.extend(found);
                                }
                            }
                            tails
                        }
                    }
                };
                for tail in tails {
                    let mut full = path.clone();
                    full.extend(tail);
                    extended.push(full);
                }
            }
            dedupe(&mut extended);
            if extended.is_empty() {
                return Ok(None);
            }
            paths = extended;
            next_position += 1;
        }
        Ok(Some(paths))
    }
}

fn dedupe(paths: &mut Vec<Path>) {
    let mut seen: FxHashSet<Path> = FxHashSet::default();
    paths.retain(|path| seen.insert(path.clone()));
}
