//! Calling-context graph model.
//!
//! A [`Graph`] is an immutable DAG of [`Node`]s stored in an arena and indexed
//! by dense [`NodeId`]s. Graphs are assembled with a [`GraphBuilder`], which
//! validates the structure and enumerates nodes in pre-order so that ids,
//! depths, and traversal order are deterministic for a given input.

mod frame;

use std::fmt;
use std::ops::Index;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{QueryError, Result};

pub use frame::{Frame, FrameValue};

/// Dense identifier of a node within one [`Graph`].
///
/// Ids are assigned in pre-order by [`GraphBuilder::build`] and double as the
/// node's position in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena index of the node.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A calling-context node.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    frame: Frame,
    depth: u32,
    parents: Vec<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Enumeration id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Identifying attributes.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Distance from a root along the first pre-order discovery path.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Parents in insertion order; empty for roots.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the node has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Ordering key used whenever the engine needs a deterministic node order.
///
/// Enumeration ids come first; the frame only matters when comparing nodes
/// drawn from different graphs.
pub fn traversal_order(node: &Node) -> (NodeId, &Frame) {
    (node.id, &node.frame)
}

/// An immutable calling-context graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Graph {
    /// Starts a new builder.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node, returning `None` for ids from another graph.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All node ids in id order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Lazy pre-order traversal visiting each node once.
    ///
    /// Each call returns a fresh iterator, so the traversal can be restarted.
    pub fn traverse(&self) -> Traverse<'_> {
        let mut stack: Vec<NodeId> = self.sorted_roots().into_iter().collect();
        stack.reverse();
        Traverse {
            graph: self,
            stack,
            seen: vec![false; self.nodes.len()],
        }
    }

    /// Roots sorted by [`traversal_order`].
    pub fn sorted_roots(&self) -> SmallVec<[NodeId; 8]> {
        self.sorted(&self.roots)
    }

    /// Children of `id` sorted by [`traversal_order`].
    pub fn sorted_children(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        match self.get(id) {
            Some(node) => self.sorted(&node.children),
            None => SmallVec::new(),
        }
    }

    fn sorted(&self, ids: &[NodeId]) -> SmallVec<[NodeId; 8]> {
        let mut out: SmallVec<[NodeId; 8]> = ids.iter().copied().collect();
        out.sort_by(|a, b| traversal_order(&self[*a]).cmp(&traversal_order(&self[*b])));
        out
    }
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

/// Pre-order iterator returned by [`Graph::traverse`].
pub struct Traverse<'g> {
    graph: &'g Graph,
    stack: Vec<NodeId>,
    seen: Vec<bool>,
}

impl<'g> Iterator for Traverse<'g> {
    type Item = &'g Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if std::mem::replace(&mut self.seen[id.index()], true) {
                continue;
            }
            let children = self.graph.sorted_children(id);
            self.stack.extend(children.iter().rev().copied());
            return Some(&self.graph[id]);
        }
        None
    }
}

/// Provisional handle returned by [`GraphBuilder`] before ids are assigned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

/// Maps builder keys to the ids assigned by [`GraphBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct NodeMap {
    ids: Vec<Option<NodeId>>,
}

impl NodeMap {
    /// The id assigned to `key`, or `None` when the node was unreachable.
    pub fn get(&self, key: NodeKey) -> Option<NodeId> {
        self.ids.get(key.0).copied().flatten()
    }
}

impl Index<NodeKey> for NodeMap {
    type Output = NodeId;

    fn index(&self, key: NodeKey) -> &NodeId {
        match self.ids.get(key.0) {
            Some(Some(id)) => id,
            _ => panic!("node key {key:?} was not enumerated"),
        }
    }
}

/// Incremental graph constructor.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    frames: Vec<Frame>,
    children: Vec<Vec<NodeKey>>,
    parents: Vec<Vec<NodeKey>>,
    roots: Vec<NodeKey>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node without linking it.
    pub fn add_node(&mut self, frame: Frame) -> NodeKey {
        let key = NodeKey(self.frames.len());
        self.frames.push(frame);
        self.children.push(Vec::new());
        self.parents.push(Vec::new());
        key
    }

    /// Adds a node and marks it as a root.
    pub fn add_root(&mut self, frame: Frame) -> NodeKey {
        let key = self.add_node(frame);
        self.roots.push(key);
        key
    }

    /// Adds a node as a child of `parent`.
    pub fn add_child(&mut self, parent: NodeKey, frame: Frame) -> Result<NodeKey> {
        self.check_key(parent)?;
        let key = self.add_node(frame);
        self.link(parent, key)?;
        Ok(key)
    }

    /// Adds an edge between existing nodes. Duplicate edges are ignored.
    pub fn link(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.check_key(parent)?;
        self.check_key(child)?;
        if parent == child {
            return Err(QueryError::InvalidGraph(format!(
                "node {} cannot be its own child",
                child.0
            )));
        }
        if !self.children[parent.0].contains(&child) {
            self.children[parent.0].push(child);
            self.parents[child.0].push(parent);
        }
        Ok(())
    }

    fn check_key(&self, key: NodeKey) -> Result<()> {
        if key.0 < self.frames.len() {
            Ok(())
        } else {
            Err(QueryError::InvalidGraph(format!("unknown node key {}", key.0)))
        }
    }

    /// Validates the structure and enumerates nodes.
    ///
    /// Nodes are numbered in pre-order (roots in insertion order, children in
    /// insertion order, each node once). A node's depth is fixed when it is
    /// first discovered. Nodes unreachable from any root are dropped.
    pub fn build(self) -> Result<(Graph, NodeMap)> {
        for root in &self.roots {
            if !self.parents[root.0].is_empty() {
                return Err(QueryError::InvalidGraph(format!(
                    "root {} has parents",
                    root.0
                )));
            }
        }
        self.check_acyclic()?;

        let mut ids: Vec<Option<NodeId>> = vec![None; self.frames.len()];
        let mut order: Vec<(NodeKey, u32)> = Vec::with_capacity(self.frames.len());
        let mut stack: Vec<(NodeKey, u32)> = self.roots.iter().rev().map(|k| (*k, 0)).collect();
        while let Some((key, depth)) = stack.pop() {
            if ids[key.0].is_some() {
                continue;
            }
            let id = u32::try_from(order.len())
                .map_err(|_| QueryError::InvalidGraph("too many nodes".into()))?;
            ids[key.0] = Some(NodeId(id));
            order.push((key, depth));
            for child in self.children[key.0].iter().rev() {
                if ids[child.0].is_none() {
                    stack.push((*child, depth + 1));
                }
            }
        }

        let remap = |keys: &[NodeKey]| -> Vec<NodeId> {
            keys.iter().filter_map(|k| ids[k.0]).collect()
        };
        let mut frames: Vec<Option<Frame>> = self.frames.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for (key, depth) in &order {
            let Some(id) = ids[key.0] else { continue };
            nodes.push(Node {
                id,
                frame: frames[key.0].take().unwrap_or_default(),
                depth: *depth,
                parents: remap(&self.parents[key.0]),
                children: remap(&self.children[key.0]),
            });
        }
        let mut roots = remap(&self.roots);
        roots.dedup();

        tracing::debug!(
            nodes = nodes.len(),
            roots = roots.len(),
            dropped = ids.iter().filter(|id| id.is_none()).count(),
            "graph built"
        );
        Ok((Graph { nodes, roots }, NodeMap { ids }))
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut marks = vec![Mark::New; self.frames.len()];
        for start in 0..self.frames.len() {
            if marks[start] != Mark::New {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::Active;
            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                match self.children[node].get(*next) {
                    Some(child) => {
                        *next += 1;
                        match marks[child.0] {
                            Mark::Active => {
                                return Err(QueryError::InvalidGraph(format!(
                                    "cycle through node {}",
                                    child.0
                                )))
                            }
                            Mark::New => {
                                marks[child.0] = Mark::Active;
                                stack.push((child.0, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }
}
