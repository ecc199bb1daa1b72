//! Reading graphs and metrics from nested JSON literals.
//!
//! Two document shapes are accepted. A bare array of root nodes produces a
//! single-row store:
//!
//! ```json
//! [{"frame": {"name": "main"}, "metrics": {"time": 1.0}, "children": []}]
//! ```
//!
//! An object with a `secondary_key` produces a multi-row store, where each
//! node's `metrics` may be an array of rows:
//!
//! ```json
//! {"secondary_key": "rank", "roots": [
//!   {"frame": {"name": "main"}, "metrics": [{"rank": 0, "time": 1.0}]}
//! ]}
//! ```
//!
//! Frame attributes are copied into every row of their node so predicates can
//! test them like metrics.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::attributes::{AttributeTable, Row, Value};
use crate::error::{QueryError, Result};
use crate::graph::{Frame, FrameValue, Graph, GraphBuilder, NodeKey};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Roots(Vec<LiteralNode>),
    Keyed {
        #[serde(default)]
        secondary_key: Option<String>,
        roots: Vec<LiteralNode>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LiteralNode {
    frame: Frame,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    children: Vec<LiteralNode>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Metrics {
    One(Row),
    Many(Vec<Row>),
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::One(Row::new())
    }
}

/// Parses a literal from JSON text.
pub fn from_str(text: &str) -> Result<(Graph, AttributeTable)> {
    let document: Document = serde_json::from_str(text)?;
    build(document)
}

/// Parses a literal from a reader.
pub fn from_reader<R: Read>(reader: R) -> Result<(Graph, AttributeTable)> {
    let document: Document = serde_json::from_reader(reader)?;
    build(document)
}

/// Reads a literal from a file.
pub fn from_path(path: impl AsRef<Path>) -> Result<(Graph, AttributeTable)> {
    let text = fs::read_to_string(path.as_ref())?;
    from_str(&text)
}

fn build(document: Document) -> Result<(Graph, AttributeTable)> {
    let (secondary_key, roots) = match document {
        Document::Roots(roots) => (None, roots),
        Document::Keyed {
            secondary_key,
            roots,
        } => (secondary_key, roots),
    };

    let mut builder = GraphBuilder::new();
    let mut pending: Vec<(NodeKey, Vec<Row>)> = Vec::new();
    let mut stack: Vec<(Option<NodeKey>, LiteralNode)> =
        roots.into_iter().rev().map(|n| (None, n)).collect();
    while let Some((parent, node)) = stack.pop() {
        let LiteralNode {
            frame,
            metrics,
            children,
        } = node;
        let mut rows = match metrics {
            Metrics::One(row) => vec![row],
            Metrics::Many(rows) if secondary_key.is_some() => rows,
            Metrics::Many(_) => {
                return Err(QueryError::InvalidGraph(format!(
                    "node '{frame}' lists several metric rows but the literal has no secondary_key"
                )))
            }
        };
        for row in &mut rows {
            for (key, value) in frame.iter() {
                let value = match value {
                    FrameValue::Int(v) => Value::Int(*v),
                    FrameValue::Str(s) => Value::Str(s.clone()),
                };
                row.entry(key.to_owned()).or_insert(value);
            }
        }
        let key = match parent {
            None => builder.add_root(frame),
            Some(parent) => builder.add_child(parent, frame)?,
        };
        pending.push((key, rows));
        stack.extend(children.into_iter().rev().map(|child| (Some(key), child)));
    }

    let (graph, ids) = builder.build()?;
    let mut table = match &secondary_key {
        Some(key) => AttributeTable::with_secondary_key(key.clone()),
        None => AttributeTable::new(),
    };
    for (key, rows) in pending {
        let Some(id) = ids.get(key) else { continue };
        for row in rows {
            table.insert(id, row);
        }
    }
    tracing::debug!(
        nodes = graph.len(),
        secondary_key = secondary_key.as_deref().unwrap_or("-"),
        "loaded graph literal"
    );
    Ok((graph, table))
}
