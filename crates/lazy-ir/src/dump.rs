//! Human- and machine-readable dumps of a subgraph.
//!
//! Every dump walks the post-order of the supplied roots and names nodes `%0`, `%1`, ... by
//! their position in that order, so two structurally identical graphs produce identical text.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::Graph;
use crate::scope::SourceLocation;
use crate::types::ValueType;
use crate::value::{NodeId, Output};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Reference to output `index` of the node at `node` in [`GraphSnapshot::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOperand {
    pub node: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub op: String,
    pub details: String,
    pub operands: Vec<SnapshotOperand>,
    pub shape: ValueType,
    pub num_outputs: usize,
    pub hash: u64,
    pub scope: String,
    #[serde(default)]
    pub frames: Vec<SourceLocation>,
}

/// Serializable post-order listing of a subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub roots: Vec<SnapshotOperand>,
}

impl GraphSnapshot {
    pub fn capture(graph: &Graph, roots: &[Output]) -> Self {
        let order = graph.post_order(roots);
        let positions = positions(&order);
        let locate = |output: &Output| SnapshotOperand {
            node: positions[&output.node],
            index: output.index,
        };
        let nodes = order
            .iter()
            .map(|id| {
                let node = graph.node(*id);
                SnapshotNode {
                    op: node.op().name().to_string(),
                    details: node.kind().details(),
                    operands: node.operands().iter().map(locate).collect(),
                    shape: node.shape().clone(),
                    num_outputs: node.num_outputs(),
                    hash: node.cumulative_hash(),
                    scope: node.metadata().scope.clone(),
                    frames: node.metadata().frames.clone(),
                }
            })
            .collect();
        GraphSnapshot {
            nodes,
            roots: roots.iter().map(locate).collect(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, DumpError> {
        serde_json::to_string_pretty(self).map_err(DumpError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, DumpError> {
        serde_json::from_str(src).map_err(DumpError::from)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, DumpError> {
        bincode::serialize(self).map_err(DumpError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, DumpError> {
        bincode::deserialize(bytes).map_err(DumpError::from)
    }
}

fn positions(order: &[NodeId]) -> HashMap<NodeId, usize> {
    order
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect()
}

fn operand_name(operand: &SnapshotOperand, nodes: &[SnapshotNode]) -> String {
    if nodes[operand.node].num_outputs > 1 {
        format!("%{}.{}", operand.node, operand.index)
    } else {
        format!("%{}", operand.node)
    }
}

/// Text listing in the form
///
/// ```text
/// IR {
///   %0 = f32[] ir::const
///   %1 = f32[] ir::add(%0, %0), scope=forward.1, ROOT=0
/// }
/// ```
pub fn to_text(graph: &Graph, roots: &[Output]) -> String {
    let snapshot = GraphSnapshot::capture(graph, roots);
    let mut root_ids: HashMap<usize, Vec<usize>> = HashMap::new();
    for (root_index, root) in snapshot.roots.iter().enumerate() {
        root_ids.entry(root.node).or_default().push(root_index);
    }

    let mut out = String::from("IR {\n");
    for (position, node) in snapshot.nodes.iter().enumerate() {
        let _ = write!(out, "  %{position} = {} {}", node.shape, node.op);
        if !node.operands.is_empty() {
            let operands = node
                .operands
                .iter()
                .map(|operand| operand_name(operand, &snapshot.nodes))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "({operands})");
        }
        if !node.details.is_empty() {
            let _ = write!(out, ", {}", node.details);
        }
        if !node.scope.is_empty() {
            let _ = write!(out, ", scope={}", node.scope);
        }
        if let Some(frame) = node.frames.first() {
            let _ = write!(out, ", location={frame}");
        }
        if let Some(indices) = root_ids.get(&position) {
            for index in indices {
                let _ = write!(out, ", ROOT={index}");
            }
        }
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// Graphviz rendering with edges labelled by operand index.
pub fn to_dot(graph: &Graph, roots: &[Output]) -> String {
    let snapshot = GraphSnapshot::capture(graph, roots);
    let mut out = String::from("digraph G {\n");
    for (position, node) in snapshot.nodes.iter().enumerate() {
        let mut label = format!(
            "{}\\n{}",
            escape_dot(&node.op),
            escape_dot(&node.shape.to_string())
        );
        if !node.scope.is_empty() {
            let _ = write!(label, "\\nscope={}", escape_dot(&node.scope));
        }
        let _ = writeln!(out, "  node{position} [label=\"{label}\"]");
    }
    for (position, node) in snapshot.nodes.iter().enumerate() {
        for (operand_index, operand) in node.operands.iter().enumerate() {
            let source_has_tuple = snapshot.nodes[operand.node].num_outputs > 1;
            let label = if source_has_tuple {
                format!("i={operand_index}, o={}", operand.index)
            } else {
                format!("i={operand_index}")
            };
            let _ = writeln!(
                out,
                "  node{} -> node{position} [label=\"{label}\"]",
                operand.node
            );
        }
    }
    out.push_str("}\n");
    out
}

/// Escapes text for a double-quoted DOT string.
fn escape_dot(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
