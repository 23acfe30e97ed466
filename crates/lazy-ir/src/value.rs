//! Handles addressing node outputs.
//!
//! [`Output`] is a plain coordinate `(node, index)` that never keeps anything alive; it is what
//! consumer-side bookkeeping (use lists, lowering caches, [`OutputMap`]) is keyed by. [`Value`]
//! is the operand handle: it is minted by the [`Graph`] on insertion, is what new nodes capture
//! as operands, and is what callers hand to [`Graph::collect`] to keep a subgraph alive. A
//! `Value` converts into an `Output`; the reverse conversion deliberately does not exist.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::hashing::hash_combine;
use crate::types::ValueType;

/// Generational index of a node slot, tagged with the [`Graph`] that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
    pub(crate) graph: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// Non-owning reference to one output of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }

    /// Shape of this specific output; for a multi-output producer this is a tuple element.
    pub fn shape<'g>(&self, graph: &'g Graph) -> &'g ValueType {
        graph.node(self.node).shape_at(self.index)
    }

    /// Full shape of the producer (a tuple for multi-output nodes).
    pub fn node_shape<'g>(&self, graph: &'g Graph) -> &'g ValueType {
        graph.node(self.node).shape()
    }

    /// Content hash: the producer's cumulative hash combined with the output index.
    pub fn content_hash(&self, graph: &Graph) -> u64 {
        hash_combine(graph.node(self.node).cumulative_hash(), self.index as u64)
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

/// Operand handle that retains its producer across [`Graph::collect`].
///
/// Not `Copy`: sharing a producer is an explicit `clone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    node: NodeId,
    index: usize,
}

impl Value {
    pub(crate) fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Addresses output `index` of the same producer.
    ///
    /// The index is checked against the producer's output count when the value is used.
    pub fn at(&self, index: usize) -> Value {
        Value::new(self.node, index)
    }

    pub fn output(&self) -> Output {
        Output::new(self.node, self.index)
    }

    pub fn shape<'g>(&self, graph: &'g Graph) -> &'g ValueType {
        self.output().shape(graph)
    }

    pub fn node_shape<'g>(&self, graph: &'g Graph) -> &'g ValueType {
        self.output().node_shape(graph)
    }

    pub fn content_hash(&self, graph: &Graph) -> u64 {
        self.output().content_hash(graph)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        value.output()
    }
}

impl From<&Value> for Output {
    fn from(value: &Value) -> Self {
        value.output()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.output())
    }
}

/// One consumer edge: `node` reads the output through its `operand_index`-th operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub node: NodeId,
    pub operand_index: usize,
}

pub type OutputSet = HashSet<Output>;

pub type OutputMap<T> = HashMap<Output, T>;
