use std::collections::HashMap;

use smallvec::SmallVec;

use crate::graph::Graph;
use crate::node::Node;
use crate::value::NodeId;

/// Common-subexpression cache keyed by cumulative hash.
///
/// A hash hit is only reused after a structural comparison (operation, payload, output count,
/// shape, own hash, and the operand outputs themselves), so a hash collision never merges
/// distinct subgraphs. Operands are compared by identity, so nodes over separately built copies
/// of an operand stay distinct.
///
/// Entries whose nodes were freed by [`Graph::collect`] are skipped and pruned lazily.
#[derive(Debug, Default)]
pub struct NodeCache {
    by_hash: HashMap<u64, SmallVec<[NodeId; 1]>>,
    hits: usize,
    misses: usize,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a live node structurally equal to `candidate`, if one was recorded.
    pub fn find(&mut self, graph: &Graph, candidate: &Node) -> Option<NodeId> {
        let Some(entries) = self.by_hash.get_mut(&candidate.cumulative_hash()) else {
            self.misses += 1;
            return None;
        };
        entries.retain(|id| graph.contains(*id));
        let found = entries
            .iter()
            .copied()
            .find(|id| structurally_equal(graph.node(*id), candidate));
        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    pub fn record(&mut self, graph: &Graph, id: NodeId) {
        let hash = graph.node(id).cumulative_hash();
        let entries = self.by_hash.entry(hash).or_default();
        if !entries.contains(&id) {
            entries.push(id);
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.by_hash.values().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
    }
}

fn structurally_equal(existing: &Node, candidate: &Node) -> bool {
    existing.op() == candidate.op()
        && existing.num_outputs() == candidate.num_outputs()
        && existing.own_hash() == candidate.own_hash()
        && existing.kind() == candidate.kind()
        && existing.shape() == candidate.shape()
        && existing.operands() == candidate.operands()
}
