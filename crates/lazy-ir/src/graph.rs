//! Arena owning every node of a trace.
//!
//! Nodes are addressed by generational [`NodeId`]s. Operands are indices into the same arena,
//! and a node can only name nodes that are already live when it is inserted, so the graph is
//! acyclic by construction. Storage is released in bulk: [`Graph::collect`] keeps whatever is
//! reachable from the supplied root [`Value`]s and frees the rest, and dropping the graph frees
//! everything without recursing through operand chains.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::panic::Location;
use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

use crate::config::GraphConfig;
use crate::cse::NodeCache;
use crate::node::{Node, NodeSpec};
use crate::scope::BuildContext;
use crate::shape::{ShapeCache, ShapeSource};
use crate::value::{NodeId, Output, OutputMap, Use, Value};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct Graph {
    id: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    shape_cache: Option<ShapeCache>,
    config: GraphConfig,
}

impl Graph {
    /// Graph configured from the `LAZY_IR_*` environment switches.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::from_env())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let shape_cache = NonZeroUsize::new(config.shape_cache_capacity)
            .map(ShapeCache::new);
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            shape_cache,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn shape_cache(&self) -> Option<&ShapeCache> {
        self.shape_cache.as_ref()
    }

    /// Inserts a node and returns a handle to its first output.
    ///
    /// Panics on malformed specs: zero outputs, a shape that disagrees with the output count,
    /// operands that are stale, come from another graph, or address a missing output, or a
    /// payload/operation mismatch.
    #[track_caller]
    pub fn add(&mut self, ctx: &BuildContext, spec: NodeSpec) -> Value {
        let node = Node::build(self, spec, ctx.metadata(Location::caller()));
        self.insert(node)
    }

    /// Like [`Graph::add`], but returns an existing structurally equal node when `cache`
    /// knows one, leaving the graph untouched.
    #[track_caller]
    pub fn add_or_reuse(
        &mut self,
        ctx: &BuildContext,
        cache: &mut NodeCache,
        spec: NodeSpec,
    ) -> Value {
        let node = Node::build(self, spec, ctx.metadata(Location::caller()));
        if let Some(existing) = cache.find(self, &node) {
            return Value::new(existing, 0);
        }
        let value = self.insert(node);
        cache.record(self, value.node());
        value
    }

    /// Rebinds node `id` to a new operand list of the same arity.
    ///
    /// Operation, payload, output count, and hash seed carry over. A deferred node's clone stays
    /// deferred and reports the source's resolved shape.
    #[track_caller]
    pub fn clone_node(
        &mut self,
        ctx: &BuildContext,
        id: NodeId,
        operands: impl IntoIterator<Item = Value>,
    ) -> Value {
        let source = self.node(id);
        let operands: SmallVec<[Value; 4]> = operands.into_iter().collect();
        assert_eq!(
            operands.len(),
            source.operands().len(),
            "clone of {} expects {} operand(s)",
            source.op(),
            source.operands().len()
        );
        let shape = if source.has_deferred_shape() {
            let resolved = source.shape().clone();
            ShapeSource::deferred(move || resolved.clone())
        } else {
            ShapeSource::Known(source.shape().clone())
        };
        let spec = NodeSpec::with_source(source.op(), operands, shape)
            .with_outputs(source.num_outputs())
            .with_hash_seed(source.hash_seed())
            .with_kind(source.kind().clone());
        self.add(ctx, spec)
    }

    fn insert(&mut self, node: Node) -> Value {
        if self.config.log_graph_changes {
            tracing::debug!(
                op = %node.op(),
                hash = node.cumulative_hash(),
                scope = node.metadata().scope.as_str(),
                "inserting node: {node}"
            );
        }
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                    graph: self.id,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("graph exceeds u32 node slots");
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                    graph: self.id,
                }
            }
        };
        self.live += 1;
        Value::new(id, 0)
    }

    /// `None` when `id` is stale or was minted by another graph.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.graph != self.id {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Panics when `id` is stale or belongs to another graph.
    pub fn node(&self, id: NodeId) -> &Node {
        self.get(id)
            .unwrap_or_else(|| panic!("node {id} is not live in this graph"))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live nodes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|node| {
                (
                    NodeId {
                        index: index as u32,
                        generation: slot.generation,
                        graph: self.id,
                    },
                    node,
                )
            })
        })
    }

    /// Nodes reachable from `roots`, each once, operands before their users.
    pub fn post_order(&self, roots: &[Output]) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for root in roots {
            if !visited.insert(root.node) {
                continue;
            }
            stack.push((root.node, 0));
            while let Some(top) = stack.last_mut() {
                let node = self.node(top.0);
                match node.operands().get(top.1) {
                    Some(operand) => {
                        top.1 += 1;
                        if visited.insert(operand.node) {
                            stack.push((operand.node, 0));
                        }
                    }
                    None => {
                        order.push(top.0);
                        stack.pop();
                    }
                }
            }
        }
        order
    }

    /// Consumer index over every live node, keyed by the consumed output.
    pub fn users(&self) -> OutputMap<SmallVec<[Use; 4]>> {
        let mut users: OutputMap<SmallVec<[Use; 4]>> = OutputMap::new();
        for (id, node) in self.iter() {
            for (operand_index, operand) in node.operands().iter().enumerate() {
                users.entry(*operand).or_default().push(Use {
                    node: id,
                    operand_index,
                });
            }
        }
        users
    }

    /// Frees every node not reachable from `roots` and returns how many were freed.
    ///
    /// Freed slots bump their generation, so outstanding ids and handles to them go stale.
    /// Panics when a root is itself stale or belongs to another graph.
    pub fn collect(&mut self, roots: &[Value]) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut worklist: Vec<NodeId> = roots.iter().map(Value::node).collect();
        while let Some(id) = worklist.pop() {
            let node = self.node(id);
            if std::mem::replace(&mut marked[id.index as usize], true) {
                continue;
            }
            worklist.extend(node.operands().iter().map(|operand| operand.node));
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.is_some() && !marked[index] {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        tracing::debug!(freed, live = self.live, "collected graph");
        freed
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("config", &self.config)
            .finish()
    }
}
