//! IR nodes.
//!
//! A [`Node`] is immutable once the [`Graph`](crate::graph::Graph) hands out its [`Value`]:
//! operands, hashes, shape, and metadata are fixed at construction, including a deferred shape,
//! which is resolved while the node is built. Operation-specific state lives in the closed
//! [`NodeKind`] sum type rather than in subclasses.

mod kinds;

use std::fmt;

use smallvec::SmallVec;

use crate::graph::Graph;
use crate::hashing::{hash_combine, hash_value, DEFAULT_HASH_SEED, SHAPE_KEY_DOMAIN};
use crate::op_kind::{known, OpKind};
use crate::scope::SourceLocation;
use crate::shape::{ShapeCell, ShapeSource};
use crate::types::ValueType;
use crate::value::{Output, Value};

pub use kinds::{
    node_cast, CastNode, ConstantNode, DeviceDataNode, NodeKind, NodeView, PermuteNode,
    ReshapeNode, TopKNode,
};

/// Diagnostic data attached to a node. Never part of its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    pub scope: String,
    pub frames: Vec<SourceLocation>,
}

/// Everything needed to insert a node; consumed by [`Graph::add`](crate::graph::Graph::add).
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub(crate) op: OpKind,
    pub(crate) kind: NodeKind,
    pub(crate) operands: SmallVec<[Value; 4]>,
    pub(crate) shape: ShapeSource,
    pub(crate) num_outputs: usize,
    pub(crate) hash_seed: u64,
}

impl NodeSpec {
    /// Node with operands and an already known shape.
    pub fn new(op: OpKind, operands: impl IntoIterator<Item = Value>, shape: ValueType) -> Self {
        Self::with_source(op, operands, ShapeSource::Known(shape))
    }

    /// Node whose shape is computed by `shape_fn` when the node is inserted.
    pub fn deferred<F>(op: OpKind, operands: impl IntoIterator<Item = Value>, shape_fn: F) -> Self
    where
        F: Fn() -> ValueType + Send + Sync + 'static,
    {
        Self::with_source(op, operands, ShapeSource::deferred(shape_fn))
    }

    /// Operand-less node (constants, inputs).
    pub fn leaf(op: OpKind, shape: ValueType, num_outputs: usize, hash_seed: u64) -> Self {
        Self::with_source(op, [], ShapeSource::Known(shape))
            .with_outputs(num_outputs)
            .with_hash_seed(hash_seed)
    }

    pub fn with_source(
        op: OpKind,
        operands: impl IntoIterator<Item = Value>,
        shape: ShapeSource,
    ) -> Self {
        Self {
            op,
            kind: NodeKind::Generic,
            operands: operands.into_iter().collect(),
            shape,
            num_outputs: 1,
            hash_seed: DEFAULT_HASH_SEED,
        }
    }

    pub fn with_outputs(mut self, num_outputs: usize) -> Self {
        self.num_outputs = num_outputs;
        self
    }

    pub fn with_hash_seed(mut self, hash_seed: u64) -> Self {
        self.hash_seed = hash_seed;
        self
    }

    pub(crate) fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }
}

/// A vertex of the IR graph.
pub struct Node {
    op: OpKind,
    kind: NodeKind,
    num_outputs: usize,
    shape: ShapeCell,
    // Retaining operand handles, mirrored as plain outputs for traversal.
    operands: SmallVec<[Value; 4]>,
    operands_as_outputs: SmallVec<[Output; 4]>,
    hash_seed: u64,
    node_hash: u64,
    hash: u64,
    metadata: MetaData,
}

impl Node {
    pub(crate) fn build(graph: &Graph, spec: NodeSpec, metadata: MetaData) -> Node {
        let NodeSpec {
            op,
            kind,
            operands,
            shape,
            num_outputs,
            hash_seed,
        } = spec;

        assert!(num_outputs >= 1, "node {op} must declare at least one output");
        match kind.expected_op() {
            Some(expected) => assert_eq!(
                op, expected,
                "{} payload attached to node tagged {op}",
                kind.name()
            ),
            None => assert!(
                !known::is_reserved(op),
                "generic node cannot use reserved operation {op}"
            ),
        }

        let operands_as_outputs: SmallVec<[Output; 4]> = operands
            .iter()
            .map(|value| {
                let producer = graph.get(value.node()).unwrap_or_else(|| {
                    panic!("operand {value} of {op} refers to a node that is not in the graph")
                });
                assert!(
                    value.index() < producer.num_outputs(),
                    "operand {value} of {op} addresses output {} of a node with {} outputs",
                    value.index(),
                    producer.num_outputs()
                );
                value.output()
            })
            .collect();

        let operand_hashes: SmallVec<[u64; 4]> = operands_as_outputs
            .iter()
            .map(|output| output.content_hash(graph))
            .collect();

        let shape = match shape {
            ShapeSource::Known(shape) => ShapeCell::known(shape, num_outputs),
            ShapeSource::Deferred(shape_fn) => {
                let key = structural_key(hash_seed, op, num_outputs, &operand_hashes);
                ShapeCell::deferred(shape_fn, graph.shape_cache(), key, num_outputs)
            }
        };

        let node_hash = hash_combine(
            hash_combine(hash_seed, op.fingerprint()),
            hash_value(shape.get()),
        );
        let mut hash = node_hash;
        for operand_hash in &operand_hashes {
            hash = hash_combine(hash, *operand_hash);
        }
        hash = hash_combine(hash, operand_hashes.len() as u64);

        Node {
            op,
            kind,
            num_outputs,
            shape,
            operands,
            operands_as_outputs,
            hash_seed,
            node_hash,
            hash,
            metadata,
        }
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Full shape; a tuple for multi-output nodes.
    pub fn shape(&self) -> &ValueType {
        self.shape.get()
    }

    /// Shape of a single output.
    ///
    /// Panics when `output_index` is out of range; a single-output node only accepts `0`.
    pub fn shape_at(&self, output_index: usize) -> &ValueType {
        assert!(
            output_index < self.num_outputs,
            "output index {output_index} out of range for {} with {} output(s)",
            self.op,
            self.num_outputs
        );
        let shape = self.shape();
        if self.num_outputs == 1 {
            return shape;
        }
        shape
            .element(output_index)
            .expect("multi-output shape arity is checked on resolution")
    }

    pub fn has_deferred_shape(&self) -> bool {
        self.shape.is_deferred()
    }

    pub fn operands(&self) -> &[Output] {
        &self.operands_as_outputs
    }

    pub fn operand_values(&self) -> &[Value] {
        &self.operands
    }

    /// Panics when `i` is not a valid operand index.
    pub fn operand(&self, i: usize) -> Output {
        assert!(
            i < self.operands_as_outputs.len(),
            "operand index {i} out of range for {} with {} operand(s)",
            self.op,
            self.operands_as_outputs.len()
        );
        self.operands_as_outputs[i]
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    /// Hash of this node alone: seed, operation, and shape, however the shape was supplied.
    pub fn own_hash(&self) -> u64 {
        self.node_hash
    }

    /// Hash of the whole subgraph rooted at this node.
    pub fn cumulative_hash(&self) -> u64 {
        self.hash
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Safe downcast to the payload of a concrete node kind, gated on the operation.
    pub fn view<T: NodeView>(&self, expected: OpKind) -> Option<&T> {
        if self.op != expected {
            return None;
        }
        let view = T::from_kind(&self.kind);
        debug_assert!(
            view.is_some() || T::op() != self.op,
            "node tagged {} carries a {} payload",
            self.op,
            self.kind.name()
        );
        view
    }
}

/// Everything a deferred shape may depend on: seed, operation, output count, and operands.
fn structural_key(
    hash_seed: u64,
    op: OpKind,
    num_outputs: usize,
    operand_hashes: &[u64],
) -> u64 {
    let mut key = hash_combine(SHAPE_KEY_DOMAIN, hash_seed);
    key = hash_combine(key, op.fingerprint());
    key = hash_combine(key, num_outputs as u64);
    for operand_hash in operand_hashes {
        key = hash_combine(key, *operand_hash);
    }
    hash_combine(key, operand_hashes.len() as u64)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.shape(), self.op)?;
        if self.num_outputs > 1 {
            write!(f, ", num_outputs={}", self.num_outputs)?;
        }
        self.kind.fmt_details(f)?;
        if !self.metadata.scope.is_empty() {
            write!(f, ", scope={}", self.metadata.scope)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op)
            .field("kind", &self.kind)
            .field("num_outputs", &self.num_outputs)
            .field("shape", &self.shape)
            .field("operands", &self.operands_as_outputs)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("scope", &self.metadata.scope)
            .finish()
    }
}
