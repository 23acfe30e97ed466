//! Concrete node kinds and their typed views.
//!
//! Each payload type pairs with one well-known operation from [`crate::op_kind::known`]. Node
//! construction refuses payloads tagged with the wrong operation and generic nodes that claim a
//! reserved one, so "the operation matches" always implies "the payload is present" and
//! [`Node::view`](super::Node::view) never needs an unchecked cast.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::hashing::{hash_combine, hash_value, DEFAULT_HASH_SEED};
use crate::op_kind::{known, OpKind};
use crate::types::{DType, Dimension, Shape, TensorLiteral, TensorSpec, ValueType};
use crate::value::Value;

use super::{Node, NodeSpec};

/// Operation-specific state of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// No extra state; the operation name alone describes the node.
    Generic,
    Constant(ConstantNode),
    DeviceData(DeviceDataNode),
    Reshape(ReshapeNode),
    Permute(PermuteNode),
    Cast(CastNode),
    TopK(TopKNode),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Generic => "generic",
            NodeKind::Constant(_) => "constant",
            NodeKind::DeviceData(_) => "device_data",
            NodeKind::Reshape(_) => "reshape",
            NodeKind::Permute(_) => "permute",
            NodeKind::Cast(_) => "cast",
            NodeKind::TopK(_) => "topk",
        }
    }

    /// Operation a node carrying this payload must be tagged with.
    pub fn expected_op(&self) -> Option<OpKind> {
        match self {
            NodeKind::Generic => None,
            NodeKind::Constant(_) => Some(ConstantNode::op()),
            NodeKind::DeviceData(_) => Some(DeviceDataNode::op()),
            NodeKind::Reshape(_) => Some(ReshapeNode::op()),
            NodeKind::Permute(_) => Some(PermuteNode::op()),
            NodeKind::Cast(_) => Some(CastNode::op()),
            NodeKind::TopK(_) => Some(TopKNode::op()),
        }
    }

    /// Payload details as rendered in dumps, e.g. `dims=(2, 3)`; empty for generic nodes.
    pub fn details(&self) -> String {
        struct Details<'a>(&'a NodeKind);

        impl fmt::Display for Details<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt_details(f)
            }
        }

        Details(self)
            .to_string()
            .trim_start_matches(", ")
            .to_string()
    }

    pub(crate) fn fmt_details(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Generic => Ok(()),
            NodeKind::Constant(node) => write!(
                f,
                ", literal={} ({} bytes)",
                node.literal.spec,
                node.literal.byte_len()
            ),
            NodeKind::DeviceData(node) => write!(f, ", binding={}", node.binding),
            NodeKind::Reshape(node) => write!(f, ", dims=({})", join(&node.dims)),
            NodeKind::Permute(node) => write!(f, ", perm=({})", join(&node.perm)),
            NodeKind::Cast(node) => write!(f, ", dtype={}", node.dtype),
            NodeKind::TopK(node) => write!(
                f,
                ", k={}, axis={}, largest={}",
                node.k, node.axis, node.largest
            ),
        }
    }
}

fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn seed_with<T: std::hash::Hash>(payload: &T) -> u64 {
    hash_combine(DEFAULT_HASH_SEED, hash_value(payload))
}

fn input_tensor<'g>(graph: &'g Graph, input: &Value, what: &str) -> &'g TensorSpec {
    input
        .shape(graph)
        .as_tensor()
        .unwrap_or_else(|| panic!("{what} input {input} must be a tensor"))
}

/// Typed access to one concrete payload.
pub trait NodeView: Sized {
    /// Operation that tags nodes carrying this payload.
    fn op() -> OpKind;

    fn from_kind(kind: &NodeKind) -> Option<&Self>;
}

/// Free-function form of [`Node::view`].
pub fn node_cast<T: NodeView>(node: &Node, op: OpKind) -> Option<&T> {
    node.view::<T>(op)
}

/// Literal embedded in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantNode {
    pub literal: TensorLiteral,
}

impl ConstantNode {
    pub fn spec(literal: TensorLiteral) -> NodeSpec {
        let shape = ValueType::Tensor(literal.spec.clone());
        let seed = seed_with(&literal);
        NodeSpec::leaf(Self::op(), shape, 1, seed).with_kind(NodeKind::Constant(ConstantNode {
            literal,
        }))
    }
}

impl NodeView for ConstantNode {
    fn op() -> OpKind {
        known::constant()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::Constant(node) => Some(node),
            _ => None,
        }
    }
}

/// Graph input bound to externally owned data identified by `binding`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDataNode {
    pub binding: u64,
    pub spec: TensorSpec,
}

impl DeviceDataNode {
    pub fn spec(binding: u64, spec: TensorSpec) -> NodeSpec {
        let payload = DeviceDataNode { binding, spec };
        let seed = seed_with(&payload);
        NodeSpec::leaf(Self::op(), ValueType::Tensor(payload.spec.clone()), 1, seed)
            .with_kind(NodeKind::DeviceData(payload))
    }
}

impl NodeView for DeviceDataNode {
    fn op() -> OpKind {
        known::device_data()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::DeviceData(node) => Some(node),
            _ => None,
        }
    }
}

/// Reinterprets the input with new static dimensions. Shape is deferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReshapeNode {
    pub dims: Vec<usize>,
}

impl ReshapeNode {
    pub fn spec(graph: &Graph, input: Value, dims: Vec<usize>) -> NodeSpec {
        let source = input_tensor(graph, &input, "reshape");
        let target = Shape::from_static(&dims);
        if let (Some(from), Some(to)) = (source.shape.element_count(), target.element_count()) {
            assert_eq!(
                from, to,
                "cannot reshape {} elements into {target}",
                from
            );
        }
        let dtype = source.dtype;
        let seed = seed_with(&dims);
        NodeSpec::deferred(Self::op(), [input], move || {
            ValueType::Tensor(TensorSpec::new(dtype, target.clone()))
        })
        .with_hash_seed(seed)
        .with_kind(NodeKind::Reshape(ReshapeNode { dims }))
    }
}

impl NodeView for ReshapeNode {
    fn op() -> OpKind {
        known::reshape()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::Reshape(node) => Some(node),
            _ => None,
        }
    }
}

/// Axis permutation. Shape is deferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermuteNode {
    pub perm: Vec<usize>,
}

impl PermuteNode {
    pub fn spec(graph: &Graph, input: Value, perm: Vec<usize>) -> NodeSpec {
        let source = input_tensor(graph, &input, "permute").clone();
        let rank = source.shape.rank();
        let mut seen = vec![false; rank];
        assert_eq!(perm.len(), rank, "permutation {perm:?} does not match rank {rank}");
        for &axis in &perm {
            assert!(
                axis < rank && !seen[axis],
                "{perm:?} is not a permutation of 0..{rank}"
            );
            seen[axis] = true;
        }
        let seed = seed_with(&perm);
        let axes = perm.clone();
        NodeSpec::deferred(Self::op(), [input], move || {
            let dims: Vec<Dimension> = axes
                .iter()
                .map(|&axis| source.shape.dims()[axis].clone())
                .collect();
            ValueType::Tensor(TensorSpec::new(source.dtype, Shape::new(dims)))
        })
        .with_hash_seed(seed)
        .with_kind(NodeKind::Permute(PermuteNode { perm }))
    }
}

impl NodeView for PermuteNode {
    fn op() -> OpKind {
        known::permute()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::Permute(node) => Some(node),
            _ => None,
        }
    }
}

/// Element type conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CastNode {
    pub dtype: DType,
}

impl CastNode {
    pub fn spec(graph: &Graph, input: Value, dtype: DType) -> NodeSpec {
        let source = input_tensor(graph, &input, "cast");
        let shape = ValueType::Tensor(TensorSpec::new(dtype, source.shape.clone()));
        NodeSpec::new(Self::op(), [input], shape)
            .with_hash_seed(seed_with(&dtype))
            .with_kind(NodeKind::Cast(CastNode { dtype }))
    }
}

impl NodeView for CastNode {
    fn op() -> OpKind {
        known::cast()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::Cast(node) => Some(node),
            _ => None,
        }
    }
}

/// Top-`k` selection along `axis`; output 0 holds values, output 1 holds `s64` indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopKNode {
    pub k: usize,
    pub axis: usize,
    pub largest: bool,
}

impl TopKNode {
    pub fn spec(graph: &Graph, input: Value, k: usize, axis: usize, largest: bool) -> NodeSpec {
        let source = input_tensor(graph, &input, "topk");
        assert!(
            axis < source.shape.rank(),
            "topk axis {axis} out of range for {source}"
        );
        if let Dimension::Static(extent) = &source.shape.dims()[axis] {
            assert!(k <= *extent, "topk k={k} exceeds extent {extent} of {source}");
        }
        let mut dims = source.shape.dims().to_vec();
        dims[axis] = Dimension::Static(k);
        let values = TensorSpec::new(source.dtype, Shape::new(dims.clone()));
        let indices = TensorSpec::new(DType::S64, Shape::new(dims));
        let payload = TopKNode { k, axis, largest };
        NodeSpec::new(
            Self::op(),
            [input],
            ValueType::tuple(vec![values.into(), indices.into()]),
        )
        .with_outputs(2)
        .with_hash_seed(seed_with(&payload))
        .with_kind(NodeKind::TopK(payload))
    }
}

impl NodeView for TopKNode {
    fn op() -> OpKind {
        known::topk()
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::TopK(node) => Some(node),
            _ => None,
        }
    }
}
