//! Hash-consed DAG intermediate representation for lazily traced tensor programs.
//!
//! Operations recorded during tracing become [`Node`]s in a [`Graph`] arena. Each node knows its
//! [`OpKind`], its operands, a structural hash of the subgraph below it, and a shape that is
//! either supplied up front or computed by a shape function on insertion. Backends consume the
//! graph through [`LoweringContext`].

pub mod config;
pub mod cse;
pub mod dump;
mod env;
pub mod graph;
pub mod hashing;
pub mod lowering;
pub mod node;
pub mod op_kind;
pub mod scope;
pub mod shape;
pub mod types;
pub mod value;

pub use config::GraphConfig;
pub use cse::NodeCache;
pub use dump::{to_dot, to_text, DumpError, GraphSnapshot};
pub use graph::Graph;
pub use lowering::{lower_graph, EmitRequest, LowerOp, LoweringContext, LoweringError, OpVector};
pub use node::{
    node_cast, CastNode, ConstantNode, DeviceDataNode, MetaData, Node, NodeKind, NodeSpec,
    NodeView, PermuteNode, ReshapeNode, TopKNode,
};
pub use op_kind::OpKind;
pub use scope::{BuildContext, ProvenanceSource, ScopeGuard, ScopeStack, SourceLocation};
pub use shape::{ShapeCache, ShapeFn, ShapeSource};
pub use types::{DType, Dimension, Shape, TensorLiteral, TensorSpec, ValueType};
pub use value::{NodeId, Output, OutputMap, OutputSet, Use, Value};
