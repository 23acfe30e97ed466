//! Seam between the IR and a backend instruction emitter.
//!
//! The IR never builds backend instructions itself. [`Node::lower`] resolves each operand to a
//! backend handle through the [`LoweringContext`], dispatches on the node's concrete kind, and
//! hands the emitter a borrowed [`LowerOp`] describing what to build. Whatever comes back must
//! contain exactly one handle per declared output.

use smallvec::SmallVec;
use thiserror::Error;

use crate::graph::Graph;
use crate::node::{
    CastNode, ConstantNode, DeviceDataNode, Node, NodeKind, PermuteNode, ReshapeNode, TopKNode,
};
use crate::op_kind::OpKind;
use crate::value::Output;

/// Per-output backend handles produced by lowering one node.
pub type OpVector<H> = SmallVec<[H; 1]>;

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("lowering not implemented for {op}")]
    Unimplemented { op: OpKind },
    #[error("operand {operand} of {op} has not been lowered")]
    MissingOperand { op: OpKind, operand: Output },
    #[error("backend failed to lower {op}: {message}")]
    Backend { op: OpKind, message: String },
}

impl LoweringError {
    pub fn backend(op: OpKind, message: impl Into<String>) -> Self {
        LoweringError::Backend {
            op,
            message: message.into(),
        }
    }
}

/// Kind-specific description of the instruction to emit.
#[derive(Debug, Clone, Copy)]
pub enum LowerOp<'a> {
    /// Identified by the node's operation alone.
    Generic,
    Constant(&'a ConstantNode),
    DeviceData(&'a DeviceDataNode),
    Reshape(&'a ReshapeNode),
    Permute(&'a PermuteNode),
    Cast(&'a CastNode),
    TopK(&'a TopKNode),
}

impl<'a> LowerOp<'a> {
    fn of(kind: &'a NodeKind) -> Self {
        match kind {
            NodeKind::Generic => LowerOp::Generic,
            NodeKind::Constant(node) => LowerOp::Constant(node),
            NodeKind::DeviceData(node) => LowerOp::DeviceData(node),
            NodeKind::Reshape(node) => LowerOp::Reshape(node),
            NodeKind::Permute(node) => LowerOp::Permute(node),
            NodeKind::Cast(node) => LowerOp::Cast(node),
            NodeKind::TopK(node) => LowerOp::TopK(node),
        }
    }
}

/// Everything an emitter needs for one node.
pub struct EmitRequest<'a, H> {
    pub node: &'a Node,
    pub op: LowerOp<'a>,
    /// Resolved handles, one per operand, in operand order.
    pub operands: &'a [H],
}

/// Backend-side lowering collaborator.
pub trait LoweringContext {
    type Handle: Clone;

    /// Handle previously bound to `output`, if any.
    fn resolve(&self, output: Output) -> Option<Self::Handle>;

    fn bind(&mut self, output: Output, handle: Self::Handle);

    /// Emits backend instructions for one node; returns one handle per output.
    fn emit(
        &mut self,
        request: EmitRequest<'_, Self::Handle>,
    ) -> Result<OpVector<Self::Handle>, LoweringError>;
}

impl Node {
    /// Lowers this node, assuming every operand is already bound in `ctx`.
    ///
    /// Panics when the emitter returns a handle count different from [`Node::num_outputs`].
    pub fn lower<C: LoweringContext>(
        &self,
        ctx: &mut C,
    ) -> Result<OpVector<C::Handle>, LoweringError> {
        let operands = self
            .operands()
            .iter()
            .map(|operand| {
                ctx.resolve(*operand)
                    .ok_or(LoweringError::MissingOperand {
                        op: self.op(),
                        operand: *operand,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let handles = ctx.emit(EmitRequest {
            node: self,
            op: LowerOp::of(self.kind()),
            operands: &operands,
        })?;
        Ok(self.return_ops(handles))
    }

    /// Packages the handle of a single-output node.
    pub fn return_op<H>(&self, handle: H) -> OpVector<H> {
        self.return_ops(std::iter::once(handle))
    }

    /// Packages per-output handles, asserting one per declared output.
    pub fn return_ops<H>(&self, handles: impl IntoIterator<Item = H>) -> OpVector<H> {
        let handles: OpVector<H> = handles.into_iter().collect();
        assert_eq!(
            handles.len(),
            self.num_outputs(),
            "lowering {} produced {} handle(s) for {} output(s)",
            self.op(),
            handles.len(),
            self.num_outputs()
        );
        handles
    }
}

/// Lowers the subgraph reachable from `roots` in post-order and returns the roots' handles.
///
/// Nodes whose first output is already bound in `ctx` are treated as lowered.
pub fn lower_graph<C: LoweringContext>(
    graph: &Graph,
    roots: &[Output],
    ctx: &mut C,
) -> Result<Vec<C::Handle>, LoweringError> {
    for id in graph.post_order(roots) {
        if ctx.resolve(Output::new(id, 0)).is_some() {
            continue;
        }
        let node = graph.node(id);
        let handles = node.lower(ctx)?;
        for (index, handle) in handles.into_iter().enumerate() {
            ctx.bind(Output::new(id, index), handle);
        }
    }
    roots
        .iter()
        .map(|root| {
            ctx.resolve(*root).ok_or(LoweringError::MissingOperand {
                op: graph.node(root.node).op(),
                operand: *root,
            })
        })
        .collect()
}
