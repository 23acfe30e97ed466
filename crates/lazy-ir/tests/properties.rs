//! Property-based tests for graph identity and traversal.
//!
//! Key invariants:
//! - Replaying the same trace into a fresh graph reproduces every cumulative hash
//! - Scope names never change a hash
//! - Post-order lists each reachable node once, after all of its operands
//! - Swapping two distinct operands changes the cumulative hash
//! - Changing a leaf changes the hash of everything downstream of it

use std::collections::HashMap;

use lazy_ir::{
    BuildContext, DType, DeviceDataNode, Graph, NodeId, NodeSpec, OpKind, Shape, TensorSpec,
    Value, ValueType,
};
use proptest::prelude::*;

const OPS: [&str; 4] = ["add", "mul", "sub", "max"];

/// One traced step: `OPS[op]` applied to two earlier values (indices taken modulo the count).
type Step = (usize, usize, usize);

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((0..OPS.len(), any::<usize>(), any::<usize>()), 1..40)
}

fn replay(ctx: &BuildContext, inputs: u64, steps: &[Step]) -> (Graph, Vec<Value>) {
    let mut graph = Graph::new();
    let spec = TensorSpec::new(DType::F32, Shape::from_static(&[4]));
    let mut values: Vec<Value> = (0..inputs)
        .map(|binding| graph.add(ctx, DeviceDataNode::spec(binding, spec.clone())))
        .collect();
    for (index, &(op, lhs, rhs)) in steps.iter().enumerate() {
        let _scope = ctx.push_scope(if index % 2 == 0 { "even" } else { "odd" });
        let lhs = values[lhs % values.len()].clone();
        let rhs = values[rhs % values.len()].clone();
        let value = graph.add(
            ctx,
            NodeSpec::new(
                OpKind::get(OPS[op]),
                [lhs, rhs],
                ValueType::tensor(DType::F32, &[4]),
            ),
        );
        values.push(value);
    }
    (graph, values)
}

fn hashes(graph: &Graph, values: &[Value]) -> Vec<u64> {
    values
        .iter()
        .map(|value| graph.node(value.node()).cumulative_hash())
        .collect()
}

proptest! {
    #[test]
    fn replayed_traces_hash_identically(inputs in 1u64..5, steps in steps()) {
        let ctx = BuildContext::new();
        let (first, first_values) = replay(&ctx, inputs, &steps);
        let (second, second_values) = replay(&ctx, inputs, &steps);
        prop_assert_eq!(hashes(&first, &first_values), hashes(&second, &second_values));
    }

    #[test]
    fn scopes_never_affect_hashes(inputs in 1u64..5, steps in steps()) {
        let ctx = BuildContext::new();
        let (scoped, scoped_values) = {
            let _outer = ctx.push_scope("outer");
            replay(&ctx, inputs, &steps)
        };
        let (plain, plain_values) = replay(&ctx, inputs, &steps);
        prop_assert_eq!(hashes(&scoped, &scoped_values), hashes(&plain, &plain_values));
    }

    #[test]
    fn post_order_respects_dependencies(inputs in 1u64..5, steps in steps()) {
        let ctx = BuildContext::new();
        let (graph, values) = replay(&ctx, inputs, &steps);
        let root = values.last().map(Value::output).expect("at least one step");
        let order = graph.post_order(&[root]);

        let position: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(index, id)| (*id, index)).collect();
        prop_assert_eq!(position.len(), order.len());
        prop_assert_eq!(order.last().copied(), Some(root.node));
        for id in &order {
            for operand in graph.node(*id).operands() {
                prop_assert!(position[&operand.node] < position[id]);
            }
        }
    }

    #[test]
    fn swapping_distinct_operands_changes_hash(op in 0..OPS.len(), lhs in 0u64..8, rhs in 0u64..8) {
        prop_assume!(lhs != rhs);
        let ctx = BuildContext::new();
        let mut graph = Graph::new();
        let spec = TensorSpec::new(DType::F32, Shape::from_static(&[4]));
        let a = graph.add(&ctx, DeviceDataNode::spec(lhs, spec.clone()));
        let b = graph.add(&ctx, DeviceDataNode::spec(rhs, spec));
        let shape = ValueType::tensor(DType::F32, &[4]);
        let ab = graph.add(&ctx, NodeSpec::new(OpKind::get(OPS[op]), [a.clone(), b.clone()], shape.clone()));
        let ba = graph.add(&ctx, NodeSpec::new(OpKind::get(OPS[op]), [b, a], shape));
        prop_assert_ne!(
            graph.node(ab.node()).cumulative_hash(),
            graph.node(ba.node()).cumulative_hash()
        );
    }

    #[test]
    fn leaf_changes_propagate_to_the_tip(
        ops in prop::collection::vec(0..OPS.len(), 1..50),
        binding in 0u64..1000,
    ) {
        let ctx = BuildContext::new();
        let tip_hash = |binding: u64| {
            let mut graph = Graph::new();
            let spec = TensorSpec::new(DType::F32, Shape::from_static(&[4]));
            let mut tip = graph.add(&ctx, DeviceDataNode::spec(binding, spec));
            for &op in &ops {
                let shape = ValueType::tensor(DType::F32, &[4]);
                tip = graph.add(&ctx, NodeSpec::new(OpKind::get(OPS[op]), [tip.clone(), tip], shape));
            }
            graph.node(tip.node()).cumulative_hash()
        };
        prop_assert_ne!(tip_hash(binding), tip_hash(binding + 1));
    }
}
