use lazy_ir::op_kind::known;
use lazy_ir::{
    node_cast, BuildContext, ConstantNode, DType, DeviceDataNode, Graph, GraphConfig, NodeCache,
    NodeSpec, OpKind, PermuteNode, ReshapeNode, Shape, TensorLiteral, TensorSpec, TopKNode, Use,
    Value, ValueType,
};

fn input(graph: &mut Graph, ctx: &BuildContext, binding: u64, dims: &[usize]) -> Value {
    let spec = TensorSpec::new(DType::F32, Shape::from_static(dims));
    graph.add(ctx, DeviceDataNode::spec(binding, spec))
}

fn apply(graph: &mut Graph, ctx: &BuildContext, op: &str, operands: &[Value]) -> Value {
    let shape = operands[0].shape(graph).clone();
    graph.add(
        ctx,
        NodeSpec::new(OpKind::get(op), operands.iter().cloned(), shape),
    )
}

#[test]
fn post_order_visits_operands_first_and_once() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let b = apply(&mut graph, &ctx, "neg", &[a.clone()]);
    let c = apply(&mut graph, &ctx, "exp", &[a.clone()]);
    let d = apply(&mut graph, &ctx, "add", &[b.clone(), c.clone()]);

    let order = graph.post_order(&[d.output(), b.output()]);
    assert_eq!(order, vec![a.node(), b.node(), c.node(), d.node()]);
}

#[test]
fn users_index_consumers_by_output() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let b = apply(&mut graph, &ctx, "neg", &[a.clone()]);
    let d = apply(&mut graph, &ctx, "sub", &[b.clone(), a.clone()]);

    let users = graph.users();
    let a_users: Vec<Use> = users[&a.output()].to_vec();
    assert_eq!(a_users.len(), 2);
    assert!(a_users.contains(&Use {
        node: b.node(),
        operand_index: 0
    }));
    assert!(a_users.contains(&Use {
        node: d.node(),
        operand_index: 1
    }));
    assert!(!users.contains_key(&d.output()));
}

#[test]
fn collect_frees_unreachable_nodes_and_invalidates_ids() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let kept = apply(&mut graph, &ctx, "neg", &[a.clone()]);
    let dropped = apply(&mut graph, &ctx, "exp", &[a.clone()]);
    assert_eq!(graph.len(), 3);

    let freed = graph.collect(&[kept.clone()]);
    assert_eq!(freed, 1);
    assert_eq!(graph.len(), 2);
    assert!(graph.contains(a.node()));
    assert!(graph.contains(kept.node()));
    assert!(!graph.contains(dropped.node()));
    assert!(graph.get(dropped.node()).is_none());

    let reused = apply(&mut graph, &ctx, "abs", &[a]);
    assert_eq!(reused.node().index(), dropped.node().index());
    assert_eq!(
        reused.node().generation(),
        dropped.node().generation() + 1
    );
    assert!(!graph.contains(dropped.node()));
}

#[test]
#[should_panic(expected = "not in the graph")]
fn stale_operands_are_rejected() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let stale = apply(&mut graph, &ctx, "exp", &[a.clone()]);
    graph.collect(&[a]);
    let shape = ValueType::tensor(DType::F32, &[3]);
    graph.add(&ctx, NodeSpec::new(OpKind::get("neg"), [stale], shape));
}

#[test]
#[should_panic(expected = "not in the graph")]
fn values_from_another_graph_are_rejected() {
    let ctx = BuildContext::new();
    let mut first = Graph::new();
    let mut second = Graph::new();
    let foreign = input(&mut first, &ctx, 7, &[4]);
    let local = input(&mut second, &ctx, 9, &[4]);
    assert_eq!(foreign.node().index(), local.node().index());
    assert_eq!(foreign.node().generation(), local.node().generation());
    assert!(second.get(foreign.node()).is_none());

    let shape = ValueType::tensor(DType::F32, &[4]);
    second.add(&ctx, NodeSpec::new(OpKind::get("neg"), [foreign], shape));
}

#[test]
fn default_graph_follows_the_environment() {
    let graph = Graph::default();
    assert_eq!(graph.config(), &GraphConfig::from_env());
}

#[test]
#[should_panic(expected = "addresses output 1")]
fn operand_output_index_is_checked() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let shape = ValueType::tensor(DType::F32, &[3]);
    graph.add(&ctx, NodeSpec::new(OpKind::get("neg"), [a.at(1)], shape));
}

#[test]
fn long_chains_collect_and_drop_without_recursion() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let mut tip = input(&mut graph, &ctx, 0, &[1]);
    let shape = ValueType::tensor(DType::F32, &[1]);
    let neg = OpKind::get("neg");
    for _ in 0..100_000 {
        tip = graph.add(&ctx, NodeSpec::new(neg, [tip], shape.clone()));
    }
    assert_eq!(graph.len(), 100_001);
    assert_eq!(graph.post_order(&[tip.output()]).len(), 100_001);

    assert_eq!(graph.collect(&[tip]), 0);
    assert_eq!(graph.collect(&[]), 100_001);
    assert!(graph.is_empty());
    drop(graph);
}

#[test]
fn clone_node_rebinds_operands() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let b = input(&mut graph, &ctx, 1, &[3]);
    let ab = apply(&mut graph, &ctx, "sub", &[a.clone(), b.clone()]);
    let fresh_ba = apply(&mut graph, &ctx, "sub", &[b.clone(), a.clone()]);

    let cloned = graph.clone_node(&ctx, ab.node(), [b.clone(), a.clone()]);
    let source = graph.node(ab.node());
    let clone = graph.node(cloned.node());

    assert_eq!(clone.op(), source.op());
    assert_eq!(clone.shape(), source.shape());
    assert_eq!(clone.hash_seed(), source.hash_seed());
    assert_eq!(clone.own_hash(), source.own_hash());
    assert_eq!(clone.operands(), &[b.output(), a.output()]);
    assert_eq!(
        clone.cumulative_hash(),
        graph.node(fresh_ba.node()).cumulative_hash()
    );
}

#[test]
fn clone_of_deferred_node_keeps_payload_and_stays_deferred() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[2, 3]);
    let b = input(&mut graph, &ctx, 1, &[2, 3]);
    let spec = PermuteNode::spec(&graph, a, vec![1, 0]);
    let permuted = graph.add(&ctx, spec);

    let cloned = graph.clone_node(&ctx, permuted.node(), [b]);
    let clone = graph.node(cloned.node());
    assert!(clone.has_deferred_shape());
    assert_eq!(clone.shape(), &ValueType::tensor(DType::F32, &[3, 2]));
    let payload = clone
        .view::<PermuteNode>(known::permute())
        .expect("permute payload survives cloning");
    assert_eq!(payload.perm, vec![1, 0]);
}

#[test]
#[should_panic(expected = "expects 1 operand(s)")]
fn clone_node_checks_arity() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let neg = apply(&mut graph, &ctx, "neg", &[a.clone()]);
    graph.clone_node(&ctx, neg.node(), [a.clone(), a]);
}

#[test]
fn typed_views_follow_the_operation() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let c = graph.add(
        &ctx,
        ConstantNode::spec(TensorLiteral::from_f32(&[2], &[1.0, 2.0])),
    );
    let spec = ReshapeNode::spec(&graph, c.clone(), vec![1, 2]);
    let reshaped = graph.add(&ctx, spec);
    let constant = graph.node(c.node());

    let literal = constant
        .view::<ConstantNode>(known::constant())
        .expect("constant view");
    assert_eq!(literal.literal.byte_len(), 8);
    assert!(constant.view::<ConstantNode>(known::reshape()).is_none());
    assert!(constant.view::<ReshapeNode>(known::reshape()).is_none());
    assert!(node_cast::<ReshapeNode>(graph.node(reshaped.node()), known::reshape()).is_some());
    assert!(node_cast::<TopKNode>(graph.node(reshaped.node()), known::topk()).is_none());
}

#[test]
#[should_panic(expected = "reserved operation")]
fn generic_nodes_cannot_claim_reserved_operations() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let shape = a.shape(&graph).clone();
    graph.add(&ctx, NodeSpec::new(known::reshape(), [a], shape));
}

#[test]
fn node_cache_reuses_structurally_equal_nodes() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let mut cache = NodeCache::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let b = input(&mut graph, &ctx, 1, &[3]);
    let shape = a.shape(&graph).clone();
    let add = OpKind::get("add");

    let first = graph.add_or_reuse(
        &ctx,
        &mut cache,
        NodeSpec::new(add, [a.clone(), b.clone()], shape.clone()),
    );
    let second = graph.add_or_reuse(
        &ctx,
        &mut cache,
        NodeSpec::new(add, [a.clone(), b.clone()], shape.clone()),
    );
    let swapped = graph.add_or_reuse(
        &ctx,
        &mut cache,
        NodeSpec::new(add, [b.clone(), a.clone()], shape.clone()),
    );

    assert_eq!(first, second);
    assert_ne!(first, swapped);
    assert_eq!(graph.len(), 4);
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 2);
    assert_eq!(cache.len(), 2);

    graph.collect(&[a.clone(), b.clone()]);
    let rebuilt = graph.add_or_reuse(&ctx, &mut cache, NodeSpec::new(add, [a, b], shape));
    assert!(graph.contains(rebuilt.node()));
    assert_eq!(graph.len(), 3);
}

#[test]
fn node_cache_compares_operands_by_identity() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let mut cache = NodeCache::new();
    let a = input(&mut graph, &ctx, 0, &[3]);
    let twin = input(&mut graph, &ctx, 0, &[3]);
    assert_eq!(a.content_hash(&graph), twin.content_hash(&graph));

    let shape = a.shape(&graph).clone();
    let exp = OpKind::get("exp");
    let over_a = graph.add_or_reuse(&ctx, &mut cache, NodeSpec::new(exp, [a], shape.clone()));
    let over_twin = graph.add_or_reuse(&ctx, &mut cache, NodeSpec::new(exp, [twin], shape));

    assert_eq!(
        graph.node(over_a.node()).cumulative_hash(),
        graph.node(over_twin.node()).cumulative_hash()
    );
    assert_ne!(over_a, over_twin);
    assert_eq!(cache.hits(), 0);
}

#[test]
fn node_display_shows_shape_op_and_payload() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let a = input(&mut graph, &ctx, 0, &[5]);
    let top = {
        let _scope = ctx.push_scope("select");
        let spec = TopKNode::spec(&graph, a, 2, 0, true);
        graph.add(&ctx, spec)
    };

    assert_eq!(
        graph.node(top.node()).to_string(),
        "(f32[2], s64[2]) ir::topk, num_outputs=2, k=2, axis=0, largest=true, scope=select.1"
    );
}
