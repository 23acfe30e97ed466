use anyhow::Result;
use lazy_ir::{
    to_dot, to_text, BuildContext, DType, DeviceDataNode, DumpError, Graph, GraphSnapshot,
    NodeSpec, OpKind, Shape, TensorSpec, TopKNode, Value, ValueType,
};

fn traced_graph() -> (Graph, Value, Value) {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let spec = TensorSpec::new(DType::F32, Shape::from_static(&[2, 3]));
    let x = graph.add(&ctx, DeviceDataNode::spec(0, spec));
    let _forward = ctx.push_scope("forward");
    let y = graph.add(
        &ctx,
        NodeSpec::new(
            OpKind::get("tanh"),
            [x.clone()],
            ValueType::tensor(DType::F32, &[2, 3]),
        ),
    );
    let top_spec = TopKNode::spec(&graph, y.clone(), 1, 1, true);
    let top = graph.add(&ctx, top_spec);
    let picked = graph.add(
        &ctx,
        NodeSpec::new(
            OpKind::get("gather"),
            [y.clone(), top.at(1)],
            ValueType::tensor(DType::F32, &[2, 1]),
        ),
    );
    (graph, y, picked)
}

#[test]
fn text_dump_lists_nodes_in_post_order() {
    let (graph, y, picked) = traced_graph();
    let text = to_text(&graph, &[picked.output(), y.output()]);

    let expected = "IR {\n\
        \x20 %0 = f32[2,3] xla::device_data, binding=0\n\
        \x20 %1 = f32[2,3] ir::tanh(%0), scope=forward.1, ROOT=1\n\
        \x20 %2 = (f32[2,1], s64[2,1]) ir::topk(%1), k=1, axis=1, largest=true, scope=forward.1\n\
        \x20 %3 = f32[2,1] ir::gather(%1, %2.1), scope=forward.1, ROOT=0\n\
        }\n";
    assert_eq!(text, expected);
}

#[test]
fn dot_dump_labels_edges() {
    let (graph, _y, picked) = traced_graph();
    let dot = to_dot(&graph, &[picked.output()]);

    assert!(dot.starts_with("digraph G {\n"));
    assert!(dot.contains("node0 [label=\"xla::device_data\\nf32[2,3]\"]"));
    assert!(dot.contains("node0 -> node1 [label=\"i=0\"]"));
    assert!(dot.contains("node2 -> node3 [label=\"i=1, o=1\"]"));
    assert!(dot.ends_with("}\n"));
}

#[test]
fn dot_dump_escapes_quotes_and_backslashes() {
    let ctx = BuildContext::new();
    let mut graph = Graph::new();
    let spec = TensorSpec::new(DType::F32, Shape::from_static(&[2]));
    let x = graph.add(&ctx, DeviceDataNode::spec(0, spec));
    let y = {
        let _odd = ctx.push_scope("we\"ird\\name");
        graph.add(
            &ctx,
            NodeSpec::new(OpKind::get("neg"), [x], ValueType::tensor(DType::F32, &[2])),
        )
    };
    let dot = to_dot(&graph, &[y.output()]);

    assert!(dot.contains(r#"node1 [label="ir::neg\nf32[2]\nscope=we\"ird\\name.1"]"#));
}

#[test]
fn snapshot_round_trips_through_json_and_bincode() -> Result<()> {
    let (graph, y, picked) = traced_graph();
    let snapshot = GraphSnapshot::capture(&graph, &[picked.output(), y.output()]);

    assert_eq!(snapshot.nodes.len(), 4);
    assert_eq!(snapshot.nodes[2].num_outputs, 2);
    assert_eq!(snapshot.nodes[2].details, "k=1, axis=1, largest=true");
    assert_eq!(
        snapshot.nodes[3].hash,
        graph.node(picked.node()).cumulative_hash()
    );

    let json = snapshot.to_json_string()?;
    assert_eq!(GraphSnapshot::from_json_str(&json)?, snapshot);

    let bytes = snapshot.to_bincode_bytes()?;
    assert_eq!(GraphSnapshot::from_bincode_slice(&bytes)?, snapshot);
    Ok(())
}

#[test]
fn malformed_json_is_reported() {
    let err = GraphSnapshot::from_json_str("{\"nodes\": 3}").expect_err("not a snapshot");
    assert!(matches!(err, DumpError::Json(_)));
}

#[test]
fn identical_graphs_dump_identically() {
    let (first, first_y, first_root) = traced_graph();
    let (second, second_y, second_root) = traced_graph();

    assert_eq!(
        to_text(&first, &[first_root.output(), first_y.output()]),
        to_text(&second, &[second_root.output(), second_y.output()])
    );
}
