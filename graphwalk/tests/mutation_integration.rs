// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Integration tests for the mutating steps and subgraph extraction.

use std::sync::Arc;

use graphwalk::dsl::anonymous as __;
use graphwalk::{Cardinality, Graph, GraphTraversalSource, MemoryGraph, Value};

fn empty_graph() -> Arc<MemoryGraph> {
    Arc::new(MemoryGraph::new())
}

#[test]
fn add_v_creates_one_vertex_per_terminal_run() {
    let graph = empty_graph();
    let g = GraphTraversalSource::new(graph.clone());
    g.add_v("person").iterate().unwrap();
    assert_eq!(graph.vertex_count(), 1);
    assert_eq!(graph.vertices(&[])[0].label, "person");
}

#[test]
fn add_v_with_properties_chains() {
    let graph = empty_graph();
    let g = GraphTraversalSource::new(graph.clone());
    g.add_v("person")
        .property("name", "alice")
        .property("age", 30i64)
        .iterate()
        .unwrap();
    let vertex = &graph.vertices(&[])[0];
    let props = graph.vertex_properties(vertex.id, &[]);
    assert!(props.contains(&("name".to_string(), Value::from("alice"))));
    assert!(props.contains(&("age".to_string(), Value::Int(30))));
}

#[test]
fn add_e_connects_bound_vertices() {
    let graph = empty_graph();
    let a = graph.add_vertex("person").unwrap();
    let b = graph.add_vertex("person").unwrap();
    let g = GraphTraversalSource::new(graph.clone());
    g.v([a.id])
        .as_("a")
        .v([b.id])
        .add_e("knows")
        .from_("a")
        .iterate()
        .unwrap();
    assert_eq!(graph.edge_count(), 1);
    let edge = &graph.edges(&[])[0];
    assert_eq!((edge.out_v, edge.in_v, edge.label.as_str()), (a.id, b.id, "knows"));
}

#[test]
fn add_e_to_literal_vertex_id() {
    let graph = empty_graph();
    let a = graph.add_vertex("person").unwrap();
    let b = graph.add_vertex("person").unwrap();
    let g = GraphTraversalSource::new(graph.clone());
    g.v([a.id]).add_e("knows").to_value(b.id).iterate().unwrap();
    let edge = &graph.edges(&[])[0];
    assert_eq!((edge.out_v, edge.in_v), (a.id, b.id));
}

#[test]
fn property_with_list_cardinality_appends() {
    let graph = empty_graph();
    let v = graph.add_vertex("person").unwrap();
    let g = GraphTraversalSource::new(graph.clone());
    g.v([v.id])
        .property_with(Cardinality::List, "skill", "rust")
        .property_with(Cardinality::List, "skill", "graphs")
        .iterate()
        .unwrap();
    let values: Vec<Value> = graph
        .vertex_properties(v.id, &["skill".to_string()])
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(values.len(), 2);
}

#[test]
fn drop_removes_the_element() {
    let graph = empty_graph();
    let a = graph.add_vertex("person").unwrap();
    graph.add_vertex("person").unwrap();
    let g = GraphTraversalSource::new(graph.clone());
    g.v([a.id]).drop().iterate().unwrap();
    assert_eq!(graph.vertex_count(), 1);
}

#[test]
fn subgraph_copies_matching_edges_and_endpoints() {
    let graph = empty_graph();
    let a = graph.add_vertex("person").unwrap();
    let b = graph.add_vertex("person").unwrap();
    let c = graph.add_vertex("software").unwrap();
    graph
        .set_vertex_property(a.id, "name", Value::from("marko"), Cardinality::Single)
        .unwrap();
    graph.add_edge("knows", a.id, b.id).unwrap();
    graph.add_edge("created", a.id, c.id).unwrap();
    let g = GraphTraversalSource::new(graph.clone());
    let mut traversal = g.e([]).has_label("knows").subgraph("sg");
    traversal.iterate().unwrap();
    match traversal.side_effect_value("sg") {
        Some(Value::Subgraph(sub)) => {
            assert_eq!(sub.edge_count(), 1);
            assert_eq!(sub.vertex_count(), 2);
            // Vertex ids and properties survive the copy.
            assert_eq!(
                sub.vertex_properties(a.id, &["name".to_string()]),
                vec![("name".to_string(), Value::from("marko"))]
            );
        }
        other => panic!("expected subgraph, found {:?}", other),
    }
}

#[test]
fn inject_fold_unfold_preserves_order() {
    let g = GraphTraversalSource::empty();
    let round_trip = g.inject([3i64, 1, 2]).fold().unfold().to_list().unwrap();
    assert_eq!(round_trip, vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
}

#[test]
fn local_scopes_a_child_to_each_traverser() {
    let g = GraphTraversalSource::empty();
    let per_list = g
        .inject([
            Value::List(vec![Value::Int(5), Value::Int(1)]),
            Value::List(vec![Value::Int(4), Value::Int(2)]),
        ])
        .local(__::unfold().min())
        .to_list()
        .unwrap();
    assert_eq!(per_list, vec![Value::Int(1), Value::Int(2)]);
}
