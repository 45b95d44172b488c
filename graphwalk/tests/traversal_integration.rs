// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Integration tests for the traversal DSL over an in-memory graph
//!
//! The fixture is the six-vertex social graph used throughout the docs:
//! four people connected by `knows` edges and two software vertices
//! connected by `created` edges.

use std::sync::Arc;

use graphwalk::dsl::anonymous as __;
use graphwalk::{
    Cardinality, Graph, GraphTraversalSource, MemoryGraph, Operator, Order, Scope, Token,
    TraversalError, Value, P,
};

fn modern_graph() -> Arc<MemoryGraph> {
    let graph = Arc::new(MemoryGraph::new());
    let people = [(1, "marko", 29), (2, "vadas", 27), (4, "josh", 32), (6, "peter", 35)];
    for (id, name, age) in people {
        graph.add_vertex_with_id(id, "person").unwrap();
        graph
            .set_vertex_property(id, "name", Value::from(name), Cardinality::Single)
            .unwrap();
        graph
            .set_vertex_property(id, "age", Value::Int(age), Cardinality::Single)
            .unwrap();
    }
    for (id, name) in [(3, "lop"), (5, "ripple")] {
        graph.add_vertex_with_id(id, "software").unwrap();
        graph
            .set_vertex_property(id, "name", Value::from(name), Cardinality::Single)
            .unwrap();
        graph
            .set_vertex_property(id, "lang", Value::from("java"), Cardinality::Single)
            .unwrap();
    }
    for (label, out_v, in_v, weight) in [
        ("knows", 1, 2, 0.5),
        ("knows", 1, 4, 1.0),
        ("created", 1, 3, 0.4),
        ("created", 4, 5, 1.0),
        ("created", 4, 3, 0.4),
        ("created", 6, 3, 0.2),
    ] {
        let edge = graph.add_edge(label, out_v, in_v).unwrap();
        graph
            .set_edge_property(edge.id, "weight", Value::Float(weight))
            .unwrap();
    }
    graph
}

fn names(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => panic!("expected string, found {:?}", other),
        })
        .collect()
}

#[test]
fn adjacency_and_property_projection() {
    let g = GraphTraversalSource::new(modern_graph());
    let out = g.v([1]).out(&["knows"]).values(&["name"]).to_list().unwrap();
    assert_eq!(names(out), vec!["vadas", "josh"]);
}

#[test]
fn has_filters_compose() {
    let g = GraphTraversalSource::new(modern_graph());
    let over_thirty = g
        .v([])
        .has_label("person")
        .has("age", P::Gt(Value::Int(30)))
        .values(&["name"])
        .to_list()
        .unwrap();
    assert_eq!(names(over_thirty), vec!["josh", "peter"]);
}

#[test]
fn order_descending_by_age() {
    let g = GraphTraversalSource::new(modern_graph());
    let ordered = g
        .v([])
        .has_label("person")
        .order()
        .by_key_order("age", Order::Desc)
        .values(&["name"])
        .to_list()
        .unwrap();
    assert_eq!(names(ordered), vec!["peter", "josh", "marko", "vadas"]);
}

#[test]
fn order_with_two_comparators_breaks_ties() {
    let g = GraphTraversalSource::new(modern_graph());
    let ordered = g
        .v([])
        .order()
        .by_token(Token::Label)
        .by_key_order("name", Order::Desc)
        .values(&["name"])
        .to_list()
        .unwrap();
    assert_eq!(names(ordered), vec!["vadas", "peter", "marko", "josh", "ripple", "lop"]);
}

#[test]
fn group_count_by_label() {
    let g = GraphTraversalSource::new(modern_graph());
    let counts = g.v([]).group_count().by_token(Token::Label).to_list().unwrap();
    let Value::Map(map) = &counts[0] else {
        panic!("expected map, found {:?}", counts);
    };
    assert_eq!(map.get(&Value::from("person")), Some(&Value::Int(4)));
    assert_eq!(map.get(&Value::from("software")), Some(&Value::Int(2)));
}

#[test]
fn group_keys_to_value_lists() {
    let g = GraphTraversalSource::new(modern_graph());
    let groups = g
        .v([])
        .group()
        .by_token(Token::Label)
        .by_traversal(__::values(&["name"]).fold())
        .to_list()
        .unwrap();
    let Value::Map(map) = &groups[0] else {
        panic!("expected map, found {:?}", groups);
    };
    assert_eq!(
        map.get(&Value::from("software")),
        Some(&Value::List(vec![Value::from("lop"), Value::from("ripple")]))
    );
}

#[test]
fn select_two_bindings() {
    let g = GraphTraversalSource::new(modern_graph());
    let pairs = g
        .v([1])
        .as_("a")
        .out(&["knows"])
        .as_("b")
        .select_many(&["a", "b"])
        .to_list()
        .unwrap();
    assert_eq!(pairs.len(), 2);
    for pair in pairs {
        let Value::Map(map) = pair else { panic!("expected map") };
        assert!(matches!(map.get(&Value::from("a")), Some(Value::Vertex(v)) if v.id == 1));
        assert!(map.contains_key(&Value::from("b")));
    }
}

#[test]
fn path_records_every_hop() {
    let g = GraphTraversalSource::new(modern_graph());
    let paths = g.v([1]).out(&["created"]).path().to_list().unwrap();
    assert_eq!(paths.len(), 1);
    let Value::List(objects) = &paths[0] else { panic!("expected list path") };
    assert_eq!(objects.len(), 2);
    assert!(matches!(&objects[0], Value::Vertex(v) if v.id == 1));
    assert!(matches!(&objects[1], Value::Vertex(v) if v.id == 3));
}

#[test]
fn repeat_times_two_reaches_software() {
    let g = GraphTraversalSource::new(modern_graph());
    let mut reached = names(
        g.v([1])
            .repeat(__::out(&["knows", "created"]))
            .times(2)
            .values(&["name"])
            .to_list()
            .unwrap(),
    );
    reached.sort();
    assert_eq!(reached, vec!["lop", "ripple"]);
}

#[test]
fn repeat_emit_includes_intermediate_hops() {
    let g = GraphTraversalSource::new(modern_graph());
    let emitted = g
        .v([1])
        .repeat(__::out(&["knows"]))
        .emit()
        .times(2)
        .count()
        .to_list()
        .unwrap();
    // marko emits vadas and josh after one hop; neither knows anyone.
    assert_eq!(emitted, vec![Value::Int(2)]);
}

#[test]
fn until_before_repeat_is_a_while_loop() {
    let g = GraphTraversalSource::new(modern_graph());
    let unchanged = g
        .v([1])
        .until(__::identity())
        .repeat(__::out(&["knows"]))
        .id()
        .to_list()
        .unwrap();
    assert_eq!(unchanged, vec![Value::Int(1)]);
}

#[test]
fn union_concatenates_children_per_input() {
    let g = GraphTraversalSource::new(modern_graph());
    let combined = g
        .v([4])
        .union(vec![__::in_(&["knows"]), __::out(&["created"])])
        .id()
        .to_list()
        .unwrap();
    assert_eq!(combined, vec![Value::Int(1), Value::Int(5), Value::Int(3)]);
}

#[test]
fn coalesce_takes_first_productive_child() {
    let g = GraphTraversalSource::new(modern_graph());
    let fallback = g
        .v([2])
        .coalesce(vec![__::out(&["created"]).values(&["name"]), __::values(&["name"])])
        .to_list()
        .unwrap();
    assert_eq!(names(fallback), vec!["vadas"]);
}

#[test]
fn dedup_collapses_repeated_vertices() {
    let g = GraphTraversalSource::new(modern_graph());
    let creators = g.v([]).out(&["created"]).dedup().id().to_list().unwrap();
    assert_eq!(creators, vec![Value::Int(3), Value::Int(5)]);
}

#[test]
fn where_compares_two_bindings() {
    let g = GraphTraversalSource::new(modern_graph());
    // Co-created pairs excluding self-joins.
    let count = g
        .v([])
        .as_("a")
        .out(&["created"])
        .in_(&["created"])
        .as_("b")
        .where_from("a", P::Neq(Value::from("b")))
        .count()
        .to_list()
        .unwrap();
    assert_eq!(count, vec![Value::Int(6)]);
}

#[test]
fn reductions_over_ages() {
    let g = GraphTraversalSource::new(modern_graph());
    let sum = g.v([]).values(&["age"]).sum().to_list().unwrap();
    assert_eq!(sum, vec![Value::Int(123)]);
    let mean = g.v([]).values(&["age"]).mean().to_list().unwrap();
    assert_eq!(mean, vec![Value::Float(30.75)]);
    let max = g.v([]).values(&["age"]).max().to_list().unwrap();
    assert_eq!(max, vec![Value::Int(35)]);
}

#[test]
fn fold_with_seed_and_operator() {
    let g = GraphTraversalSource::new(modern_graph());
    let product = g
        .inject([2i64, 3, 4])
        .fold_with(1i64, Operator::Mult)
        .to_list()
        .unwrap();
    assert_eq!(product, vec![Value::Int(24)]);
}

#[test]
fn count_local_measures_each_collection() {
    let g = GraphTraversalSource::empty();
    let sizes = g
        .inject([Value::List(vec![Value::Int(1), Value::Int(2)]), Value::Int(9)])
        .count_local()
        .to_list()
        .unwrap();
    assert_eq!(sizes, vec![Value::Int(2), Value::Int(1)]);
}

#[test]
fn limit_and_tail_slice_the_stream() {
    let g = GraphTraversalSource::new(modern_graph());
    assert_eq!(g.v([]).limit(2).id().to_list().unwrap(), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(g.v([]).tail(2).id().to_list().unwrap(), vec![Value::Int(5), Value::Int(6)]);
    assert_eq!(g.v([]).range(1, 3).id().to_list().unwrap(), vec![Value::Int(2), Value::Int(3)]);
}

#[test]
fn simple_path_prunes_cycles() {
    let g = GraphTraversalSource::new(modern_graph());
    let back = g.v([1]).out(&["knows"]).in_(&["knows"]).simple_path().count().to_list().unwrap();
    // Both knows edges lead straight back to marko, a cycle.
    assert_eq!(back, vec![Value::Int(0)]);
}

#[test]
fn shuffle_is_reproducible_under_a_seed() {
    let graph = modern_graph();
    let run = |seed: u64| {
        GraphTraversalSource::new(graph.clone())
            .with_seed(seed)
            .v([])
            .order()
            .by_order(Order::Shuffle)
            .id()
            .to_list()
            .unwrap()
    };
    assert_eq!(run(42), run(42));
}

#[test]
fn reset_replays_the_traversal() {
    let g = GraphTraversalSource::new(modern_graph());
    let mut traversal = g.v([]).has_label("person").values(&["name"]);
    let first = traversal.to_list().unwrap();
    traversal.reset();
    assert_eq!(traversal.to_list().unwrap(), first);
}

#[test]
fn aggregate_then_cap_surfaces_the_side_effect() {
    let g = GraphTraversalSource::new(modern_graph());
    let capped = g
        .v([])
        .has_label("software")
        .values(&["name"])
        .aggregate("x")
        .cap(&["x"])
        .to_list()
        .unwrap();
    assert_eq!(capped, vec![Value::List(vec![Value::from("lop"), Value::from("ripple")])]);
}

#[test]
fn aggregate_local_is_lazy() {
    let g = GraphTraversalSource::new(modern_graph());
    let mut traversal = g.v([]).aggregate_local("seen").limit(1);
    traversal.iterate().unwrap();
    match traversal.side_effect_value("seen") {
        Some(Value::List(items)) => assert_eq!(items.len(), 1),
        other => panic!("expected list, found {:?}", other),
    }
}

#[test]
fn sack_carries_the_source_value() {
    let g = GraphTraversalSource::new(modern_graph()).with_sack(1.0f64);
    let sacks = g.v([1]).out(&["knows"]).sack().to_list().unwrap();
    assert_eq!(sacks, vec![Value::Float(1.0), Value::Float(1.0)]);
}

#[test]
fn fail_surfaces_as_an_error() {
    let g = GraphTraversalSource::new(modern_graph());
    let result = g.v([]).fail("forbidden").to_list();
    assert!(matches!(result, Err(TraversalError::Fail(_))));
}

#[test]
fn aggregate_respects_scope_argument_in_bytecode() {
    let g = GraphTraversalSource::new(modern_graph());
    let traversal = g.v([]).aggregate_local("x");
    let last = traversal.bytecode().step_instructions().last().unwrap();
    assert_eq!(last.operator, "aggregate");
    assert_eq!(last.args[0], serde_json::to_value(Scope::Local).unwrap());
}
