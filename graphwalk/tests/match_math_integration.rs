// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Integration tests for `match()` pattern joins and `math()` evaluation.

use std::sync::Arc;

use graphwalk::dsl::anonymous as __;
use graphwalk::{
    Cardinality, Graph, GraphTraversalSource, MatchAlgorithm, MemoryGraph, TraversalError, Value,
    P,
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
    for (label, out_v, in_v) in [
        ("knows", 1, 2),
        ("knows", 1, 4),
        ("created", 1, 3),
        ("created", 4, 5),
        ("created", 4, 3),
        ("created", 6, 3),
    ] {
        graph.add_edge(label, out_v, in_v).unwrap();
    }
    graph
}

fn binding(map: &Value, key: &str) -> i64 {
    let Value::Map(entries) = map else { panic!("expected binding map, found {:?}", map) };
    match entries.get(&Value::from(key)) {
        Some(Value::Vertex(v)) => v.id,
        other => panic!("binding '{}' missing or not a vertex: {:?}", key, other),
    }
}

#[test]
fn match_joins_two_patterns() {
    let g = GraphTraversalSource::new(modern_graph());
    let results = g
        .v([])
        .match_(vec![
            __::as_("a").out(&["created"]).as_("b"),
            __::as_("b").has_eq("lang", "java"),
        ])
        .to_list()
        .unwrap();
    let mut pairs: Vec<(i64, i64)> =
        results.iter().map(|m| (binding(m, "a"), binding(m, "b"))).collect();
    pairs.sort();
    assert_eq!(pairs, vec![(1, 3), (4, 3), (4, 5), (6, 3)]);
}

#[test]
fn match_chains_through_a_shared_binding() {
    let g = GraphTraversalSource::new(modern_graph());
    // Who created software that marko also created?
    let results = g
        .v([1])
        .match_(vec![
            __::as_("a").out(&["created"]).as_("b"),
            __::as_("b").in_(&["created"]).as_("c"),
            __::as_("c").where_from("c", P::Neq(Value::from("a"))),
        ])
        .to_list()
        .unwrap();
    let mut others: Vec<i64> = results.iter().map(|m| binding(m, "c")).collect();
    others.sort();
    assert_eq!(others, vec![4, 6]);
}

#[test]
fn match_count_based_algorithm_agrees_with_greedy() {
    let graph = modern_graph();
    let run = |algorithm: MatchAlgorithm| {
        let g = GraphTraversalSource::new(graph.clone());
        let mut results = g
            .v([])
            .match_(vec![
                __::as_("a").out(&["knows"]).as_("b"),
                __::as_("b").has("age", P::Gt(Value::Int(30))),
            ])
            .with_match_algorithm(algorithm)
            .to_list()
            .unwrap();
        results.sort();
        results
    };
    assert_eq!(run(MatchAlgorithm::Greedy), run(MatchAlgorithm::CountBased));
}

#[test]
fn match_dedup_on_a_single_binding() {
    let g = GraphTraversalSource::new(modern_graph());
    let results = g
        .v([])
        .match_(vec![__::as_("a").out(&["created"]).as_("b")])
        .dedup_labels(&["b"])
        .to_list()
        .unwrap();
    let mut software: Vec<i64> = results.iter().map(|m| binding(m, "b")).collect();
    software.sort();
    assert_eq!(software, vec![3, 5]);
}

#[test]
fn disjoint_patterns_fail_at_evaluation() {
    let g = GraphTraversalSource::new(modern_graph());
    let result = g
        .v([])
        .match_(vec![
            __::as_("a").out(&["knows"]).as_("b"),
            __::as_("c").out(&["created"]).as_("d"),
        ])
        .to_list();
    assert!(matches!(result, Err(TraversalError::UnmatchablePattern(_))));
}

#[test]
fn match_without_anchor_labels_is_rejected_at_build() {
    let g = GraphTraversalSource::new(modern_graph());
    let result = g.v([]).match_(vec![__::out(&["knows"])]).to_list();
    assert!(matches!(result, Err(TraversalError::IllegalConstruction(_))));
}

#[test]
fn math_on_the_incoming_value() {
    let g = GraphTraversalSource::empty();
    let results = g.inject([2i64, 3]).math("_ * 10 + 1").to_list().unwrap();
    assert_eq!(results, vec![Value::Float(21.0), Value::Float(31.0)]);
}

#[test]
fn math_resolves_labels_through_by_modulators() {
    let g = GraphTraversalSource::new(modern_graph());
    let results = g
        .v([1])
        .as_("a")
        .out(&["knows"])
        .as_("b")
        .math("b - a")
        .by_traversal(__::values(&["age"]))
        .to_list()
        .unwrap();
    assert_eq!(results, vec![Value::Float(-2.0), Value::Float(3.0)]);
}

#[test]
fn math_side_effect_variables() {
    let g = GraphTraversalSource::empty().with_side_effect("offset", 100i64);
    let results = g.inject([1i64]).math("_ + offset").to_list().unwrap();
    assert_eq!(results, vec![Value::Float(101.0)]);
}

#[test]
fn math_unresolvable_variable_is_fatal() {
    let g = GraphTraversalSource::empty();
    let result = g.inject([1i64]).math("_ + nope").to_list();
    assert!(matches!(result, Err(TraversalError::VariableResolution { .. })));
}

#[test]
fn malformed_expression_poisons_the_builder() {
    let g = GraphTraversalSource::empty();
    let result = g.inject([1i64]).math("1 +").to_list();
    assert!(matches!(result, Err(TraversalError::IllegalConstruction(_))));
}
