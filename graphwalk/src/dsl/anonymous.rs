// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Anonymous traversal starts
//!
//! Free functions that open a child traversal with no bound graph or
//! source configuration. They cover the step vocabulary most commonly
//! used at the head of a child; anything else chains off the returned
//! builder as usual:
//!
//! ```ignore
//! use graphwalk::dsl::anonymous as __;
//!
//! g.v([]).repeat(__::out(&["knows"])).times(2)
//! ```

use crate::structure::value::Value;
use crate::traversal::{Operator, P};

use super::GraphTraversal;

pub fn start() -> GraphTraversal {
    GraphTraversal::anonymous()
}

pub fn identity() -> GraphTraversal {
    start().identity()
}

pub fn constant(value: impl Into<Value>) -> GraphTraversal {
    start().constant(value)
}

pub fn out(labels: &[&str]) -> GraphTraversal {
    start().out(labels)
}

pub fn in_(labels: &[&str]) -> GraphTraversal {
    start().in_(labels)
}

pub fn both(labels: &[&str]) -> GraphTraversal {
    start().both(labels)
}

pub fn out_e(labels: &[&str]) -> GraphTraversal {
    start().out_e(labels)
}

pub fn in_e(labels: &[&str]) -> GraphTraversal {
    start().in_e(labels)
}

pub fn both_e(labels: &[&str]) -> GraphTraversal {
    start().both_e(labels)
}

pub fn out_v() -> GraphTraversal {
    start().out_v()
}

pub fn in_v() -> GraphTraversal {
    start().in_v()
}

pub fn other_v() -> GraphTraversal {
    start().other_v()
}

pub fn values(keys: &[&str]) -> GraphTraversal {
    start().values(keys)
}

pub fn id() -> GraphTraversal {
    start().id()
}

pub fn label() -> GraphTraversal {
    start().label()
}

pub fn select(key: &str) -> GraphTraversal {
    start().select(key)
}

pub fn path() -> GraphTraversal {
    start().path()
}

pub fn unfold() -> GraphTraversal {
    start().unfold()
}

pub fn fold() -> GraphTraversal {
    start().fold()
}

pub fn count() -> GraphTraversal {
    start().count()
}

pub fn sum() -> GraphTraversal {
    start().sum()
}

pub fn min() -> GraphTraversal {
    start().min()
}

pub fn max() -> GraphTraversal {
    start().max()
}

pub fn mean() -> GraphTraversal {
    start().mean()
}

pub fn has(key: &str, predicate: P) -> GraphTraversal {
    start().has(key, predicate)
}

pub fn has_eq(key: &str, value: impl Into<Value>) -> GraphTraversal {
    start().has_eq(key, value)
}

pub fn has_label(label: impl Into<Value>) -> GraphTraversal {
    start().has_label(label)
}

pub fn is_(predicate: P) -> GraphTraversal {
    start().is_(predicate)
}

pub fn is_eq(value: impl Into<Value>) -> GraphTraversal {
    start().is_eq(value)
}

pub fn where_(predicate: P) -> GraphTraversal {
    start().where_(predicate)
}

pub fn where_from(start_key: &str, predicate: P) -> GraphTraversal {
    start().where_from(start_key, predicate)
}

pub fn not(child: GraphTraversal) -> GraphTraversal {
    start().not(child)
}

pub fn and(children: Vec<GraphTraversal>) -> GraphTraversal {
    start().and(children)
}

pub fn or(children: Vec<GraphTraversal>) -> GraphTraversal {
    start().or(children)
}

pub fn loops() -> GraphTraversal {
    start().loops()
}

pub fn loops_named(name: &str) -> GraphTraversal {
    start().loops_named(name)
}

pub fn sack() -> GraphTraversal {
    start().sack()
}

pub fn sack_merge(op: Operator) -> GraphTraversal {
    start().sack_merge(op)
}

pub fn add_v(label: &str) -> GraphTraversal {
    start().add_v(label)
}

pub fn add_e(label: &str) -> GraphTraversal {
    start().add_e(label)
}

/// `as('label')` at the head of a match pattern.
pub fn as_(label: &str) -> GraphTraversal {
    start().as_(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_starts_record_bytecode() {
        let child = as_("a").out(&["knows"]).as_("b");
        let ops: Vec<&str> = child
            .bytecode()
            .step_instructions()
            .iter()
            .map(|i| i.operator.as_str())
            .collect();
        assert_eq!(ops, vec!["as", "out", "as"]);
    }
}
