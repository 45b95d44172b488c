// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph element reference types
//!
//! Vertices and edges are lightweight references (id + label); property data
//! lives in the owning graph and is reached through the [`Graph`] trait.
//!
//! [`Graph`]: crate::structure::graph::Graph

use serde::{Deserialize, Serialize};

/// A vertex reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vertex {
    pub id: i64,
    pub label: String,
}

impl Vertex {
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        Self { id, label: label.into() }
    }
}

/// An edge reference. `out_v` is the tail (source), `in_v` the head
/// (target): `out_v -label-> in_v`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: i64,
    pub label: String,
    pub out_v: i64,
    pub in_v: i64,
}

impl Edge {
    pub fn new(id: i64, label: impl Into<String>, out_v: i64, in_v: i64) -> Self {
        Self { id, label: label.into(), out_v, in_v }
    }
}

/// Traversal direction over incident edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    /// The opposite direction; `Both` is its own opposite.
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

/// Property cardinality for vertex properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One value per key; writing replaces.
    Single,
    /// Multiple values per key; writing appends.
    List,
    /// Multiple distinct values per key; writing appends if absent.
    Set,
}
