// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The graph collaborator interface
//!
//! The traversal engine never touches storage directly; graph-entry start
//! steps and the mutating steps call through this trait. An in-memory
//! reference implementation lives in [`crate::structure::memory`].

use std::fmt;

use thiserror::Error;

use crate::structure::element::{Cardinality, Direction, Edge, Vertex};
use crate::structure::value::Value;

/// Storage-level errors surfaced by graph implementations.
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("Vertex with id {0} does not exist")]
    VertexNotFound(i64),

    #[error("Edge with id {0} does not exist")]
    EdgeNotFound(i64),

    #[error("Vertex with id {0} already exists")]
    VertexAlreadyExists(i64),

    #[error("Property key cannot be empty")]
    EmptyPropertyKey,
}

/// The property-graph surface consumed by the engine.
///
/// Implementations use interior mutability: the engine holds the graph
/// behind `Arc<dyn Graph>` and calls mutation methods through `&self`.
pub trait Graph: fmt::Debug + Send + Sync {
    /// Vertices by id; an empty id slice means all vertices, in id order.
    fn vertices(&self, ids: &[i64]) -> Vec<Vertex>;

    /// Edges by id; an empty id slice means all edges, in id order.
    fn edges(&self, ids: &[i64]) -> Vec<Edge>;

    fn vertex(&self, id: i64) -> Result<Vertex, StructureError>;

    fn edge(&self, id: i64) -> Result<Edge, StructureError>;

    fn add_vertex(&self, label: &str) -> Result<Vertex, StructureError>;

    fn add_edge(&self, label: &str, out_v: i64, in_v: i64) -> Result<Edge, StructureError>;

    fn remove_vertex(&self, id: i64) -> Result<(), StructureError>;

    fn remove_edge(&self, id: i64) -> Result<(), StructureError>;

    fn set_vertex_property(
        &self,
        id: i64,
        key: &str,
        value: Value,
        cardinality: Cardinality,
    ) -> Result<(), StructureError>;

    fn set_edge_property(&self, id: i64, key: &str, value: Value) -> Result<(), StructureError>;

    fn remove_vertex_property(&self, id: i64, key: &str) -> Result<(), StructureError>;

    fn remove_edge_property(&self, id: i64, key: &str) -> Result<(), StructureError>;

    /// Property entries of a vertex, expanded per cardinality (a list
    /// property yields one entry per stored value). An empty key slice
    /// means all keys, in key order.
    fn vertex_properties(&self, id: i64, keys: &[String]) -> Vec<(String, Value)>;

    fn edge_properties(&self, id: i64, keys: &[String]) -> Vec<(String, Value)>;

    /// Adjacent vertices reached over incident edges in `direction`,
    /// optionally restricted to the given edge labels.
    fn adjacent_vertices(&self, id: i64, direction: Direction, labels: &[String]) -> Vec<Vertex>;

    /// Incident edges in `direction`, optionally restricted by label.
    fn incident_edges(&self, id: i64, direction: Direction, labels: &[String]) -> Vec<Edge>;

    fn vertex_count(&self) -> usize;

    fn edge_count(&self) -> usize;
}
