// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph structure layer
//!
//! This module provides:
//! - Value type system for traverser payloads and properties
//! - Element reference types (vertex/edge, direction, cardinality)
//! - The `Graph` collaborator trait consumed by the engine
//! - An in-memory reference graph used by tests and the mutating steps

pub mod element;
pub mod graph;
pub mod memory;
pub mod value;

pub use element::{Cardinality, Direction, Edge, Vertex};
pub use graph::{Graph, StructureError};
pub use memory::MemoryGraph;
pub use value::Value;
