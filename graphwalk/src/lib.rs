// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! graphwalk: a pull-based graph traversal engine
//!
//! A traversal is a chain of steps, each a small iterator transformer
//! over [`Traverser`]s. The last step pulls from its upstream on demand,
//! so results stream lazily and barriers (ordering, grouping, reduction)
//! drain only when their upstream is exhausted. Traversals are built
//! through the fluent [`GraphTraversalSource`] DSL, which also records a
//! replayable [`Bytecode`] log of every call.
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphwalk::{GraphTraversalSource, MemoryGraph};
//! use graphwalk::dsl::anonymous as __;
//!
//! let graph = Arc::new(MemoryGraph::new());
//! let g = GraphTraversalSource::new(graph);
//! let names = g.v([]).has_label("person").values(&["name"]).to_list()?;
//! ```
//!
//! [`Traverser`]: traverser::Traverser

pub mod dsl;
pub mod step;
pub mod structure;
pub mod traversal;
pub mod traverser;

pub use dsl::{anonymous, GraphTraversal, GraphTraversalSource};
pub use step::match_step::MatchAlgorithm;
pub use step::Token;
pub use structure::element::{Cardinality, Direction, Edge, Vertex};
pub use structure::graph::Graph;
pub use structure::memory::MemoryGraph;
pub use structure::value::Value;
pub use traversal::{
    Bytecode, Operator, Order, Pick, Scope, TextP, Traversal, TraversalContext, TraversalError, P,
};
pub use traverser::{Path, Pop, Traverser};
