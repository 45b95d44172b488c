// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph entry and adjacency steps
//!
//! `V()`/`E()` act as generators when they sit at the head of a traversal
//! (nothing upstream will ever arrive) and as flat maps mid-traversal.
//! Adjacency expansion goes through the graph collaborator only.

use std::collections::VecDeque;

use crate::step::base::bound_graph;
use crate::step::{pull_start, step_common, Requirements, Step, StepMeta, StepOut};
use crate::structure::element::Direction;
use crate::structure::value::Value;
use crate::traversal::{TraversalContext, TraversalError};
use crate::traverser::Traverser;

/// `V(ids…)` / `E(ids…)`.
#[derive(Debug, Clone)]
pub struct GraphStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    ids: Vec<i64>,
    edges: bool,
    buffer: VecDeque<Traverser>,
    generated: bool,
}

impl GraphStep {
    pub fn vertices(ids: Vec<i64>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            ids,
            edges: false,
            buffer: VecDeque::new(),
            generated: false,
        }
    }

    pub fn edges(ids: Vec<i64>) -> Self {
        Self { edges: true, ..Self::vertices(ids) }
    }

    fn elements(&self, ctx: &TraversalContext) -> Result<Vec<Value>, TraversalError> {
        let graph = bound_graph(ctx)?;
        Ok(if self.edges {
            graph.edges(&self.ids).into_iter().map(Value::Edge).collect()
        } else {
            graph.vertices(&self.ids).into_iter().map(Value::Vertex).collect()
        })
    }
}

impl Step for GraphStep {
    step_common!("V");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if let Some(ready) = self.buffer.pop_front() {
                return Ok(StepOut::Emit(ready));
            }
            if let Some(traverser) = self.starts.pop_front() {
                // Mid-traversal use: flat-map only, never the head generator.
                self.generated = true;
                for element in self.elements(ctx)? {
                    self.buffer.push_back(traverser.split(element, ctx.path_tracking));
                }
                continue;
            }
            if upstream_done && !self.generated {
                // Head of the traversal: generate fresh traversers.
                self.generated = true;
                log::debug!(
                    "graph step generating {} start(s)",
                    if self.edges { "edge" } else { "vertex" }
                );
                for element in self.elements(ctx)? {
                    self.buffer.push_back(Traverser::new(
                        element,
                        ctx.side_effects.clone(),
                        ctx.path_tracking,
                        ctx.initial_sack.clone(),
                    ));
                }
                continue;
            }
            return Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore });
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
        self.generated = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

/// `out`/`in`/`both` and the `outE`/`inE`/`bothE` edge variants.
#[derive(Debug, Clone)]
pub struct VertexStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    direction: Direction,
    labels: Vec<String>,
    to_edges: bool,
    buffer: VecDeque<Traverser>,
}

impl VertexStep {
    pub fn adjacent(direction: Direction, labels: Vec<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            direction,
            labels,
            to_edges: false,
            buffer: VecDeque::new(),
        }
    }

    pub fn incident(direction: Direction, labels: Vec<String>) -> Self {
        Self { to_edges: true, ..Self::adjacent(direction, labels) }
    }
}

impl Step for VertexStep {
    step_common!("out");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if let Some(ready) = self.buffer.pop_front() {
                return Ok(StepOut::Emit(ready));
            }
            let traverser = pull_start!(self, upstream_done);
            let Value::Vertex(vertex) = traverser.value() else {
                return Err(TraversalError::IllegalState(format!(
                    "vertex step requires vertex input, found {}",
                    traverser.value().kind_name()
                )));
            };
            let graph = bound_graph(ctx)?;
            if self.to_edges {
                for edge in graph.incident_edges(vertex.id, self.direction, &self.labels) {
                    self.buffer
                        .push_back(traverser.split(Value::Edge(edge), ctx.path_tracking));
                }
            } else {
                for adjacent in
                    graph.adjacent_vertices(vertex.id, self.direction, &self.labels)
                {
                    self.buffer
                        .push_back(traverser.split(Value::Vertex(adjacent), ctx.path_tracking));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

/// Which endpoint(s) of an edge `outV`/`inV`/`bothV`/`otherV` resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEndpoint {
    Out,
    In,
    Both,
    /// The endpoint the traverser did not arrive from; requires a path.
    Other,
}

#[derive(Debug, Clone)]
pub struct EdgeVertexStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    endpoint: EdgeEndpoint,
    buffer: VecDeque<Traverser>,
}

impl EdgeVertexStep {
    pub fn new(endpoint: EdgeEndpoint) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            endpoint,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for EdgeVertexStep {
    step_common!("outV");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if let Some(ready) = self.buffer.pop_front() {
                return Ok(StepOut::Emit(ready));
            }
            let traverser = pull_start!(self, upstream_done);
            let Value::Edge(edge) = traverser.value().clone() else {
                return Err(TraversalError::IllegalState(format!(
                    "edge-vertex step requires edge input, found {}",
                    traverser.value().kind_name()
                )));
            };
            let graph = bound_graph(ctx)?;
            let ids: Vec<i64> = match self.endpoint {
                EdgeEndpoint::Out => vec![edge.out_v],
                EdgeEndpoint::In => vec![edge.in_v],
                EdgeEndpoint::Both => vec![edge.out_v, edge.in_v],
                EdgeEndpoint::Other => {
                    // The most recent vertex before this edge tells us the
                    // arrival side.
                    let arrived_from = traverser
                        .path()
                        .objects()
                        .iter()
                        .rev()
                        .skip(1)
                        .find_map(|v| match v {
                            Value::Vertex(v) => Some(v.id),
                            _ => None,
                        })
                        .ok_or_else(|| {
                            TraversalError::IllegalState(
                                "otherV() requires path history".to_string(),
                            )
                        })?;
                    if arrived_from == edge.out_v {
                        vec![edge.in_v]
                    } else {
                        vec![edge.out_v]
                    }
                }
            };
            for id in ids {
                let vertex = graph.vertex(id)?;
                self.buffer
                    .push_back(traverser.split(Value::Vertex(vertex), ctx.path_tracking));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            graph: true,
            path: self.endpoint == EdgeEndpoint::Other,
            ..Requirements::default()
        }
    }
}

/// `inject(values…)`: passes the upstream through, then emits the injected
/// values once as fresh traversers. At the head of a traversal it is a pure
/// generator.
#[derive(Debug, Clone)]
pub struct InjectStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    values: Vec<Value>,
    injected: bool,
}

impl InjectStep {
    pub fn new(values: Vec<Value>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), values, injected: false }
    }
}

impl Step for InjectStep {
    step_common!("inject");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if let Some(traverser) = self.starts.pop_front() {
            return Ok(StepOut::Emit(traverser));
        }
        if upstream_done && !self.injected {
            self.injected = true;
            for value in &self.values {
                self.starts.push_back(Traverser::new(
                    value.clone(),
                    ctx.side_effects.clone(),
                    ctx.path_tracking,
                    ctx.initial_sack.clone(),
                ));
            }
            if let Some(traverser) = self.starts.pop_front() {
                return Ok(StepOut::Emit(traverser));
            }
        }
        Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.injected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::structure::graph::Graph;
    use crate::structure::memory::MemoryGraph;
    use crate::traverser::side_effects::new_handle;

    #[test]
    fn mid_traversal_graph_step_does_not_regenerate() {
        let graph = Arc::new(MemoryGraph::new());
        graph.add_vertex("person").unwrap();
        graph.add_vertex("person").unwrap();
        let mut ctx = TraversalContext::new(new_handle());
        ctx.graph = Some(graph);

        let mut step = GraphStep::vertices(vec![]);
        step.add_start(Traverser::new(Value::Int(0), new_handle(), false, None));
        let mut emitted = 0;
        loop {
            match step.pull(&ctx, true).unwrap() {
                StepOut::Emit(_) => emitted += 1,
                StepOut::Done => break,
                StepOut::NeedMore => panic!("graph step asked for more after done"),
            }
        }
        // One flat-map fan-out per start; the head-generator branch must
        // stay off once a start has been consumed.
        assert_eq!(emitted, 2);
    }

    #[test]
    fn inject_generates_in_declaration_order() {
        let mut step = InjectStep::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let ctx = TraversalContext::new(new_handle());
        let mut seen = Vec::new();
        loop {
            match step.pull(&ctx, true).unwrap() {
                StepOut::Emit(t) => seen.push(t.value().clone()),
                StepOut::Done => break,
                StepOut::NeedMore => panic!("inject asked for more after done"),
            }
        }
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
