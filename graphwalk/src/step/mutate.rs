// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mutating steps
//!
//! `addV`, `addE` and `property` write through the bound [`Graph`] and emit
//! the affected element so property modulation can chain behind them.
//! `addV` doubles as a start step when it opens the traversal.
//!
//! [`Graph`]: crate::structure::graph::Graph

use std::collections::VecDeque;

use crate::step::base::bound_graph;
use crate::step::filter::resolve_binding;
use crate::step::{pull_start, step_common, Requirements, Step, StepMeta, StepOut};
use crate::structure::element::Cardinality;
use crate::structure::value::Value;
use crate::traversal::{Traversal, TraversalContext, TraversalError};
use crate::traverser::Traverser;

#[derive(Debug, Clone)]
pub struct AddVertexStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    label: String,
    generated: bool,
}

impl AddVertexStep {
    pub fn new(label: Option<&str>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            label: label.unwrap_or("vertex").to_string(),
            generated: false,
        }
    }
}

impl Step for AddVertexStep {
    step_common!("addV");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let graph = bound_graph(ctx)?;
        if let Some(traverser) = self.starts.pop_front() {
            self.generated = true;
            let vertex = graph.add_vertex(&self.label)?;
            log::debug!("addV created vertex {} ({})", vertex.id, vertex.label);
            return Ok(StepOut::Emit(
                traverser.split(Value::Vertex(vertex), ctx.path_tracking),
            ));
        }
        // As the first step of a traversal it creates exactly one vertex.
        if upstream_done && !self.generated {
            self.generated = true;
            let vertex = graph.add_vertex(&self.label)?;
            log::debug!("addV created vertex {} ({})", vertex.id, vertex.label);
            return Ok(StepOut::Emit(Traverser::new(
                Value::Vertex(vertex),
                ctx.side_effects.clone(),
                ctx.path_tracking,
                ctx.initial_sack.clone(),
            )));
        }
        Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.generated = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

/// Where an `addE` endpoint comes from.
#[derive(Debug, Clone)]
pub enum EdgeEnd {
    /// The incoming traverser's vertex.
    Current,
    /// A step label, side-effect key or map key holding a vertex.
    Binding(String),
    /// A literal vertex or vertex id.
    Literal(Value),
    /// The first result of a child traversal from the incoming traverser.
    Traversal(Traversal),
}

impl EdgeEnd {
    fn resolve(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
        end: &str,
    ) -> Result<i64, TraversalError> {
        let value = match self {
            EdgeEnd::Current => traverser.value().clone(),
            EdgeEnd::Binding(key) => resolve_binding(ctx, traverser, key).ok_or_else(|| {
                TraversalError::IllegalState(format!(
                    "addE {}() could not resolve '{}'",
                    end, key
                ))
            })?,
            EdgeEnd::Literal(value) => value.clone(),
            EdgeEnd::Traversal(child) => child.produce(ctx, traverser)?.ok_or_else(|| {
                TraversalError::IllegalState(format!("addE {}() traversal produced nothing", end))
            })?,
        };
        match value {
            Value::Vertex(vertex) => Ok(vertex.id),
            Value::Int(id) => Ok(id),
            other => Err(TraversalError::IllegalState(format!(
                "addE {}() requires a vertex, found {}",
                end,
                other.kind_name()
            ))),
        }
    }

    fn requirements(&self) -> Requirements {
        match self {
            EdgeEnd::Traversal(child) => child.requirements(),
            // Bindings resolve through the labeled path first.
            EdgeEnd::Binding(_) => {
                Requirements { path: true, labeled_path: true, ..Requirements::default() }
            }
            _ => Requirements::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddEdgeStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    label: String,
    from: EdgeEnd,
    to: EdgeEnd,
}

impl AddEdgeStep {
    pub fn new(label: &str) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            label: label.to_string(),
            from: EdgeEnd::Current,
            to: EdgeEnd::Current,
        }
    }

    pub fn set_from(&mut self, end: EdgeEnd) {
        self.from = end;
    }

    pub fn set_to(&mut self, end: EdgeEnd) {
        self.to = end;
    }
}

impl Step for AddEdgeStep {
    step_common!("addE");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let out_v = self.from.resolve(ctx, &traverser, "from")?;
        let in_v = self.to.resolve(ctx, &traverser, "to")?;
        let edge = bound_graph(ctx)?.add_edge(&self.label, out_v, in_v)?;
        log::debug!("addE created edge {}: {} -{}-> {}", edge.id, out_v, edge.label, in_v);
        Ok(StepOut::Emit(traverser.split(Value::Edge(edge), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        let base = Requirements { graph: true, ..Requirements::default() };
        base.union(self.from.requirements()).union(self.to.requirements())
    }
}

/// `property(key, value)` with optional cardinality; writes onto the
/// current element and passes the traverser through unchanged.
#[derive(Debug, Clone)]
pub struct PropertyStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    cardinality: Option<Cardinality>,
    key: String,
    value: Value,
}

impl PropertyStep {
    pub fn new(cardinality: Option<Cardinality>, key: &str, value: Value) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            cardinality,
            key: key.to_string(),
            value,
        }
    }
}

impl Step for PropertyStep {
    step_common!("property");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let graph = bound_graph(ctx)?;
        match traverser.value() {
            Value::Vertex(vertex) => {
                let cardinality = self.cardinality.unwrap_or(Cardinality::Single);
                graph.set_vertex_property(vertex.id, &self.key, self.value.clone(), cardinality)?;
            }
            Value::Edge(edge) => {
                graph.set_edge_property(edge.id, &self.key, self.value.clone())?;
            }
            other => {
                return Err(TraversalError::IllegalState(format!(
                    "property() requires an element, found {}",
                    other.kind_name()
                )))
            }
        }
        Ok(StepOut::Emit(traverser))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::structure::graph::Graph;
    use crate::structure::memory::MemoryGraph;
    use crate::traverser::side_effects::new_handle;

    fn graph_ctx() -> (Arc<MemoryGraph>, TraversalContext) {
        let graph = Arc::new(MemoryGraph::new());
        let mut ctx = TraversalContext::new(new_handle());
        ctx.graph = Some(graph.clone());
        (graph, ctx)
    }

    #[test]
    fn add_vertex_as_start_creates_exactly_one() {
        let (graph, ctx) = graph_ctx();
        let mut step = AddVertexStep::new(Some("person"));
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Emit(_)));
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Done));
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.vertices(&[])[0].label, "person");
    }

    #[test]
    fn add_edge_between_literal_vertices() {
        let (graph, ctx) = graph_ctx();
        let a = graph.add_vertex("person").unwrap();
        let b = graph.add_vertex("person").unwrap();
        let mut step = AddEdgeStep::new("knows");
        step.set_from(EdgeEnd::Literal(Value::Vertex(a.clone())));
        step.set_to(EdgeEnd::Literal(Value::Vertex(b.clone())));
        step.add_start(Traverser::new(Value::Vertex(a.clone()), new_handle(), false, None));
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => match t.value() {
                Value::Edge(edge) => {
                    assert_eq!(edge.label, "knows");
                    assert_eq!((edge.out_v, edge.in_v), (a.id, b.id));
                }
                other => panic!("expected edge, found {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn property_writes_through_to_the_graph() {
        let (graph, ctx) = graph_ctx();
        let v = graph.add_vertex("person").unwrap();
        let mut step = PropertyStep::new(None, "name", Value::String("marko".into()));
        step.add_start(Traverser::new(Value::Vertex(v.clone()), new_handle(), false, None));
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Emit(_)));
        assert_eq!(
            graph.vertex_properties(v.id, &["name".to_string()]),
            vec![("name".to_string(), Value::String("marko".into()))]
        );
    }
}
