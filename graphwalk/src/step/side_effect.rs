// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Side-effect steps
//!
//! These observe or accumulate into the traversal's shared side-effect
//! registry. `aggregate` in global scope is a barrier (downstream sees
//! nothing until the upstream is fully drained), in local scope a lazy
//! pass-through. `cap` discards the stream and emits the registry value.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::step::{
    pull_start, step_common, ByMod, Requirements, Step, StepMeta, StepOut, TraversalRing,
};
use crate::structure::memory::MemoryGraph;
use crate::structure::value::Value;
use crate::traversal::{Operator, Scope, TraversalContext, TraversalError};
use crate::traverser::Traverser;

/// User-supplied observer for `sideEffect(lambda)`.
pub type SideEffectFn = Arc<dyn Fn(&mut Traverser) + Send + Sync>;

#[derive(Clone)]
pub struct LambdaSideEffectStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    effect: SideEffectFn,
}

impl LambdaSideEffectStep {
    pub fn new(effect: SideEffectFn) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), effect }
    }
}

impl fmt::Debug for LambdaSideEffectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaSideEffectStep").field("meta", &self.meta).finish()
    }
}

impl Step for LambdaSideEffectStep {
    step_common!("sideEffect");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let mut traverser = pull_start!(self, upstream_done);
        (self.effect)(&mut traverser);
        Ok(StepOut::Emit(traverser))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { side_effects: true, ..Requirements::default() }
    }
}

/// `aggregate('x')` (global barrier) / `aggregate(local, 'x')` (lazy).
#[derive(Debug, Clone)]
pub struct AggregateStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    key: String,
    scope: Scope,
    ring: TraversalRing,
    buffer: VecDeque<Traverser>,
    registered: bool,
}

impl AggregateStep {
    pub fn new(key: &str, scope: Scope) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            key: key.to_string(),
            scope,
            ring: TraversalRing::default(),
            buffer: VecDeque::new(),
            registered: false,
        }
    }

    fn store(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<(), TraversalError> {
        if !self.registered {
            self.registered = true;
            let mut side_effects = ctx.side_effects.write();
            if !side_effects.is_registered(&self.key) {
                side_effects.register(&self.key, Value::List(Vec::new()), Some(Operator::AddAll));
            }
        }
        if let Some(projected) = self.ring.next().apply(ctx, traverser)? {
            self.ring.rewind();
            let copies = vec![projected; traverser.bulk() as usize];
            ctx.side_effects.write().add(&self.key, Value::List(copies))?;
        } else {
            self.ring.rewind();
        }
        Ok(())
    }
}

impl Step for AggregateStep {
    step_common!("aggregate");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.scope == Scope::Local {
            let traverser = pull_start!(self, upstream_done);
            self.store(ctx, &traverser)?;
            return Ok(StepOut::Emit(traverser));
        }
        while let Some(traverser) = self.starts.pop_front() {
            self.store(ctx, &traverser)?;
            self.buffer.push_back(traverser);
        }
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        match self.buffer.pop_front() {
            Some(traverser) => Ok(StepOut::Emit(traverser)),
            None => Ok(StepOut::Done),
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
        self.ring.rewind();
        self.registered = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements { side_effects: true, ..Requirements::default() }
            .union(self.ring.requirements())
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

/// `cap('x', …)`: drains and discards the upstream, then emits the
/// side-effect value(s) once.
#[derive(Debug, Clone)]
pub struct CapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    keys: Vec<String>,
    emitted: bool,
}

impl CapStep {
    pub fn new(keys: Vec<String>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), keys, emitted: false }
    }
}

impl Step for CapStep {
    step_common!("cap");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        self.starts.clear();
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.emitted {
            return Ok(StepOut::Done);
        }
        self.emitted = true;
        let side_effects = ctx.side_effects.read();
        let lookup = |key: &String| {
            side_effects.get(key).ok_or_else(|| {
                TraversalError::IllegalState(format!("no side-effect registered as '{}'", key))
            })
        };
        let value = if self.keys.len() == 1 {
            lookup(&self.keys[0])?
        } else {
            let mut map = BTreeMap::new();
            for key in &self.keys {
                map.insert(Value::String(key.clone()), lookup(key)?);
            }
            Value::Map(map)
        };
        drop(side_effects);
        Ok(StepOut::Emit(Traverser::new(
            value,
            ctx.side_effects.clone(),
            ctx.path_tracking,
            ctx.initial_sack.clone(),
        )))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.emitted = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements { side_effects: true, ..Requirements::default() }
    }
}

/// `fail(message)`: fatal the moment a traverser reaches it.
#[derive(Debug, Clone)]
pub struct FailStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    message: String,
}

impl FailStep {
    pub fn new(message: &str) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), message: message.to_string() }
    }
}

impl Step for FailStep {
    step_common!("fail");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.starts.pop_front().is_some() {
            return Err(TraversalError::Fail(self.message.clone()));
        }
        Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `subgraph('x')`: collects every edge traverser (with both endpoints and
/// their properties) into an edge-induced side-effect graph.
#[derive(Debug, Clone)]
pub struct SubgraphStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    key: String,
    copied_edges: HashSet<i64>,
}

impl SubgraphStep {
    pub fn new(key: &str) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            key: key.to_string(),
            copied_edges: HashSet::new(),
        }
    }

    fn target(&self, ctx: &TraversalContext) -> Arc<MemoryGraph> {
        let mut side_effects = ctx.side_effects.write();
        if let Some(Value::Subgraph(graph)) = side_effects.get(&self.key) {
            return graph;
        }
        let graph = Arc::new(MemoryGraph::new());
        side_effects.register(&self.key, Value::Subgraph(graph.clone()), None);
        graph
    }

    fn copy_vertex(
        &self,
        ctx: &TraversalContext,
        target: &MemoryGraph,
        id: i64,
    ) -> Result<(), TraversalError> {
        use crate::structure::element::Cardinality;
        use crate::structure::graph::Graph;
        let source = crate::step::base::bound_graph(ctx)?;
        let vertex = source.vertex(id)?;
        if target.add_vertex_with_id(id, &vertex.label).is_ok() {
            for (key, value) in source.vertex_properties(id, &[]) {
                target.set_vertex_property(id, &key, value, Cardinality::List)?;
            }
        }
        Ok(())
    }
}

impl Step for SubgraphStep {
    step_common!("subgraph");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        use crate::structure::graph::Graph;
        let traverser = pull_start!(self, upstream_done);
        let Value::Edge(edge) = traverser.value().clone() else {
            return Err(TraversalError::IllegalState(format!(
                "subgraph() requires edge input, found {}",
                traverser.value().kind_name()
            )));
        };
        if self.copied_edges.insert(edge.id) {
            let target = self.target(ctx);
            self.copy_vertex(ctx, &target, edge.out_v)?;
            self.copy_vertex(ctx, &target, edge.in_v)?;
            let copied = target.add_edge(&edge.label, edge.out_v, edge.in_v)?;
            let source = crate::step::base::bound_graph(ctx)?;
            for (key, value) in source.edge_properties(edge.id, &[]) {
                target.set_edge_property(copied.id, &key, value)?;
            }
        }
        Ok(StepOut::Emit(traverser))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.copied_edges.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, side_effects: true, ..Requirements::default() }
    }
}

/// `sack()` reads the traverser's sack; `sack(op)` merges a `by()`
/// projection into it.
#[derive(Debug, Clone)]
pub struct SackStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    op: Option<Operator>,
    ring: TraversalRing,
}

impl SackStep {
    pub fn read() -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            op: None,
            ring: TraversalRing::default(),
        }
    }

    pub fn merge(op: Operator) -> Self {
        Self { op: Some(op), ..Self::read() }
    }
}

impl Step for SackStep {
    step_common!("sack");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let mut traverser = pull_start!(self, upstream_done);
            match self.op {
                None => {
                    let sack = traverser.sack().cloned().unwrap_or(Value::Null);
                    return Ok(StepOut::Emit(traverser.split(sack, ctx.path_tracking)));
                }
                Some(op) => {
                    let Some(projected) = self.ring.next().apply(ctx, &traverser)? else {
                        self.ring.rewind();
                        continue;
                    };
                    self.ring.rewind();
                    let current = traverser.sack().cloned().unwrap_or(Value::Null);
                    let merged = if current.is_null() {
                        projected
                    } else {
                        op.apply(current, projected)?
                    };
                    traverser.set_sack(Some(merged));
                    return Ok(StepOut::Emit(traverser));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.ring.rewind();
    }

    fn requirements(&self) -> Requirements {
        Requirements { sack: true, ..Requirements::default() }.union(self.ring.requirements())
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverser::side_effects::new_handle;

    #[test]
    fn aggregate_is_a_barrier_and_respects_bulk() {
        let handle = new_handle();
        let mut ctx = TraversalContext::new(handle.clone());
        ctx.side_effects = handle.clone();
        let mut step = AggregateStep::new("x", Scope::Global);
        let mut bulked = Traverser::new(Value::Int(7), handle.clone(), false, None);
        bulked.set_bulk(2);
        step.add_start(bulked);
        assert!(matches!(step.pull(&ctx, false).unwrap(), StepOut::NeedMore));
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Emit(_)));
        assert_eq!(
            handle.read().get("x"),
            Some(Value::List(vec![Value::Int(7), Value::Int(7)]))
        );
    }

    #[test]
    fn cap_emits_registry_value_once() {
        let handle = new_handle();
        handle.write().register("x", Value::Int(42), None);
        let ctx = TraversalContext::new(handle);
        let mut step = CapStep::new(vec!["x".to_string()]);
        step.add_start(Traverser::new(Value::Int(1), new_handle(), false, None));
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => assert_eq!(t.value(), &Value::Int(42)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Done));
    }
}
