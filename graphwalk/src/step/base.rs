// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Map-family steps
//!
//! Scalar maps replace the traverser's value one-for-one; flat maps fan
//! out through a per-input buffer drained before the next start is pulled.
//! Unproductive projections filter the traverser, they never error.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::step::{
    project_key, pull_start, step_common, ByMod, Requirements, Step, StepOut, StepMeta,
    TraversalRing,
};
use crate::structure::graph::Graph;
use crate::structure::value::Value;
use crate::traversal::{Traversal, TraversalContext, TraversalError};
use crate::traverser::{Pop, Traverser};

/// User-supplied transform for `map(lambda)`.
pub type MapFn = Arc<dyn Fn(&Traverser) -> Result<Value, TraversalError> + Send + Sync>;

pub(crate) fn bound_graph(
    ctx: &TraversalContext,
) -> Result<&Arc<dyn Graph>, TraversalError> {
    ctx.graph.as_ref().ok_or_else(|| {
        TraversalError::IllegalState("no graph bound to this traversal".to_string())
    })
}

#[derive(Debug, Clone, Default)]
pub struct IdentityStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl IdentityStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for IdentityStep {
    step_common!("identity");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        Ok(StepOut::Emit(pull_start!(self, upstream_done)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

#[derive(Debug, Clone)]
pub struct ConstantStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    value: Value,
}

impl ConstantStep {
    pub fn new(value: Value) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), value }
    }
}

impl Step for ConstantStep {
    step_common!("constant");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        Ok(StepOut::Emit(traverser.split(self.value.clone(), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `map(traversal)`: first child result replaces the value; an empty child
/// filters the traverser.
#[derive(Debug, Clone)]
pub struct MapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    child: Traversal,
}

impl MapStep {
    pub fn new(child: Traversal) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), child }
    }
}

impl Step for MapStep {
    step_common!("map");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let traverser = pull_start!(self, upstream_done);
            if let Some(value) = self.child.produce(ctx, &traverser)? {
                return Ok(StepOut::Emit(traverser.split(value, ctx.path_tracking)));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.child.reset();
    }

    fn requirements(&self) -> Requirements {
        self.child.requirements()
    }
}

/// `flatMap(traversal)`: the child is fully drained per input before the
/// next start is pulled.
#[derive(Debug, Clone)]
pub struct FlatMapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    child: Traversal,
    buffer: VecDeque<Traverser>,
}

impl FlatMapStep {
    pub fn new(child: Traversal) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            child,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for FlatMapStep {
    step_common!("flatMap");

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
            self.buffer = self.child.flat(ctx, &traverser)?.into();
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
        self.child.reset();
    }

    fn requirements(&self) -> Requirements {
        self.child.requirements()
    }
}

/// `map(lambda)`: any error from the transform is fatal.
#[derive(Clone)]
pub struct LambdaMapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    transform: MapFn,
}

impl LambdaMapStep {
    pub fn new(transform: MapFn) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), transform }
    }
}

impl fmt::Debug for LambdaMapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaMapStep").field("meta", &self.meta).finish()
    }
}

impl Step for LambdaMapStep {
    step_common!("map");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let value = (self.transform)(&traverser)?;
        Ok(StepOut::Emit(traverser.split(value, ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl IdStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for IdStep {
    step_common!("id");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let id = traverser.value().element_id().ok_or_else(|| {
            TraversalError::IllegalState(format!(
                "id() requires a graph element, found {}",
                traverser.value().kind_name()
            ))
        })?;
        Ok(StepOut::Emit(traverser.split(Value::Int(id), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl LabelStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for LabelStep {
    step_common!("label");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let label = match traverser.value() {
            Value::Vertex(v) => v.label.clone(),
            Value::Edge(e) => e.label.clone(),
            other => {
                return Err(TraversalError::IllegalState(format!(
                    "label() requires a graph element, found {}",
                    other.kind_name()
                )))
            }
        };
        Ok(StepOut::Emit(traverser.split(Value::String(label), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `key()` / `value()` over property entries; non-properties are filtered.
#[derive(Debug, Clone)]
pub struct PropertyValueStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    want_key: bool,
}

impl PropertyValueStep {
    pub fn key() -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), want_key: true }
    }

    pub fn value() -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), want_key: false }
    }
}

impl Step for PropertyValueStep {
    step_common!("key");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let traverser = pull_start!(self, upstream_done);
            if let Value::Property { key, value } = traverser.value() {
                let out = if self.want_key {
                    Value::String(key.clone())
                } else {
                    (**value).clone()
                };
                return Ok(StepOut::Emit(traverser.split(out, ctx.path_tracking)));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

fn element_properties(
    ctx: &TraversalContext,
    value: &Value,
    keys: &[String],
) -> Result<Vec<(String, Value)>, TraversalError> {
    match value {
        Value::Vertex(v) => Ok(bound_graph(ctx)?.vertex_properties(v.id, keys)),
        Value::Edge(e) => Ok(bound_graph(ctx)?.edge_properties(e.id, keys)),
        _ => Ok(Vec::new()),
    }
}

/// `properties(keys…)`: one `Value::Property` per stored entry.
#[derive(Debug, Clone)]
pub struct PropertiesStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    keys: Vec<String>,
    buffer: VecDeque<Traverser>,
    values_only: bool,
}

impl PropertiesStep {
    pub fn properties(keys: Vec<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            keys,
            buffer: VecDeque::new(),
            values_only: false,
        }
    }

    /// `values(keys…)`: property values without the key wrapper.
    pub fn values(keys: Vec<String>) -> Self {
        Self { values_only: true, ..Self::properties(keys) }
    }
}

impl Step for PropertiesStep {
    step_common!("properties");

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
            for (key, value) in element_properties(ctx, traverser.value(), &self.keys)? {
                let out = if self.values_only {
                    value
                } else {
                    Value::Property { key, value: Box::new(value) }
                };
                self.buffer.push_back(traverser.split(out, ctx.path_tracking));
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

fn group_by_key(entries: Vec<(String, Value)>) -> BTreeMap<Value, Value> {
    let mut grouped: BTreeMap<Value, Vec<Value>> = BTreeMap::new();
    for (key, value) in entries {
        grouped.entry(Value::String(key)).or_default().push(value);
    }
    grouped.into_iter().map(|(k, vs)| (k, Value::List(vs))).collect()
}

/// `propertyMap` / `valueMap`, with optional `~id`/`~label` token entries
/// enabled by `with()`.
#[derive(Debug, Clone)]
pub struct PropertyMapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    keys: Vec<String>,
    tokens: bool,
}

impl PropertyMapStep {
    pub fn new(keys: Vec<String>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), keys, tokens: false }
    }

    pub fn set_tokens(&mut self, tokens: bool) {
        self.tokens = tokens;
    }
}

impl Step for PropertyMapStep {
    step_common!("valueMap");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let mut map = group_by_key(element_properties(ctx, traverser.value(), &self.keys)?);
        if self.tokens {
            if let Some(id) = traverser.value().element_id() {
                map.insert(Value::String("~id".to_string()), Value::Int(id));
            }
            if let Value::Vertex(v) = traverser.value() {
                map.insert(
                    Value::String("~label".to_string()),
                    Value::String(v.label.clone()),
                );
            } else if let Value::Edge(e) = traverser.value() {
                map.insert(
                    Value::String("~label".to_string()),
                    Value::String(e.label.clone()),
                );
            }
        }
        Ok(StepOut::Emit(traverser.split(Value::Map(map), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

/// `elementMap(keys…)`: `~id`/`~label` plus one (last-write) value per key.
#[derive(Debug, Clone)]
pub struct ElementMapStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    keys: Vec<String>,
}

impl ElementMapStep {
    pub fn new(keys: Vec<String>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), keys }
    }
}

impl Step for ElementMapStep {
    step_common!("elementMap");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let mut map = BTreeMap::new();
        if let Some(id) = traverser.value().element_id() {
            map.insert(Value::String("~id".to_string()), Value::Int(id));
        }
        match traverser.value() {
            Value::Vertex(v) => {
                map.insert(
                    Value::String("~label".to_string()),
                    Value::String(v.label.clone()),
                );
            }
            Value::Edge(e) => {
                map.insert(
                    Value::String("~label".to_string()),
                    Value::String(e.label.clone()),
                );
            }
            _ => {}
        }
        for (key, value) in element_properties(ctx, traverser.value(), &self.keys)? {
            map.insert(Value::String(key), value);
        }
        Ok(StepOut::Emit(traverser.split(Value::Map(map), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

/// `select(keys…)`: path-label lookup first, then side-effect keys, then
/// map-key projection of the current value. Unresolvable keys filter the
/// traverser.
#[derive(Debug, Clone)]
pub struct SelectStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    pop: Pop,
    keys: Vec<String>,
    ring: TraversalRing,
}

impl SelectStep {
    pub fn new(pop: Pop, keys: Vec<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            pop,
            keys,
            ring: TraversalRing::default(),
        }
    }

    fn resolve(
        &self,
        ctx: &TraversalContext,
        traverser: &Traverser,
        key: &str,
    ) -> Option<Value> {
        if let Some(bound) = traverser.path().get(self.pop, key) {
            return Some(bound);
        }
        if let Some(stored) = ctx.side_effects.read().get(key) {
            return Some(stored);
        }
        if let Value::Map(map) = traverser.value() {
            return map.get(&Value::String(key.to_string())).cloned();
        }
        None
    }
}

impl Step for SelectStep {
    step_common!("select");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        'next: loop {
            let traverser = pull_start!(self, upstream_done);
            let mut resolved = Vec::with_capacity(self.keys.len());
            for key in &self.keys {
                let Some(raw) = self.resolve(ctx, &traverser, key) else {
                    continue 'next;
                };
                let bound = traverser.split(raw, false);
                let Some(projected) = self.ring.next().apply(ctx, &bound)? else {
                    continue 'next;
                };
                resolved.push((key.clone(), projected));
            }
            self.ring.rewind();
            let value = if resolved.len() == 1 {
                resolved.remove(0).1
            } else {
                Value::Map(
                    resolved
                        .into_iter()
                        .map(|(k, v)| (Value::String(k), v))
                        .collect(),
                )
            };
            return Ok(StepOut::Emit(traverser.split(value, ctx.path_tracking)));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.ring.rewind();
    }

    fn requirements(&self) -> Requirements {
        Requirements { labeled_path: true, side_effects: true, ..Requirements::default() }
            .union(self.ring.requirements())
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

/// `path()`: the full labeled history as a list, each entry projected by
/// the `by()` ring in rotation.
#[derive(Debug, Clone, Default)]
pub struct PathStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    ring: TraversalRing,
}

impl PathStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for PathStep {
    step_common!("path");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        'next: loop {
            let traverser = pull_start!(self, upstream_done);
            let mut objects = Vec::with_capacity(traverser.path().len());
            for object in traverser.path().objects().to_vec() {
                let bound = traverser.split(object, false);
                let Some(projected) = self.ring.next().apply(ctx, &bound)? else {
                    self.ring.rewind();
                    continue 'next;
                };
                objects.push(projected);
            }
            self.ring.rewind();
            return Ok(StepOut::Emit(
                traverser.split(Value::List(objects), ctx.path_tracking),
            ));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.ring.rewind();
    }

    fn requirements(&self) -> Requirements {
        Requirements { path: true, ..Requirements::default() }.union(self.ring.requirements())
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

/// `project(keys…)`: one `by()` projection per declared key, in order.
#[derive(Debug, Clone)]
pub struct ProjectStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    keys: Vec<String>,
    ring: TraversalRing,
}

impl ProjectStep {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            keys,
            ring: TraversalRing::default(),
        }
    }
}

impl Step for ProjectStep {
    step_common!("project");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        'next: loop {
            let traverser = pull_start!(self, upstream_done);
            let mut map = BTreeMap::new();
            for key in &self.keys {
                let Some(projected) = self.ring.next().apply(ctx, &traverser)? else {
                    self.ring.rewind();
                    continue 'next;
                };
                map.insert(Value::String(key.clone()), projected);
            }
            self.ring.rewind();
            return Ok(StepOut::Emit(traverser.split(Value::Map(map), ctx.path_tracking)));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.ring.rewind();
    }

    fn requirements(&self) -> Requirements {
        self.ring.requirements()
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

/// `unfold()`: lists and sets flatten to elements, maps to one-entry maps,
/// anything else passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct UnfoldStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    buffer: VecDeque<Traverser>,
}

impl UnfoldStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for UnfoldStep {
    step_common!("unfold");

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
            match traverser.value().clone() {
                Value::List(items) => {
                    for item in items {
                        self.buffer.push_back(traverser.split(item, ctx.path_tracking));
                    }
                }
                Value::Set(items) => {
                    for item in items {
                        self.buffer.push_back(traverser.split(item, ctx.path_tracking));
                    }
                }
                Value::Map(entries) => {
                    for (key, value) in entries {
                        let entry = Value::Map([(key, value)].into_iter().collect());
                        self.buffer.push_back(traverser.split(entry, ctx.path_tracking));
                    }
                }
                _ => return Ok(StepOut::Emit(traverser)),
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
    }
}

/// `loops()`: the current repeat depth as an integer.
#[derive(Debug, Clone)]
pub struct LoopsStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    name: Option<String>,
}

impl LoopsStep {
    pub fn new(name: Option<String>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), name }
    }
}

impl Step for LoopsStep {
    step_common!("loops");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let count = match &self.name {
            Some(name) => traverser.loops_named(name).ok_or_else(|| {
                TraversalError::IllegalState(format!("no loop named '{}'", name))
            })?,
            None => traverser.loops(),
        };
        Ok(StepOut::Emit(traverser.split(Value::Int(count as i64), ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `index()`: pairs each collection element with its position.
#[derive(Debug, Clone, Default)]
pub struct IndexStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl IndexStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for IndexStep {
    step_common!("index");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let indexed = match traverser.value() {
            Value::List(items) => Value::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Value::List(vec![item.clone(), Value::Int(i as i64)]))
                    .collect(),
            ),
            single => Value::List(vec![Value::List(vec![single.clone(), Value::Int(0)])]),
        };
        Ok(StepOut::Emit(traverser.split(indexed, ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// Property projection used by `values`-style shorthands over maps as well
/// as elements; kept here so `by("name")` and `has("name", …)` share it.
pub fn project_value(
    ctx: &TraversalContext,
    value: &Value,
    key: &str,
) -> Result<Option<Value>, TraversalError> {
    project_key(ctx, value, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverser::side_effects::new_handle;

    fn traverser(value: Value) -> Traverser {
        Traverser::new(value, new_handle(), true, None)
    }

    fn ctx() -> TraversalContext {
        let mut ctx = TraversalContext::new(new_handle());
        ctx.path_tracking = true;
        ctx
    }

    #[test]
    fn unfold_flattens_lists_in_order() {
        let mut step = UnfoldStep::new();
        let ctx = ctx();
        step.add_start(traverser(Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ])));
        let mut seen = Vec::new();
        loop {
            match step.pull(&ctx, true).unwrap() {
                StepOut::Emit(t) => seen.push(t.value().clone()),
                StepOut::Done => break,
                StepOut::NeedMore => panic!("unfold asked for more after done"),
            }
        }
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn constant_replaces_value_and_extends_path() {
        let mut step = ConstantStep::new(Value::Int(9));
        let ctx = ctx();
        step.add_start(traverser(Value::Int(1)));
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => {
                assert_eq!(t.value(), &Value::Int(9));
                assert_eq!(t.path().len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
