// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ordering
//!
//! The global variant is a collecting barrier: the whole upstream is
//! buffered in a coalescing [`TraverserSet`], projected once per comparator
//! pair at drain time, then stably sorted so ties keep arrival order. A
//! shuffle comparator anywhere in the list wins over everything else and
//! produces a seeded random permutation. The local variant orders the
//! contents of each traverser's own collection.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::step::{pull_start, step_common, ByMod, Requirements, Step, StepMeta, StepOut};
use crate::structure::value::Value;
use crate::traversal::{Order, TraversalContext, TraversalError};
use crate::traverser::{Traverser, TraverserSet};

#[derive(Debug, Clone)]
pub struct OrderGlobalStep {
    meta: StepMeta,
    buffer: TraverserSet,
    pairs: Vec<(ByMod, Order)>,
    sorted: Option<VecDeque<Traverser>>,
}

impl OrderGlobalStep {
    pub fn new() -> Self {
        Self {
            meta: StepMeta::default(),
            buffer: TraverserSet::new(),
            pairs: Vec::new(),
            sorted: None,
        }
    }

    pub fn add_comparator(&mut self, by: ByMod, order: Order) {
        self.pairs.push((by, order));
    }

    fn has_shuffle(&self) -> bool {
        self.pairs.iter().any(|(_, order)| order.is_shuffle())
    }
}

impl Default for OrderGlobalStep {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_tuples(pairs: &[(ByMod, Order)], a: &[Value], b: &[Value]) -> Ordering {
    for (index, (_, order)) in pairs.iter().enumerate() {
        let ordering = order.compare(&a[index], &b[index]);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl Step for OrderGlobalStep {
    step_common!("order");

    fn add_start(&mut self, traverser: Traverser) {
        self.buffer.add(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.pairs.is_empty() {
            self.pairs.push((ByMod::Identity, Order::Asc));
        }
        if self.sorted.is_none() {
            if self.has_shuffle() {
                let mut rng = ctx.rng();
                self.buffer.shuffle(&mut rng);
                let mut items = VecDeque::with_capacity(self.buffer.len());
                while let Some(traverser) = self.buffer.pop() {
                    items.push_back(traverser);
                }
                self.sorted = Some(items);
            } else {
                // Projection must run through `ByMod::apply`, which needs
                // mutable modulator state, so tuples are computed up front
                // rather than inside a comparator.
                let mut projected: Vec<(Vec<Value>, Traverser)> =
                    Vec::with_capacity(self.buffer.len());
                'drain: while let Some(traverser) = self.buffer.pop() {
                    let mut tuple = Vec::with_capacity(self.pairs.len());
                    for (by, _) in &mut self.pairs {
                        match by.apply(ctx, &traverser)? {
                            Some(projection) => tuple.push(projection),
                            // Unproductive projection filters the traverser.
                            None => continue 'drain,
                        }
                    }
                    projected.push((tuple, traverser));
                }
                projected.sort_by(|(a, _), (b, _)| compare_tuples(&self.pairs, a, b));
                self.sorted = Some(projected.into_iter().map(|(_, t)| t).collect());
            }
        }
        match self.sorted.as_mut().and_then(VecDeque::pop_front) {
            Some(traverser) => Ok(StepOut::Emit(traverser)),
            None => Ok(StepOut::Done),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sorted = None;
    }

    fn requirements(&self) -> Requirements {
        self.pairs
            .iter()
            .fold(Requirements::default(), |acc, (by, _)| acc.union(by.requirements()))
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.pairs.push((by, Order::Asc));
        Ok(())
    }
}

/// Orders each traverser's own collection value in place.
#[derive(Debug, Clone)]
pub struct OrderLocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    pairs: Vec<(ByMod, Order)>,
}

impl OrderLocalStep {
    pub fn new() -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), pairs: Vec::new() }
    }

    pub fn add_comparator(&mut self, by: ByMod, order: Order) {
        self.pairs.push((by, order));
    }
}

impl Default for OrderLocalStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for OrderLocalStep {
    step_common!("order");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.pairs.is_empty() {
            self.pairs.push((ByMod::Identity, Order::Asc));
        }
        'next: loop {
            let traverser = pull_start!(self, upstream_done);
            let items: Vec<Value> = match traverser.value() {
                Value::List(items) => items.clone(),
                Value::Set(items) => items.iter().cloned().collect(),
                Value::Map(entries) => entries
                    .iter()
                    .map(|(k, v)| {
                        Value::Map([(k.clone(), v.clone())].into_iter().collect())
                    })
                    .collect(),
                // Nothing local to order.
                _ => return Ok(StepOut::Emit(traverser)),
            };
            let mut projected = Vec::with_capacity(items.len());
            for item in items {
                let bound = traverser.split(item.clone(), false);
                let mut tuple = Vec::with_capacity(self.pairs.len());
                for (by, _) in &mut self.pairs {
                    match by.apply(ctx, &bound)? {
                        Some(projection) => tuple.push(projection),
                        None => continue 'next,
                    }
                }
                projected.push((tuple, item));
            }
            if self.pairs.iter().any(|(_, order)| order.is_shuffle()) {
                let mut rng = ctx.rng();
                rng.shuffle(&mut projected);
            } else {
                projected.sort_by(|(a, _), (b, _)| compare_tuples(&self.pairs, a, b));
            }
            let ordered = Value::List(projected.into_iter().map(|(_, v)| v).collect());
            return Ok(StepOut::Emit(traverser.split(ordered, ctx.path_tracking)));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        self.pairs
            .iter()
            .fold(Requirements::default(), |acc, (by, _)| acc.union(by.requirements()))
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.pairs.push((by, Order::Asc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverser::side_effects::new_handle;

    fn drive(step: &mut dyn Step, values: Vec<Value>, ctx: &TraversalContext) -> Vec<Value> {
        for value in values {
            step.add_start(Traverser::new(value, new_handle(), false, None));
        }
        let mut out = Vec::new();
        loop {
            match step.pull(ctx, true).unwrap() {
                StepOut::Emit(t) => out.push(t.value().clone()),
                StepOut::Done => break,
                StepOut::NeedMore => panic!("order asked for more after done"),
            }
        }
        out
    }

    #[test]
    fn global_sort_is_stable_ascending() {
        let ctx = TraversalContext::new(new_handle());
        let mut step = OrderGlobalStep::new();
        let out = drive(
            &mut step,
            vec![Value::Int(3), Value::Int(1), Value::Int(2)],
            &ctx,
        );
        assert_eq!(out, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn shuffle_wins_and_is_seeded() {
        let mut ctx = TraversalContext::new(new_handle());
        ctx.seed = Some(42);
        let values: Vec<Value> = (0..10).map(Value::Int).collect();
        let mut step = OrderGlobalStep::new();
        step.add_comparator(ByMod::Identity, Order::Shuffle);
        step.add_comparator(ByMod::Identity, Order::Asc);
        let first = drive(&mut step, values.clone(), &ctx);
        step.reset();
        let second = drive(&mut step, values.clone(), &ctx);
        assert_eq!(first, second);
        let mut resorted = first.clone();
        resorted.sort_by(|a, b| a.compare(b));
        assert_eq!(resorted, values);
    }

    #[test]
    fn local_sort_orders_each_list() {
        let ctx = TraversalContext::new(new_handle());
        let mut step = OrderLocalStep::new();
        let out = drive(
            &mut step,
            vec![Value::List(vec![Value::Int(2), Value::Int(1)])],
            &ctx,
        );
        assert_eq!(out, vec![Value::List(vec![Value::Int(1), Value::Int(2)])]);
    }
}
