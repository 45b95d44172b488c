// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Grouping
//!
//! `group()` partitions the stream into key → aggregate. When the value
//! traversal ends in an incremental reducer the fold happens per arrival
//! (no per-key buffering); otherwise arrivals are buffered per key and the
//! value traversal runs once over each bucket at the end. The side-effect
//! forms (`group("x")`, `groupCount("x")`, `tree("x")`) pass traversers
//! through unchanged and publish the final aggregate into the side-effect
//! registry on upstream exhaustion.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::step::reduce::{Accumulator, Reduction};
use crate::step::{step_common, ByMod, Requirements, Step, StepMeta, StepOut, TraversalRing};
use crate::structure::value::Value;
use crate::traversal::{TraversalContext, TraversalError};
use crate::traverser::Traverser;

#[derive(Debug, Clone)]
enum ValuePlan {
    /// Value traversal ends in a reducer: stream through its prefix and
    /// fold per arrival.
    Stream { prefix: crate::traversal::Traversal, reduction: Reduction },
    /// Buffer arrivals per key; run the modulator over each bucket at the
    /// end.
    Buffer(ByMod),
}

#[derive(Debug, Clone)]
enum Bucket {
    Acc(Accumulator),
    Items(Vec<Traverser>),
}

#[derive(Debug, Clone)]
pub struct GroupStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    key: Option<ByMod>,
    value: Option<ByMod>,
    plan: Option<ValuePlan>,
    buckets: HashMap<Value, Bucket>,
    side_effect_key: Option<String>,
    finalized: bool,
}

impl GroupStep {
    pub fn new(side_effect_key: Option<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            key: None,
            value: None,
            plan: None,
            buckets: HashMap::new(),
            side_effect_key,
            finalized: false,
        }
    }

    fn plan(&mut self) -> ValuePlan {
        if let Some(plan) = &self.plan {
            return plan.clone();
        }
        let plan = match self.value.take() {
            Some(ByMod::Traversal(child)) => {
                let reduction = child.steps().last().and_then(|s| s.reducer());
                match reduction {
                    Some(reduction) => {
                        let mut prefix = child;
                        prefix.steps_mut().pop();
                        log::debug!("group streaming through terminal {:?}", reduction);
                        ValuePlan::Stream {
                            prefix: crate::traversal::Traversal::with_steps(
                                std::mem::take(prefix.steps_mut()),
                            ),
                            reduction,
                        }
                    }
                    None => ValuePlan::Buffer(ByMod::Traversal(child)),
                }
            }
            Some(by) => ValuePlan::Buffer(by),
            None => ValuePlan::Buffer(ByMod::Identity),
        };
        self.plan = Some(plan.clone());
        plan
    }

    fn absorb(
        &mut self,
        ctx: &TraversalContext,
        traverser: Traverser,
    ) -> Result<(), TraversalError> {
        let mut key_mod = self.key.clone().unwrap_or(ByMod::Identity);
        let Some(key) = key_mod.apply(ctx, &traverser)? else {
            // Unproductive key projection: silently dropped.
            return Ok(());
        };
        self.key = Some(key_mod);
        match self.plan() {
            ValuePlan::Stream { mut prefix, reduction } => {
                let results = prefix.flat(ctx, &traverser)?;
                let bucket = self
                    .buckets
                    .entry(key)
                    .or_insert_with(|| Bucket::Acc(Accumulator::new(reduction.clone())));
                if let Bucket::Acc(acc) = bucket {
                    for result in results {
                        acc.add(result.value().clone(), result.bulk())?;
                    }
                }
            }
            ValuePlan::Buffer(_) => {
                let bucket =
                    self.buckets.entry(key).or_insert_with(|| Bucket::Items(Vec::new()));
                if let Bucket::Items(items) = bucket {
                    items.push(traverser);
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &TraversalContext) -> Result<Value, TraversalError> {
        let plan = self.plan();
        let mut map = BTreeMap::new();
        for (key, bucket) in std::mem::take(&mut self.buckets) {
            match bucket {
                Bucket::Acc(acc) => {
                    if let Some(value) = acc.finalize() {
                        map.insert(key, value);
                    }
                }
                Bucket::Items(items) => {
                    let mut folded = Accumulator::new(Reduction::Fold);
                    match &plan {
                        ValuePlan::Buffer(ByMod::Traversal(child)) => {
                            let mut child = child.clone();
                            for item in items {
                                for result in child.flat(ctx, &item)? {
                                    folded.add(result.value().clone(), result.bulk())?;
                                }
                            }
                        }
                        ValuePlan::Buffer(by) => {
                            let mut by = by.clone();
                            for item in items {
                                if let Some(value) = by.apply(ctx, &item)? {
                                    folded.add(value, item.bulk())?;
                                }
                            }
                        }
                        ValuePlan::Stream { .. } => {}
                    }
                    if let Some(value) = folded.finalize() {
                        map.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::Map(map))
    }
}

impl Step for GroupStep {
    step_common!("group");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.side_effect_key.is_some() {
            // Pass-through side-effect form.
            if let Some(traverser) = self.starts.pop_front() {
                self.absorb(ctx, traverser.fork())?;
                return Ok(StepOut::Emit(traverser));
            }
            if !upstream_done {
                return Ok(StepOut::NeedMore);
            }
            if !self.finalized {
                self.finalized = true;
                let map = self.finalize(ctx)?;
                if let Some(key) = &self.side_effect_key {
                    ctx.side_effects.write().set(key, map);
                }
            }
            return Ok(StepOut::Done);
        }
        while let Some(traverser) = self.starts.pop_front() {
            self.absorb(ctx, traverser)?;
        }
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.finalized {
            return Ok(StepOut::Done);
        }
        self.finalized = true;
        let map = self.finalize(ctx)?;
        Ok(StepOut::Emit(Traverser::new(
            map,
            ctx.side_effects.clone(),
            ctx.path_tracking,
            ctx.initial_sack.clone(),
        )))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buckets.clear();
        self.finalized = false;
    }

    fn requirements(&self) -> Requirements {
        let mut reqs = Requirements {
            side_effects: self.side_effect_key.is_some(),
            ..Requirements::default()
        };
        if let Some(by) = &self.key {
            reqs = reqs.union(by.requirements());
        }
        if let Some(by) = &self.value {
            reqs = reqs.union(by.requirements());
        }
        reqs
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        if self.key.is_none() {
            self.key = Some(by);
        } else if self.value.is_none() && self.plan.is_none() {
            self.value = Some(by);
        } else {
            return Err(TraversalError::IllegalConstruction(
                "group() accepts at most two by() modulators".to_string(),
            ));
        }
        Ok(())
    }
}

/// `groupCount()`: identity value projection with a bulk-weighted counter.
#[derive(Debug, Clone)]
pub struct GroupCountStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    key: Option<ByMod>,
    counts: HashMap<Value, i64>,
    side_effect_key: Option<String>,
    finalized: bool,
}

impl GroupCountStep {
    pub fn new(side_effect_key: Option<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            key: None,
            counts: HashMap::new(),
            side_effect_key,
            finalized: false,
        }
    }

    fn absorb(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<(), TraversalError> {
        let mut key_mod = self.key.clone().unwrap_or(ByMod::Identity);
        if let Some(key) = key_mod.apply(ctx, traverser)? {
            *self.counts.entry(key).or_insert(0) += traverser.bulk() as i64;
        }
        self.key = Some(key_mod);
        Ok(())
    }

    fn snapshot(&mut self) -> Value {
        Value::Map(
            std::mem::take(&mut self.counts)
                .into_iter()
                .map(|(k, c)| (k, Value::Int(c)))
                .collect(),
        )
    }
}

impl Step for GroupCountStep {
    step_common!("groupCount");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.side_effect_key.is_some() {
            if let Some(traverser) = self.starts.pop_front() {
                self.absorb(ctx, &traverser)?;
                return Ok(StepOut::Emit(traverser));
            }
            if !upstream_done {
                return Ok(StepOut::NeedMore);
            }
            if !self.finalized {
                self.finalized = true;
                let map = self.snapshot();
                if let Some(key) = &self.side_effect_key {
                    ctx.side_effects.write().set(key, map);
                }
            }
            return Ok(StepOut::Done);
        }
        while let Some(traverser) = self.starts.pop_front() {
            self.absorb(ctx, &traverser)?;
        }
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.finalized {
            return Ok(StepOut::Done);
        }
        self.finalized = true;
        let map = self.snapshot();
        Ok(StepOut::Emit(Traverser::new(
            map,
            ctx.side_effects.clone(),
            ctx.path_tracking,
            ctx.initial_sack.clone(),
        )))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.counts.clear();
        self.finalized = false;
    }

    fn requirements(&self) -> Requirements {
        match &self.key {
            Some(by) => by.requirements(),
            None => Requirements::default(),
        }
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        if self.key.is_some() {
            return Err(TraversalError::IllegalConstruction(
                "groupCount() accepts one by() modulator".to_string(),
            ));
        }
        self.key = Some(by);
        Ok(())
    }
}

fn insert_branch(node: &mut BTreeMap<Value, Value>, objects: &[Value]) {
    let Some((first, rest)) = objects.split_first() else {
        return;
    };
    let child = node
        .entry(first.clone())
        .or_insert_with(|| Value::Map(BTreeMap::new()));
    if let Value::Map(map) = child {
        insert_branch(map, rest);
    }
}

/// `tree()`: nests every traverser's path into one root map.
#[derive(Debug, Clone)]
pub struct TreeStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    ring: TraversalRing,
    root: BTreeMap<Value, Value>,
    side_effect_key: Option<String>,
    finalized: bool,
}

impl TreeStep {
    pub fn new(side_effect_key: Option<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            ring: TraversalRing::default(),
            root: BTreeMap::new(),
            side_effect_key,
            finalized: false,
        }
    }

    fn absorb(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<(), TraversalError> {
        let mut branch = Vec::with_capacity(traverser.path().len());
        for object in traverser.path().objects().to_vec() {
            let bound = traverser.split(object, false);
            match self.ring.next().apply(ctx, &bound)? {
                Some(projected) => branch.push(projected),
                None => {
                    self.ring.rewind();
                    return Ok(());
                }
            }
        }
        self.ring.rewind();
        insert_branch(&mut self.root, &branch);
        Ok(())
    }
}

impl Step for TreeStep {
    step_common!("tree");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.side_effect_key.is_some() {
            if let Some(traverser) = self.starts.pop_front() {
                self.absorb(ctx, &traverser)?;
                return Ok(StepOut::Emit(traverser));
            }
            if !upstream_done {
                return Ok(StepOut::NeedMore);
            }
            if !self.finalized {
                self.finalized = true;
                let tree = Value::Map(std::mem::take(&mut self.root));
                if let Some(key) = &self.side_effect_key {
                    ctx.side_effects.write().set(key, tree);
                }
            }
            return Ok(StepOut::Done);
        }
        while let Some(traverser) = self.starts.pop_front() {
            self.absorb(ctx, &traverser)?;
        }
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.finalized {
            return Ok(StepOut::Done);
        }
        self.finalized = true;
        let tree = Value::Map(std::mem::take(&mut self.root));
        Ok(StepOut::Emit(Traverser::new(
            tree,
            ctx.side_effects.clone(),
            ctx.path_tracking,
            ctx.initial_sack.clone(),
        )))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.root.clear();
        self.ring.rewind();
        self.finalized = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements { path: true, ..Requirements::default() }.union(self.ring.requirements())
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
    fn group_count_weighs_by_bulk() {
        let ctx = TraversalContext::new(new_handle());
        let mut step = GroupCountStep::new(None);
        let mut bulked = Traverser::new(Value::Int(7), new_handle(), false, None);
        bulked.set_bulk(5);
        step.add_start(bulked);
        step.add_start(Traverser::new(Value::Int(8), new_handle(), false, None));
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => {
                let Value::Map(map) = t.value() else { panic!("expected map") };
                assert_eq!(map.get(&Value::Int(7)), Some(&Value::Int(5)));
                assert_eq!(map.get(&Value::Int(8)), Some(&Value::Int(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn group_defaults_to_list_values() {
        let ctx = TraversalContext::new(new_handle());
        let mut step = GroupStep::new(None);
        step.add_start(Traverser::new(Value::Int(1), new_handle(), false, None));
        step.add_start(Traverser::new(Value::Int(1), new_handle(), false, None));
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => {
                let Value::Map(map) = t.value() else { panic!("expected map") };
                assert_eq!(
                    map.get(&Value::Int(1)),
                    Some(&Value::List(vec![Value::Int(1), Value::Int(1)]))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
