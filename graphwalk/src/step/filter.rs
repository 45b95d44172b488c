// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter steps
//!
//! A filter pulls starts until one passes; failing traversers are dropped,
//! never errored. `has()` goes through `HasContainer` so every has-variant
//! shares one evaluation path, including the documented contract that a
//! literal null argument means `eq(null)` rather than "no predicate".

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::step::base::bound_graph;
use crate::step::{
    pull_start, step_common, ByMod, Requirements, Step, StepMeta, StepOut, TraversalRing,
};
use crate::structure::value::Value;
use crate::traversal::{Traversal, TraversalContext, TraversalError, P};
use crate::traverser::{Pop, Traverser, TraverserSet};

/// User-supplied predicate for `filter(lambda)`.
pub type FilterFn = Arc<dyn Fn(&Traverser) -> bool + Send + Sync>;

/// Binding resolution shared by `where()`: path labels first, then
/// side-effect keys, then map keys of the current value.
pub(crate) fn resolve_binding(
    ctx: &TraversalContext,
    traverser: &Traverser,
    key: &str,
) -> Option<Value> {
    if let Some(bound) = traverser.path().get(Pop::Last, key) {
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

#[derive(Clone)]
pub struct LambdaFilterStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    predicate: FilterFn,
}

impl LambdaFilterStep {
    pub fn new(predicate: FilterFn) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), predicate }
    }
}

impl fmt::Debug for LambdaFilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaFilterStep").field("meta", &self.meta).finish()
    }
}

impl Step for LambdaFilterStep {
    step_common!("filter");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let traverser = pull_start!(self, upstream_done);
            if (self.predicate)(&traverser) {
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// One `has`-family constraint.
#[derive(Debug, Clone)]
pub enum HasContainer {
    /// `has('k')` (None) / `has('k', p)` (Some).
    Key(String, Option<P>),
    /// `hasNot('k')`.
    Absent(String),
    /// `hasId(p)`.
    Id(P),
    /// `hasLabel(p)`.
    Label(P),
    /// `hasKey(p)`: property-entry keys, or any key of an element.
    PropKey(P),
    /// `hasValue(p)`: property-entry values, or any value of an element.
    PropValue(P),
}

impl HasContainer {
    fn property_values(
        ctx: &TraversalContext,
        value: &Value,
        key: Option<&str>,
    ) -> Result<Vec<(String, Value)>, TraversalError> {
        let keys: Vec<String> = key.map(|k| vec![k.to_string()]).unwrap_or_default();
        match value {
            Value::Vertex(v) => Ok(bound_graph(ctx)?.vertex_properties(v.id, &keys)),
            Value::Edge(e) => Ok(bound_graph(ctx)?.edge_properties(e.id, &keys)),
            Value::Map(map) => Ok(map
                .iter()
                .filter_map(|(k, v)| match k {
                    Value::String(k) if key.is_none() || key == Some(k.as_str()) => {
                        Some((k.clone(), v.clone()))
                    }
                    _ => None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub fn test(&self, ctx: &TraversalContext, value: &Value) -> Result<bool, TraversalError> {
        Ok(match self {
            HasContainer::Key(key, predicate) => {
                let entries = Self::property_values(ctx, value, Some(key))?;
                match predicate {
                    None => !entries.is_empty(),
                    Some(p) => entries.iter().any(|(_, v)| p.test(v)),
                }
            }
            HasContainer::Absent(key) => {
                Self::property_values(ctx, value, Some(key))?.is_empty()
            }
            HasContainer::Id(p) => match value.element_id() {
                Some(id) => p.test(&Value::Int(id)),
                None => false,
            },
            HasContainer::Label(p) => match value {
                Value::Vertex(v) => p.test(&Value::String(v.label.clone())),
                Value::Edge(e) => p.test(&Value::String(e.label.clone())),
                _ => false,
            },
            HasContainer::PropKey(p) => match value {
                Value::Property { key, .. } => p.test(&Value::String(key.clone())),
                element => Self::property_values(ctx, element, None)?
                    .iter()
                    .any(|(k, _)| p.test(&Value::String(k.clone()))),
            },
            HasContainer::PropValue(p) => match value {
                Value::Property { value, .. } => p.test(value),
                element => Self::property_values(ctx, element, None)?
                    .iter()
                    .any(|(_, v)| p.test(v)),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct HasStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    containers: Vec<HasContainer>,
}

impl HasStep {
    pub fn new(containers: Vec<HasContainer>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), containers }
    }
}

impl Step for HasStep {
    step_common!("has");

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
            for container in &self.containers {
                if !container.test(ctx, traverser.value())? {
                    continue 'next;
                }
            }
            return Ok(StepOut::Emit(traverser));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { graph: true, ..Requirements::default() }
    }
}

#[derive(Debug, Clone)]
pub struct IsStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    predicate: P,
}

impl IsStep {
    pub fn new(predicate: P) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), predicate }
    }
}

impl Step for IsStep {
    step_common!("is");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let traverser = pull_start!(self, upstream_done);
            if self.predicate.test(traverser.value()) {
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `where('a', p)` / `where(p)`: string operands of the predicate resolve
/// as binding names; unresolvable bindings filter the traverser.
#[derive(Debug, Clone)]
pub struct WherePredicateStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    start_key: Option<String>,
    predicate: P,
}

impl WherePredicateStep {
    pub fn new(start_key: Option<String>, predicate: P) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), start_key, predicate }
    }

    pub fn start_key(&self) -> Option<&str> {
        self.start_key.as_deref()
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }
}

impl Step for WherePredicateStep {
    step_common!("where");

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
            let subject = match &self.start_key {
                Some(key) => match resolve_binding(ctx, &traverser, key) {
                    Some(value) => value,
                    None => continue,
                },
                None => traverser.value().clone(),
            };
            let resolved = self
                .predicate
                .resolve_operands(&|name| resolve_binding(ctx, &traverser, name));
            match resolved {
                Some(predicate) if predicate.test(&subject) => {
                    return Ok(StepOut::Emit(traverser))
                }
                _ => continue,
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }

    fn requirements(&self) -> Requirements {
        Requirements { labeled_path: true, ..Requirements::default() }
    }
}

/// `where(traversal)`: pass when the child emits anything.
#[derive(Debug, Clone)]
pub struct WhereTraversalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    child: Traversal,
}

impl WhereTraversalStep {
    pub fn new(child: Traversal) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), child }
    }
}

impl Step for WhereTraversalStep {
    step_common!("where");

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
            if self.child.test(ctx, &traverser)? {
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.child.reset();
    }

    fn requirements(&self) -> Requirements {
        Requirements { labeled_path: true, ..Requirements::default() }
            .union(self.child.requirements())
    }
}

/// `and(…)`/`or(…)`/`not(…)` connective filters over child traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectiveKind {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
pub struct ConnectiveStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    kind: ConnectiveKind,
    children: Vec<Traversal>,
}

impl ConnectiveStep {
    pub fn new(kind: ConnectiveKind, children: Vec<Traversal>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), kind, children }
    }

    pub fn kind_of(&self) -> ConnectiveKind {
        self.kind
    }

    pub fn children(&self) -> &[Traversal] {
        &self.children
    }

    fn passes(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<bool, TraversalError> {
        match self.kind {
            ConnectiveKind::And => {
                for child in &mut self.children {
                    if !child.test(ctx, traverser)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConnectiveKind::Or => {
                for child in &mut self.children {
                    if child.test(ctx, traverser)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConnectiveKind::Not => {
                for child in &mut self.children {
                    if child.test(ctx, traverser)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

impl Step for ConnectiveStep {
    step_common!("and");

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
            if self.passes(ctx, &traverser)? {
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        for child in &mut self.children {
            child.reset();
        }
    }

    fn requirements(&self) -> Requirements {
        self.children
            .iter()
            .fold(Requirements::default(), |acc, c| acc.union(c.requirements()))
    }
}

/// `dedup()`: global de-duplication on a projected key or on a tuple of
/// path labels. Survivors are emitted with bulk pinned to 1.
#[derive(Debug, Clone)]
pub struct DedupStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    by: Option<ByMod>,
    labels: Vec<String>,
    seen: HashSet<Value>,
}

impl DedupStep {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            by: None,
            labels,
            seen: HashSet::new(),
        }
    }
}

impl Step for DedupStep {
    step_common!("dedup");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        'next: loop {
            let mut traverser = pull_start!(self, upstream_done);
            let key = if self.labels.is_empty() {
                match &mut self.by {
                    Some(by) => match by.apply(ctx, &traverser)? {
                        Some(projected) => projected,
                        None => continue 'next,
                    },
                    None => traverser.value().clone(),
                }
            } else {
                let mut tuple = Vec::with_capacity(self.labels.len());
                for label in &self.labels {
                    match traverser.path().get(Pop::Last, label) {
                        Some(bound) => tuple.push(bound),
                        None => continue 'next,
                    }
                }
                Value::List(tuple)
            };
            if self.seen.insert(key) {
                traverser.set_bulk(1);
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.seen.clear();
    }

    fn requirements(&self) -> Requirements {
        let base = Requirements {
            labeled_path: !self.labels.is_empty(),
            ..Requirements::default()
        };
        match &self.by {
            Some(by) => base.union(by.requirements()),
            None => base,
        }
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.by = Some(by);
        Ok(())
    }
}

/// `dedup(local)`: removes duplicates inside each traverser's collection,
/// preserving first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DedupLocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl DedupLocalStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for DedupLocalStep {
    step_common!("dedup");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let deduped = match traverser.value() {
            Value::List(items) => {
                let mut seen = HashSet::new();
                Value::List(
                    items
                        .iter()
                        .filter(|v| seen.insert((*v).clone()))
                        .cloned()
                        .collect(),
                )
            }
            other => other.clone(),
        };
        Ok(StepOut::Emit(traverser.split(deduped, ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `range(low, high)` and its `limit`/`skip` shorthands. Bulk-aware and
/// exact: a traverser straddling a boundary is split.
#[derive(Debug, Clone)]
pub struct RangeGlobalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    low: u64,
    high: Option<u64>,
    seen: u64,
}

impl RangeGlobalStep {
    pub fn new(low: u64, high: Option<u64>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), low, high, seen: 0 }
    }
}

impl Step for RangeGlobalStep {
    step_common!("range");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if self.high.is_some_and(|high| self.seen >= high) {
                // Short-circuit: nothing past the window matters.
                return Ok(StepOut::Done);
            }
            let mut traverser = pull_start!(self, upstream_done);
            let begin = self.seen;
            let end = begin + traverser.bulk();
            self.seen = end;
            let window_start = begin.max(self.low);
            let window_end = match self.high {
                Some(high) => end.min(high),
                None => end,
            };
            if window_end > window_start {
                traverser.set_bulk(window_end - window_start);
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.seen = 0;
    }
}

/// `range(local, low, high)`: slices each traverser's own list.
#[derive(Debug, Clone)]
pub struct RangeLocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    low: usize,
    high: Option<usize>,
}

impl RangeLocalStep {
    pub fn new(low: usize, high: Option<usize>) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), low, high }
    }
}

impl Step for RangeLocalStep {
    step_common!("range");

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
            match traverser.value() {
                Value::List(items) => {
                    let high = self.high.unwrap_or(items.len()).min(items.len());
                    let low = self.low.min(high);
                    let sliced = Value::List(items[low..high].to_vec());
                    return Ok(StepOut::Emit(traverser.split(sliced, ctx.path_tracking)));
                }
                _ if self.low == 0 => return Ok(StepOut::Emit(traverser)),
                _ => continue,
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `tail(n)`: the last n units of the stream, bulk-exact. A collecting
/// barrier; the buffer coalesces equal traversers before the cut.
#[derive(Debug, Clone)]
pub struct TailGlobalStep {
    meta: StepMeta,
    n: u64,
    buffer: TraverserSet,
    drained: Option<VecDeque<Traverser>>,
}

impl TailGlobalStep {
    pub fn new(n: u64) -> Self {
        Self {
            meta: StepMeta::default(),
            n,
            buffer: TraverserSet::new(),
            drained: None,
        }
    }
}

impl Step for TailGlobalStep {
    step_common!("tail");

    fn add_start(&mut self, traverser: Traverser) {
        self.buffer.add(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.drained.is_none() {
            let mut arrived: Vec<Traverser> = Vec::with_capacity(self.buffer.len());
            while let Some(traverser) = self.buffer.pop() {
                arrived.push(traverser);
            }
            let mut kept: Vec<Traverser> = Vec::new();
            let mut remaining = self.n;
            for mut traverser in arrived.into_iter().rev() {
                if remaining == 0 {
                    break;
                }
                let taken = traverser.bulk().min(remaining);
                traverser.set_bulk(taken);
                remaining -= taken;
                kept.push(traverser);
            }
            kept.reverse();
            self.drained = Some(kept.into());
        }
        match self.drained.as_mut().and_then(VecDeque::pop_front) {
            Some(traverser) => Ok(StepOut::Emit(traverser)),
            None => Ok(StepOut::Done),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.drained = None;
    }
}

/// `tail(local, n)`.
#[derive(Debug, Clone)]
pub struct TailLocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    n: usize,
}

impl TailLocalStep {
    pub fn new(n: usize) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), n }
    }
}

impl Step for TailLocalStep {
    step_common!("tail");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let tailed = match traverser.value() {
            Value::List(items) => {
                let skip = items.len().saturating_sub(self.n);
                Value::List(items[skip..].to_vec())
            }
            other => other.clone(),
        };
        Ok(StepOut::Emit(traverser.split(tailed, ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
    }
}

/// `coin(p)`: keep each traverser with probability p.
#[derive(Debug, Clone)]
pub struct CoinStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    probability: f64,
    rng: Option<fastrand::Rng>,
}

impl CoinStep {
    pub fn new(probability: f64) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            probability,
            rng: None,
        }
    }
}

impl Step for CoinStep {
    step_common!("coin");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let rng = self.rng.get_or_insert_with(|| ctx.rng());
        loop {
            let traverser = match self.starts.pop_front() {
                Some(t) => t,
                None => {
                    return Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
                }
            };
            if rng.f64() < self.probability {
                return Ok(StepOut::Emit(traverser));
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.rng = None;
    }
}

/// `sample(n)`: a collecting barrier that picks n units weighted by bulk,
/// without replacement, deterministically under a seed.
#[derive(Debug, Clone)]
pub struct SampleStep {
    meta: StepMeta,
    amount: u64,
    buffer: TraverserSet,
    drained: Option<VecDeque<Traverser>>,
}

impl SampleStep {
    pub fn new(amount: u64) -> Self {
        Self {
            meta: StepMeta::default(),
            amount,
            buffer: TraverserSet::new(),
            drained: None,
        }
    }
}

impl Step for SampleStep {
    step_common!("sample");

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
        if self.drained.is_none() {
            let mut arrived: Vec<Traverser> = Vec::with_capacity(self.buffer.len());
            while let Some(traverser) = self.buffer.pop() {
                arrived.push(traverser);
            }
            let mut rng = ctx.rng();
            let mut remaining: Vec<u64> = arrived.iter().map(Traverser::bulk).collect();
            let mut selected = vec![0u64; arrived.len()];
            let mut total: u64 = remaining.iter().sum();
            let mut picks = self.amount.min(total);
            while picks > 0 {
                let mut roll = rng.u64(0..total);
                for (index, weight) in remaining.iter_mut().enumerate() {
                    if roll < *weight {
                        *weight -= 1;
                        selected[index] += 1;
                        break;
                    }
                    roll -= *weight;
                }
                total -= 1;
                picks -= 1;
            }
            let mut kept = VecDeque::new();
            for (mut traverser, count) in arrived.into_iter().zip(selected) {
                if count > 0 {
                    traverser.set_bulk(count);
                    kept.push_back(traverser);
                }
            }
            self.drained = Some(kept);
        }
        match self.drained.as_mut().and_then(VecDeque::pop_front) {
            Some(traverser) => Ok(StepOut::Emit(traverser)),
            None => Ok(StepOut::Done),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.drained = None;
    }
}

/// `sample(local, n)`: random subset of each traverser's list.
#[derive(Debug, Clone)]
pub struct SampleLocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    amount: usize,
    rng: Option<fastrand::Rng>,
}

impl SampleLocalStep {
    pub fn new(amount: usize) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), amount, rng: None }
    }
}

impl Step for SampleLocalStep {
    step_common!("sample");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let traverser = pull_start!(self, upstream_done);
        let rng = self.rng.get_or_insert_with(|| ctx.rng());
        let sampled = match traverser.value() {
            Value::List(items) => {
                let mut items = items.clone();
                rng.shuffle(&mut items);
                items.truncate(self.amount);
                Value::List(items)
            }
            other => other.clone(),
        };
        Ok(StepOut::Emit(traverser.split(sampled, ctx.path_tracking)))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.rng = None;
    }
}

/// `simplePath()` / `cyclicPath()`, with optional `by()` projection of
/// every path object before the duplicate check.
#[derive(Debug, Clone)]
pub struct PathFilterStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    want_simple: bool,
    ring: TraversalRing,
}

impl PathFilterStep {
    pub fn simple() -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            want_simple: true,
            ring: TraversalRing::default(),
        }
    }

    pub fn cyclic() -> Self {
        Self { want_simple: false, ..Self::simple() }
    }
}

impl Step for PathFilterStep {
    step_common!("simplePath");

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
            let simple = if self.ring.is_empty() {
                traverser.path().is_simple()
            } else {
                let mut projected = Vec::with_capacity(traverser.path().len());
                for object in traverser.path().objects().to_vec() {
                    let bound = traverser.split(object, false);
                    match self.ring.next().apply(ctx, &bound)? {
                        Some(value) => projected.push(value),
                        None => {
                            self.ring.rewind();
                            continue 'next;
                        }
                    }
                }
                self.ring.rewind();
                let mut seen = HashSet::new();
                projected.iter().all(|v| seen.insert(v.clone()))
            };
            if simple == self.want_simple {
                return Ok(StepOut::Emit(traverser));
            }
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

/// `timeLimit(ms)`: the one built-in deadline; checked once per pull and
/// cuts the stream short without error.
#[derive(Debug, Clone)]
pub struct TimeLimitStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    limit: Duration,
    deadline: Option<Instant>,
}

impl TimeLimitStep {
    pub fn new(limit: Duration) -> Self {
        Self { meta: StepMeta::default(), starts: VecDeque::new(), limit, deadline: None }
    }
}

impl Step for TimeLimitStep {
    step_common!("timeLimit");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        let deadline = *self.deadline.get_or_insert_with(|| Instant::now() + self.limit);
        if Instant::now() >= deadline {
            log::debug!("time limit of {:?} reached, cutting stream", self.limit);
            return Ok(StepOut::Done);
        }
        Ok(StepOut::Emit(pull_start!(self, upstream_done)))
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.deadline = None;
    }
}

/// `drop()`: removes the current element from the graph and filters
/// everything (nothing flows downstream).
#[derive(Debug, Clone, Default)]
pub struct DropStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
}

impl DropStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for DropStep {
    step_common!("drop");

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
            let graph = bound_graph(ctx)?;
            match traverser.value() {
                Value::Vertex(v) => graph.remove_vertex(v.id)?,
                Value::Edge(e) => graph.remove_edge(e.id)?,
                other => {
                    return Err(TraversalError::IllegalState(format!(
                        "drop() supports graph elements only, found {}",
                        other.kind_name()
                    )))
                }
            }
        }
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
    use crate::traverser::side_effects::new_handle;

    fn drive(step: &mut dyn Step, inputs: Vec<(Value, u64)>) -> Vec<(Value, u64)> {
        let ctx = TraversalContext::new(new_handle());
        for (value, bulk) in inputs {
            let mut t = Traverser::new(value, new_handle(), false, None);
            t.set_bulk(bulk);
            step.add_start(t);
        }
        let mut out = Vec::new();
        loop {
            match step.pull(&ctx, true).unwrap() {
                StepOut::Emit(t) => out.push((t.value().clone(), t.bulk())),
                StepOut::Done => break,
                StepOut::NeedMore => panic!("filter asked for more after done"),
            }
        }
        out
    }

    #[test]
    fn range_is_bulk_exact_and_short_circuits() {
        let mut step = RangeGlobalStep::new(0, Some(3));
        let out = drive(&mut step, vec![(Value::Int(7), 5), (Value::Int(8), 1)]);
        assert_eq!(out, vec![(Value::Int(7), 3)]);
    }

    #[test]
    fn skip_drops_leading_bulk() {
        let mut step = RangeGlobalStep::new(2, None);
        let out = drive(&mut step, vec![(Value::Int(7), 5)]);
        assert_eq!(out, vec![(Value::Int(7), 3)]);
    }

    #[test]
    fn tail_keeps_trailing_units() {
        let mut step = TailGlobalStep::new(2);
        let out = drive(
            &mut step,
            vec![(Value::Int(1), 1), (Value::Int(2), 3)],
        );
        assert_eq!(out, vec![(Value::Int(2), 2)]);
    }

    #[test]
    fn tail_barrier_coalesces_equal_arrivals() {
        let mut step = TailGlobalStep::new(10);
        let out = drive(
            &mut step,
            vec![(Value::Int(1), 1), (Value::Int(1), 1), (Value::Int(2), 1)],
        );
        // The two equal traversers merge in the barrier buffer.
        assert_eq!(out, vec![(Value::Int(1), 2), (Value::Int(2), 1)]);
    }

    #[test]
    fn dedup_pins_bulk_to_one() {
        let mut step = DedupStep::new(Vec::new());
        let out = drive(
            &mut step,
            vec![(Value::Int(1), 4), (Value::Int(1), 2), (Value::Int(2), 1)],
        );
        assert_eq!(out, vec![(Value::Int(1), 1), (Value::Int(2), 1)]);
    }

    #[test]
    fn null_literal_is_a_real_has_predicate() {
        let ctx = TraversalContext::new(new_handle());
        let container = HasContainer::Label(P::Eq(Value::Null));
        let vertex = Value::Vertex(crate::structure::element::Vertex {
            id: 1,
            label: "person".to_string(),
        });
        assert!(!container.test(&ctx, &vertex).unwrap());
    }
}
