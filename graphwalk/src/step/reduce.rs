// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Reducing barriers
//!
//! One running aggregate, folded incrementally as traversers arrive, and
//! emitted exactly once after upstream exhaustion. The accumulator starts
//! in a non-emitting state: reductions without a natural seed (sum, min,
//! max, mean) emit nothing on an empty stream, while count and fold have
//! real seeds (0, empty list). An all-null input stream reduces to null
//! rather than dividing by zero or fabricating a zero seed.

use std::collections::VecDeque;

use crate::step::{pull_start, Requirements, Step, StepMeta, StepOut};
use crate::structure::value::Value;
use crate::traversal::{Operator, Scope, TraversalContext, TraversalError};
use crate::traverser::Traverser;

/// The reduction kinds the engine knows how to fold incrementally.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    Count,
    Sum,
    Min,
    Max,
    Mean,
    /// Fold the stream into a list.
    Fold,
    /// `fold(seed, operator)`.
    FoldWith { seed: Value, op: Operator },
}

#[derive(Debug, Clone)]
enum AccState {
    /// Nothing folded yet (non-emitting sentinel).
    Empty,
    /// Inputs were seen, every one of them null.
    AllNull,
    Running(Value),
    Mean { sum: f64, count: u64 },
    Items(Vec<Value>),
    Count(u64),
}

/// A resumable aggregate shared by the global reduce step and the group
/// step's streaming path. `merge` combines two partial aggregates, which
/// is what a combine/parallel execution would call.
#[derive(Debug, Clone)]
pub struct Accumulator {
    reduction: Reduction,
    state: AccState,
}

fn weighted(value: Value, bulk: u64) -> Result<Value, TraversalError> {
    if bulk == 1 {
        Ok(value)
    } else {
        Operator::Mult.apply(value, Value::Int(bulk as i64))
    }
}

impl Accumulator {
    pub fn new(reduction: Reduction) -> Self {
        let state = match &reduction {
            Reduction::Count => AccState::Count(0),
            Reduction::Fold => AccState::Items(Vec::new()),
            Reduction::FoldWith { seed, .. } => AccState::Running(seed.clone()),
            _ => AccState::Empty,
        };
        Self { reduction, state }
    }

    pub fn add(&mut self, value: Value, bulk: u64) -> Result<(), TraversalError> {
        match (&self.reduction, &mut self.state) {
            (Reduction::Count, AccState::Count(count)) => *count += bulk,
            (Reduction::Fold, AccState::Items(items)) => {
                for _ in 0..bulk {
                    items.push(value.clone());
                }
            }
            (Reduction::FoldWith { op, .. }, AccState::Running(acc)) => {
                let op = *op;
                let mut current = std::mem::replace(acc, Value::Null);
                for _ in 0..bulk {
                    current = op.apply(current, value.clone())?;
                }
                *acc = current;
            }
            (Reduction::Sum, state) => fold_numeric(state, value, bulk, Operator::Sum)?,
            (Reduction::Min, state) => fold_order(state, value, Operator::Min)?,
            (Reduction::Max, state) => fold_order(state, value, Operator::Max)?,
            (Reduction::Mean, state) => {
                if value.is_null() {
                    if matches!(state, AccState::Empty) {
                        *state = AccState::AllNull;
                    }
                    return Ok(());
                }
                let x = value.as_f64().ok_or_else(|| {
                    TraversalError::IllegalState(format!(
                        "mean() requires numeric input, found {}",
                        value.kind_name()
                    ))
                })?;
                match state {
                    AccState::Mean { sum, count } => {
                        *sum += x * bulk as f64;
                        *count += bulk;
                    }
                    _ => {
                        *state = AccState::Mean { sum: x * bulk as f64, count: bulk };
                    }
                }
            }
            _ => {
                return Err(TraversalError::IllegalState(
                    "reduce accumulator in inconsistent state".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Fold another partial aggregate of the same reduction into this one.
    pub fn merge(&mut self, other: Accumulator) -> Result<(), TraversalError> {
        match (&mut self.state, other.state) {
            (AccState::Count(a), AccState::Count(b)) => *a += b,
            (AccState::Items(a), AccState::Items(b)) => a.extend(b),
            (AccState::Mean { sum, count }, AccState::Mean { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            (_, AccState::Empty) => {}
            (state @ AccState::Empty, incoming) | (state @ AccState::AllNull, incoming) => {
                *state = incoming;
            }
            (AccState::Running(a), AccState::Running(b)) => {
                let op = match &self.reduction {
                    Reduction::Sum => Operator::Sum,
                    Reduction::Min => Operator::Min,
                    Reduction::Max => Operator::Max,
                    Reduction::FoldWith { op, .. } => *op,
                    _ => {
                        return Err(TraversalError::IllegalState(
                            "cannot merge this reduction".to_string(),
                        ))
                    }
                };
                let current = std::mem::replace(a, Value::Null);
                *a = op.apply(current, b)?;
            }
            _ => {
                return Err(TraversalError::IllegalState(
                    "cannot merge mismatched partial aggregates".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// The final aggregate, or `None` for a seedless reduction over an
    /// empty stream.
    pub fn finalize(self) -> Option<Value> {
        match self.state {
            AccState::Empty => None,
            AccState::AllNull => Some(Value::Null),
            AccState::Running(value) => Some(value),
            AccState::Mean { sum, count } => Some(Value::Float(sum / count as f64)),
            AccState::Items(items) => Some(Value::List(items)),
            AccState::Count(count) => Some(Value::Int(count as i64)),
        }
    }
}

fn fold_numeric(
    state: &mut AccState,
    value: Value,
    bulk: u64,
    op: Operator,
) -> Result<(), TraversalError> {
    if value.is_null() {
        if matches!(state, AccState::Empty) {
            *state = AccState::AllNull;
        }
        return Ok(());
    }
    let contribution = weighted(value, bulk)?;
    match state {
        AccState::Running(acc) => {
            let current = std::mem::replace(acc, Value::Null);
            *acc = op.apply(current, contribution)?;
        }
        _ => *state = AccState::Running(contribution),
    }
    Ok(())
}

fn fold_order(state: &mut AccState, value: Value, op: Operator) -> Result<(), TraversalError> {
    if value.is_null() {
        if matches!(state, AccState::Empty) {
            *state = AccState::AllNull;
        }
        return Ok(());
    }
    match state {
        AccState::Running(acc) => {
            let current = std::mem::replace(acc, Value::Null);
            *acc = op.apply(current, value)?;
        }
        _ => *state = AccState::Running(value),
    }
    Ok(())
}

/// `count`/`sum`/`min`/`max`/`mean`/`fold`, global or per-traverser local.
#[derive(Debug, Clone)]
pub struct ReduceStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    reduction: Reduction,
    scope: Scope,
    acc: Accumulator,
    emitted: bool,
}

impl ReduceStep {
    pub fn new(reduction: Reduction, scope: Scope) -> Self {
        let acc = Accumulator::new(reduction.clone());
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            reduction,
            scope,
            acc,
            emitted: false,
        }
    }

    fn local_items(value: &Value) -> Vec<Value> {
        match value {
            Value::List(items) => items.clone(),
            Value::Set(items) => items.iter().cloned().collect(),
            Value::Map(entries) => entries.values().cloned().collect(),
            single => vec![single.clone()],
        }
    }
}

impl Reduction {
    /// The step kind this reduction answers to in bytecode and explain
    /// output.
    pub fn kind(&self) -> &'static str {
        match self {
            Reduction::Count => "count",
            Reduction::Sum => "sum",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Mean => "mean",
            Reduction::Fold | Reduction::FoldWith { .. } => "fold",
        }
    }
}

// Boilerplate is written out here instead of `step_common!` so `kind()`
// can follow the reduction.
impl Step for ReduceStep {
    fn kind(&self) -> &'static str {
        self.reduction.kind()
    }

    fn id(&self) -> &str {
        &self.meta.id
    }

    fn set_id(&mut self, id: String) {
        self.meta.id = id;
    }

    fn labels(&self) -> &std::collections::BTreeSet<String> {
        &self.meta.labels
    }

    fn add_label(&mut self, label: &str) {
        self.meta.labels.insert(label.to_string());
    }

    fn remove_label(&mut self, label: &str) {
        self.meta.labels.remove(label);
    }

    fn clone_box(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.scope == Scope::Local {
            loop {
                let traverser = pull_start!(self, upstream_done);
                let mut acc = Accumulator::new(self.reduction.clone());
                for item in Self::local_items(traverser.value()) {
                    acc.add(item, 1)?;
                }
                if let Some(result) = acc.finalize() {
                    return Ok(StepOut::Emit(traverser.split(result, ctx.path_tracking)));
                }
            }
        }
        while let Some(traverser) = self.starts.pop_front() {
            self.acc.add(traverser.value().clone(), traverser.bulk())?;
        }
        if !upstream_done {
            return Ok(StepOut::NeedMore);
        }
        if self.emitted {
            return Ok(StepOut::Done);
        }
        self.emitted = true;
        match self.acc.clone().finalize() {
            Some(result) => Ok(StepOut::Emit(Traverser::new(
                result,
                ctx.side_effects.clone(),
                ctx.path_tracking,
                ctx.initial_sack.clone(),
            ))),
            None => Ok(StepOut::Done),
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.acc = Accumulator::new(self.reduction.clone());
        self.emitted = false;
    }

    fn requirements(&self) -> Requirements {
        Requirements::default()
    }

    fn reducer(&self) -> Option<Reduction> {
        if self.scope == Scope::Global {
            Some(self.reduction.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverser::side_effects::new_handle;

    fn drive(step: &mut ReduceStep, inputs: Vec<(Value, u64)>) -> Vec<Value> {
        let ctx = TraversalContext::new(new_handle());
        for (value, bulk) in inputs {
            let mut t = Traverser::new(value, new_handle(), false, None);
            t.set_bulk(bulk);
            step.add_start(t);
        }
        let mut out = Vec::new();
        loop {
            match step.pull(&ctx, true).unwrap() {
                StepOut::Emit(t) => out.push(t.value().clone()),
                StepOut::Done => break,
                StepOut::NeedMore => panic!("reduce asked for more after done"),
            }
        }
        out
    }

    #[test]
    fn count_respects_bulk() {
        let mut step = ReduceStep::new(Reduction::Count, Scope::Global);
        let out = drive(&mut step, vec![(Value::Int(7), 5), (Value::Int(8), 1)]);
        assert_eq!(out, vec![Value::Int(6)]);
    }

    #[test]
    fn count_of_empty_stream_is_zero() {
        let mut step = ReduceStep::new(Reduction::Count, Scope::Global);
        assert_eq!(drive(&mut step, vec![]), vec![Value::Int(0)]);
    }

    #[test]
    fn sum_of_empty_stream_emits_nothing() {
        let mut step = ReduceStep::new(Reduction::Sum, Scope::Global);
        assert!(drive(&mut step, vec![]).is_empty());
    }

    #[test]
    fn all_null_stream_reduces_to_null() {
        let mut step = ReduceStep::new(Reduction::Mean, Scope::Global);
        let out = drive(&mut step, vec![(Value::Null, 1), (Value::Null, 2)]);
        assert_eq!(out, vec![Value::Null]);

        let mut step = ReduceStep::new(Reduction::Sum, Scope::Global);
        let out = drive(&mut step, vec![(Value::Null, 1)]);
        assert_eq!(out, vec![Value::Null]);
    }

    #[test]
    fn mean_weights_by_bulk() {
        let mut step = ReduceStep::new(Reduction::Mean, Scope::Global);
        let out = drive(&mut step, vec![(Value::Int(1), 3), (Value::Int(5), 1)]);
        assert_eq!(out, vec![Value::Float(2.0)]);
    }

    #[test]
    fn fold_with_seed_and_operator() {
        let mut step = ReduceStep::new(
            Reduction::FoldWith { seed: Value::Int(1), op: Operator::Mult },
            Scope::Global,
        );
        let out = drive(&mut step, vec![(Value::Int(2), 1), (Value::Int(3), 1)]);
        assert_eq!(out, vec![Value::Int(6)]);
    }

    #[test]
    fn local_count_over_collections() {
        let mut step = ReduceStep::new(Reduction::Count, Scope::Local);
        let out = drive(
            &mut step,
            vec![(Value::List(vec![Value::Int(1), Value::Int(2)]), 1)],
        );
        assert_eq!(out, vec![Value::Int(2)]);
    }

    #[test]
    fn kind_names_follow_the_reduction() {
        assert_eq!(ReduceStep::new(Reduction::Count, Scope::Global).kind(), "count");
        assert_eq!(ReduceStep::new(Reduction::Sum, Scope::Global).kind(), "sum");
        assert_eq!(ReduceStep::new(Reduction::Mean, Scope::Local).kind(), "mean");
        assert_eq!(
            ReduceStep::new(
                Reduction::FoldWith { seed: Value::Int(0), op: Operator::Sum },
                Scope::Global
            )
            .kind(),
            "fold"
        );
    }

    #[test]
    fn partial_aggregates_merge() {
        let mut a = Accumulator::new(Reduction::Sum);
        a.add(Value::Int(3), 1).unwrap();
        let mut b = Accumulator::new(Reduction::Sum);
        b.add(Value::Int(4), 2).unwrap();
        a.merge(b).unwrap();
        assert_eq!(a.finalize(), Some(Value::Int(11)));
    }
}
