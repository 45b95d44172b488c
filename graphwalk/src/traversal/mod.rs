// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Traversal evaluation
//!
//! A traversal is an ordered chain of steps evaluated lazily: each call to
//! [`Traversal::next_traverser`] pulls at most one traverser through the
//! whole chain. Steps never hold references to their neighbours; the chain
//! is driven externally, recursing over `split_last_mut` so every step only
//! sees its own buffers plus an `upstream_done` flag.

pub mod bytecode;
pub mod operator;
pub mod order;
pub mod predicate;
pub mod scope;

use std::sync::Arc;

use thiserror::Error;

use crate::step::{Step, StepOut};
use crate::structure::graph::{Graph, StructureError};
use crate::structure::value::Value;
use crate::traverser::side_effects::SideEffectsHandle;
use crate::traverser::Traverser;

pub use bytecode::Bytecode;
pub use operator::Operator;
pub use order::Order;
pub use predicate::{RegexPattern, TextP, P};
pub use scope::{Pick, Scope};

#[derive(Debug, Error)]
pub enum TraversalError {
    /// The traversal was assembled from an invalid step combination. Raised
    /// at build time and surfaced by the first terminal call.
    #[error("illegal traversal construction: {0}")]
    IllegalConstruction(String),

    /// A step received input it cannot evaluate.
    #[error("illegal traversal state: {0}")]
    IllegalState(String),

    /// A math expression variable resolved to a non-numeric value.
    #[error("math variable '{variable}' must resolve to a number, found {found}")]
    VariableResolution { variable: String, found: String },

    /// A match pattern whose start label can never be bound.
    #[error("unmatchable match pattern: {0}")]
    UnmatchablePattern(String),

    /// `local()` or a Local-scoped step met a traverser without the
    /// collection shape it needs.
    #[error("no valid scope value: {0}")]
    MissingScopeValue(String),

    /// Raised by the `fail()` step.
    #[error("traversal failed: {0}")]
    Fail(String),

    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Evaluation-wide state threaded by reference through every pull. Child
/// traversals (modulators, repeat bodies, match patterns) are evaluated
/// against their parent's context, so side effects and configuration are
/// shared all the way down.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    pub graph: Option<Arc<dyn Graph>>,
    pub side_effects: SideEffectsHandle,
    /// When false, traversers keep empty paths and path steps see no
    /// history. Enabled whenever any step requires path or label access.
    pub path_tracking: bool,
    /// When true, start steps emit one traverser per value with bulk
    /// pinned to 1 and coalescing disabled downstream semantics.
    pub one_bulk: bool,
    pub initial_sack: Option<Value>,
    pub sack_merge: Option<Operator>,
    /// Seed for shuffle ordering and `coin()`/`sample()`; random when
    /// absent.
    pub seed: Option<u64>,
}

impl TraversalContext {
    pub fn new(side_effects: SideEffectsHandle) -> Self {
        Self {
            graph: None,
            side_effects,
            path_tracking: false,
            one_bulk: false,
            initial_sack: None,
            sack_merge: None,
            seed: None,
        }
    }

    pub fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}

/// Pull one traverser out of a step chain. `steps` and `done` are parallel;
/// `done[i]` records that step `i` will never receive another start.
fn pull_chain(
    steps: &mut [Box<dyn Step>],
    done: &mut [bool],
    ctx: &TraversalContext,
) -> Result<Option<Traverser>, TraversalError> {
    let Some((step, head)) = steps.split_last_mut() else {
        return Ok(None);
    };
    let Some((flag, head_done)) = done.split_last_mut() else {
        return Ok(None);
    };
    loop {
        match step.pull(ctx, *flag)? {
            StepOut::Emit(mut traverser) => {
                if ctx.path_tracking {
                    for label in step.labels() {
                        traverser.add_label(label);
                    }
                }
                return Ok(Some(traverser));
            }
            StepOut::Done => return Ok(None),
            StepOut::NeedMore => {
                if *flag {
                    // A step must not ask for more after its upstream is
                    // exhausted; treat it as finished rather than spin.
                    return Ok(None);
                }
                if head.is_empty() {
                    *flag = true;
                } else {
                    match pull_chain(head, head_done, ctx)? {
                        Some(traverser) => step.add_start(traverser),
                        None => *flag = true,
                    }
                }
            }
        }
    }
}

/// An executable step chain. Reusable: `reset()` restores it to its
/// pre-evaluation state so re-iteration yields the same results (up to
/// seeded randomness).
#[derive(Debug)]
pub struct Traversal {
    steps: Vec<Box<dyn Step>>,
    upstream_done: Vec<bool>,
}

impl Clone for Traversal {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.iter().map(|s| s.clone_box()).collect(),
            upstream_done: self.upstream_done.clone(),
        }
    }
}

impl Traversal {
    pub fn new() -> Self {
        Self { steps: Vec::new(), upstream_done: Vec::new() }
    }

    pub fn with_steps(steps: Vec<Box<dyn Step>>) -> Self {
        let upstream_done = vec![false; steps.len()];
        Self { steps, upstream_done }
    }

    pub fn add_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
        self.upstream_done.push(false);
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut Vec<Box<dyn Step>> {
        &mut self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Label the most recently added step (`as_()`).
    pub fn label_last(&mut self, label: &str) -> Result<(), TraversalError> {
        match self.steps.last_mut() {
            Some(step) => {
                step.add_label(label);
                Ok(())
            }
            None => Err(TraversalError::IllegalConstruction(
                "as() requires a preceding step".to_string(),
            )),
        }
    }

    /// Feed a traverser into the head of the chain.
    pub fn add_start(&mut self, traverser: Traverser) {
        if let Some(first) = self.steps.first_mut() {
            first.add_start(traverser);
        }
    }

    /// Pull the next traverser through the full chain.
    pub fn next_traverser(
        &mut self,
        ctx: &TraversalContext,
    ) -> Result<Option<Traverser>, TraversalError> {
        pull_chain(&mut self.steps, &mut self.upstream_done, ctx)
    }

    /// Restore the chain to its pre-evaluation state.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        for flag in &mut self.upstream_done {
            *flag = false;
        }
    }

    /// Union of the requirements of every step, including nested child
    /// traversals (each step folds its children into its own answer).
    pub fn requirements(&self) -> crate::step::Requirements {
        let mut reqs = crate::step::Requirements::default();
        for step in &self.steps {
            reqs = reqs.union(step.requirements());
        }
        for step in &self.steps {
            if !step.labels().is_empty() {
                reqs.labeled_path = true;
            }
        }
        reqs
    }

    // Child-traversal evaluation. A modulator or pattern traversal is fed
    // one forked traverser at a time and fully drained; reset in between
    // keeps evaluations independent.

    /// Map the source through this chain to at most one value. `None`
    /// means the chain was unproductive for this input.
    pub fn produce(
        &mut self,
        ctx: &TraversalContext,
        source: &Traverser,
    ) -> Result<Option<Value>, TraversalError> {
        if self.steps.is_empty() {
            return Ok(Some(source.value().clone()));
        }
        self.reset();
        self.add_start(source.fork());
        Ok(self.next_traverser(ctx)?.map(Traverser::into_value))
    }

    /// Filter semantics: does this chain emit anything for the input?
    pub fn test(
        &mut self,
        ctx: &TraversalContext,
        source: &Traverser,
    ) -> Result<bool, TraversalError> {
        if self.steps.is_empty() {
            return Ok(true);
        }
        self.reset();
        self.add_start(source.fork());
        Ok(self.next_traverser(ctx)?.is_some())
    }

    /// FlatMap semantics: every traverser this chain emits for the input.
    pub fn flat(
        &mut self,
        ctx: &TraversalContext,
        source: &Traverser,
    ) -> Result<Vec<Traverser>, TraversalError> {
        if self.steps.is_empty() {
            return Ok(vec![source.fork()]);
        }
        self.reset();
        self.add_start(source.fork());
        let mut out = Vec::new();
        while let Some(traverser) = self.next_traverser(ctx)? {
            out.push(traverser);
        }
        Ok(out)
    }
}

impl Default for Traversal {
    fn default() -> Self {
        Self::new()
    }
}
