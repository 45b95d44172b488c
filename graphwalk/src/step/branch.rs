// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Branching steps
//!
//! Every child traversal here is re-entered repeatedly, so children are
//! evaluated one source traverser at a time through `Traversal::flat`,
//! which resets the child in between. Whether `until`/`emit` run before
//! or after the body is fixed by modulator position at build time
//! (`until(..).repeat(..)` is a while-loop, `repeat(..).until(..)` a
//! do-while).

use std::collections::VecDeque;

use crate::step::{pull_start, step_common, Requirements, Step, StepMeta, StepOut};
use crate::structure::value::Value;
use crate::traversal::{Pick, Traversal, TraversalContext, TraversalError, P};
use crate::traverser::Traverser;

/// A loop-continuation test for `until()`/`emit()`.
#[derive(Debug, Clone)]
pub enum LoopTest {
    /// `times(n)` / loop-count bound.
    Loops(u32),
    /// A child traversal used as a predicate.
    Traversal(Traversal),
    /// `emit()` with no argument.
    Always,
}

impl LoopTest {
    fn passes(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<bool, TraversalError> {
        match self {
            LoopTest::Loops(bound) => Ok(traverser.loops() >= *bound),
            LoopTest::Traversal(child) => child.test(ctx, traverser),
            LoopTest::Always => Ok(true),
        }
    }

    fn requirements(&self) -> Requirements {
        match self {
            LoopTest::Traversal(child) => child.requirements(),
            _ => Requirements::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepeatStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    body: Traversal,
    until: Option<LoopTest>,
    emit: Option<LoopTest>,
    /// True when the modulator appeared before `repeat()` (while-loop
    /// shape); false for do-while.
    until_first: bool,
    emit_first: bool,
    loop_name: Option<String>,
    active: VecDeque<Traverser>,
    out: VecDeque<Traverser>,
}

impl RepeatStep {
    pub fn new(body: Traversal) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            body,
            until: None,
            emit: None,
            until_first: false,
            emit_first: false,
            loop_name: None,
            active: VecDeque::new(),
            out: VecDeque::new(),
        }
    }

    pub fn set_until(&mut self, test: LoopTest, before_body: bool) {
        self.until = Some(test);
        self.until_first = before_body;
    }

    pub fn set_emit(&mut self, test: LoopTest, before_body: bool) {
        self.emit = Some(test);
        self.emit_first = before_body;
    }

    pub fn set_loop_name(&mut self, name: &str) {
        self.loop_name = Some(name.to_string());
    }

    fn exit(&mut self, mut traverser: Traverser) {
        traverser.reset_loops();
        self.out.push_back(traverser);
    }

    fn emit_copy(&mut self, traverser: &Traverser) {
        let mut copy = traverser.fork();
        copy.reset_loops();
        self.out.push_back(copy);
    }

    /// Run one traverser through one body iteration, routing the results
    /// to the exit queue or back into the active queue.
    fn iterate(
        &mut self,
        ctx: &TraversalContext,
        traverser: Traverser,
    ) -> Result<(), TraversalError> {
        if self.until_first {
            let mut until = self.until.take();
            let exits = match &mut until {
                Some(test) => test.passes(ctx, &traverser)?,
                None => false,
            };
            self.until = until;
            if exits {
                log::debug!("repeat exiting before body at loop {}", traverser.loops());
                self.exit(traverser);
                return Ok(());
            }
        }
        if self.emit_first {
            let mut emit = self.emit.take();
            if let Some(test) = &mut emit {
                if test.passes(ctx, &traverser)? {
                    self.emit_copy(&traverser);
                }
            }
            self.emit = emit;
        }
        let results = self.body.flat(ctx, &traverser)?;
        for mut result in results {
            result.increment_loops();
            if !self.until_first {
                let mut until = self.until.take();
                let exits = match &mut until {
                    Some(test) => test.passes(ctx, &result)?,
                    None => false,
                };
                self.until = until;
                if exits {
                    self.exit(result);
                    continue;
                }
            }
            if !self.emit_first {
                let mut emit = self.emit.take();
                if let Some(test) = &mut emit {
                    if test.passes(ctx, &result)? {
                        self.emit_copy(&result);
                    }
                }
                self.emit = emit;
            }
            self.active.push_back(result);
        }
        Ok(())
    }
}

impl Step for RepeatStep {
    step_common!("repeat");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if let Some(ready) = self.out.pop_front() {
                return Ok(StepOut::Emit(ready));
            }
            if let Some(traverser) = self.active.pop_front() {
                self.iterate(ctx, traverser)?;
                continue;
            }
            let mut traverser = pull_start!(self, upstream_done);
            let id = self.meta.id.clone();
            traverser.initialise_loops(&id, self.loop_name.as_deref());
            self.iterate(ctx, traverser)?;
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.active.clear();
        self.out.clear();
        self.body.reset();
    }

    fn requirements(&self) -> Requirements {
        let mut reqs = self.body.requirements();
        if let Some(test) = &self.until {
            reqs = reqs.union(test.requirements());
        }
        if let Some(test) = &self.emit {
            reqs = reqs.union(test.requirements());
        }
        reqs
    }
}

/// `local(traversal)`: the child runs in isolation per traverser.
#[derive(Debug, Clone)]
pub struct LocalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    child: Traversal,
    buffer: VecDeque<Traverser>,
}

impl LocalStep {
    pub fn new(child: Traversal) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            child,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for LocalStep {
    step_common!("local");

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

/// How `branch()`/`choose()` compute the routing token.
#[derive(Debug, Clone)]
pub enum BranchChoice {
    /// Token from the first result of a child traversal; no result routes
    /// to the `Pick::None` options.
    Traversal(Traversal),
    /// `choose(predicate, …)`: true/false tokens.
    Predicate(P),
}

#[derive(Debug, Clone)]
pub struct BranchStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    choice: BranchChoice,
    options: Vec<(Pick, Traversal)>,
    buffer: VecDeque<Traverser>,
}

impl BranchStep {
    pub fn new(choice: BranchChoice) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            choice,
            options: Vec::new(),
            buffer: VecDeque::new(),
        }
    }

    pub fn add_option(&mut self, pick: Pick, child: Traversal) {
        self.options.push((pick, child));
    }

    fn route(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<(), TraversalError> {
        let token = match &mut self.choice {
            BranchChoice::Traversal(child) => child.produce(ctx, traverser)?,
            BranchChoice::Predicate(p) => {
                Some(Value::Bool(p.test(traverser.value())))
            }
        };
        let mut matched = false;
        let mut routed: Vec<usize> = Vec::new();
        for (index, (pick, _)) in self.options.iter().enumerate() {
            match (pick, &token) {
                (Pick::Any, _) => routed.push(index),
                (Pick::Token(expected), Some(actual)) if expected == actual => {
                    matched = true;
                    routed.push(index);
                }
                _ => {}
            }
        }
        if !matched {
            for (index, (pick, _)) in self.options.iter().enumerate() {
                if *pick == Pick::None {
                    routed.push(index);
                }
            }
        }
        for index in routed {
            let results = self.options[index].1.flat(ctx, traverser)?;
            self.buffer.extend(results);
        }
        Ok(())
    }
}

impl Step for BranchStep {
    step_common!("branch");

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
            self.route(ctx, &traverser)?;
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
        for (_, child) in &mut self.options {
            child.reset();
        }
    }

    fn requirements(&self) -> Requirements {
        let mut reqs = match &self.choice {
            BranchChoice::Traversal(child) => child.requirements(),
            BranchChoice::Predicate(_) => Requirements::default(),
        };
        for (_, child) in &self.options {
            reqs = reqs.union(child.requirements());
        }
        reqs
    }
}

/// `union(…)`: every child's results, in declaration order per input.
#[derive(Debug, Clone)]
pub struct UnionStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    children: Vec<Traversal>,
    buffer: VecDeque<Traverser>,
}

impl UnionStep {
    pub fn new(children: Vec<Traversal>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            children,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for UnionStep {
    step_common!("union");

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
            for child in &mut self.children {
                self.buffer.extend(child.flat(ctx, &traverser)?);
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
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

/// `coalesce(…)`: the first child that produces anything wins.
#[derive(Debug, Clone)]
pub struct CoalesceStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    children: Vec<Traversal>,
    buffer: VecDeque<Traverser>,
}

impl CoalesceStep {
    pub fn new(children: Vec<Traversal>) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            children,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for CoalesceStep {
    step_common!("coalesce");

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
            for child in &mut self.children {
                let results = child.flat(ctx, &traverser)?;
                if !results.is_empty() {
                    self.buffer.extend(results);
                    break;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.buffer.clear();
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

/// `optional(traversal)`: the child's results, or the input unchanged when
/// the child is unproductive.
#[derive(Debug, Clone)]
pub struct OptionalStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    child: Traversal,
    buffer: VecDeque<Traverser>,
}

impl OptionalStep {
    pub fn new(child: Traversal) -> Self {
        Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            child,
            buffer: VecDeque::new(),
        }
    }
}

impl Step for OptionalStep {
    step_common!("optional");

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
            let results = self.child.flat(ctx, &traverser)?;
            if results.is_empty() {
                return Ok(StepOut::Emit(traverser));
            }
            self.buffer = results.into();
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
