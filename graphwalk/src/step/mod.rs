// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The step contract
//!
//! Every traversal operation is a [`Step`]: a pull-driven node that buffers
//! incoming traversers via `add_start` and yields via `pull`. A step never
//! references its neighbours; the engine in `traversal` wires the chain
//! together and relays `NeedMore` upstream.
//!
//! Step categories follow a small set of shapes. Scalar maps emit exactly
//! one output per input, flat maps zero or more, filters pass or drop
//! whole traversers, and barriers drain their upstream entirely before
//! emitting anything.

pub mod barrier;
pub mod base;
pub mod branch;
pub mod filter;
pub mod graph_step;
pub mod group;
pub mod match_step;
pub mod math;
pub mod mutate;
pub mod order_step;
pub mod reduce;
pub mod side_effect;

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structure::value::Value;
use crate::traversal::{Traversal, TraversalContext, TraversalError};
use crate::traverser::Traverser;

/// Result of one pull on a step.
#[derive(Debug)]
pub enum StepOut {
    /// One traverser produced; more may follow.
    Emit(Traverser),
    /// The step needs another upstream traverser before it can produce.
    /// Illegal once the upstream is exhausted.
    NeedMore,
    /// The step will never produce again (until reset).
    Done,
}

/// What a step needs from the evaluation environment. Unioned over the
/// whole chain (children included) before evaluation starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Full path history on every traverser.
    pub path: bool,
    /// At least label-bearing paths (`select`, `match`, `where`).
    pub labeled_path: bool,
    pub sack: bool,
    pub side_effects: bool,
    /// Needs a bound graph (`V()`, `out()`, property access).
    pub graph: bool,
    /// Needs bulk pinned to 1 on every traverser.
    pub one_bulk: bool,
}

impl Requirements {
    pub fn union(self, other: Requirements) -> Requirements {
        Requirements {
            path: self.path || other.path,
            labeled_path: self.labeled_path || other.labeled_path,
            sack: self.sack || other.sack,
            side_effects: self.side_effects || other.side_effects,
            graph: self.graph || other.graph,
            one_bulk: self.one_bulk || other.one_bulk,
        }
    }
}

/// Identity and labels shared by every step implementation.
#[derive(Debug, Clone, Default)]
pub struct StepMeta {
    pub id: String,
    pub labels: BTreeSet<String>,
}

/// Implements the bookkeeping half of [`Step`] for a type with a
/// `meta: StepMeta` field.
macro_rules! step_common {
    ($kind:literal) => {
        fn kind(&self) -> &'static str {
            $kind
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

        fn clone_box(&self) -> Box<dyn $crate::step::Step> {
            Box::new(self.clone())
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

pub(crate) use step_common;

/// Pop the next buffered start, or return early with the correct protocol
/// answer (`Done` once the upstream is exhausted, `NeedMore` otherwise).
macro_rules! pull_start {
    ($self:ident, $upstream_done:expr) => {
        match $self.starts.pop_front() {
            Some(traverser) => traverser,
            None => {
                return Ok(if $upstream_done {
                    $crate::step::StepOut::Done
                } else {
                    $crate::step::StepOut::NeedMore
                })
            }
        }
    };
}

pub(crate) use pull_start;

pub trait Step: fmt::Debug + Send {
    fn kind(&self) -> &'static str;
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn labels(&self) -> &BTreeSet<String>;
    fn add_label(&mut self, label: &str);
    fn remove_label(&mut self, label: &str);
    fn clone_box(&self) -> Box<dyn Step>;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Buffer one upstream traverser.
    fn add_start(&mut self, traverser: Traverser);

    /// Produce at most one traverser. `upstream_done` is true once no
    /// further `add_start` will ever arrive (until reset).
    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError>;

    /// Drop all buffered state so the traversal can be re-iterated.
    fn reset(&mut self);

    fn requirements(&self) -> Requirements {
        Requirements::default()
    }

    /// Terminal incremental reducer exposed by this step, if any. `group()`
    /// inspects its value traversal's last step through this to switch to
    /// per-arrival streaming aggregation.
    fn reducer(&self) -> Option<reduce::Reduction> {
        None
    }

    /// Attach a `by()` modulator. Steps that take none reject it.
    fn modulate_by(&mut self, _by: ByMod) -> Result<(), TraversalError> {
        Err(TraversalError::IllegalConstruction(format!(
            "step '{}' does not accept by() modulation",
            self.kind()
        )))
    }
}

impl Clone for Box<dyn Step> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Element meta-property tokens usable wherever a projection key is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    Id,
    Label,
    Key,
    Value,
}

/// One `by()` modulator: how to project a traverser to a comparable or
/// groupable value.
#[derive(Debug, Clone)]
pub enum ByMod {
    /// `by()` with no argument: the traverser's value itself.
    Identity,
    /// `by("name")`: property lookup on elements, key lookup on maps.
    Key(String),
    /// `by(T::Id)` and friends.
    Token(Token),
    /// `by(__.out().count())`: first result of a child traversal.
    Traversal(Traversal),
}

impl ByMod {
    /// Project `source` to a value, or `None` when the modulator is
    /// unproductive for this input (missing key, empty child traversal).
    pub fn apply(
        &mut self,
        ctx: &TraversalContext,
        source: &Traverser,
    ) -> Result<Option<Value>, TraversalError> {
        match self {
            ByMod::Identity => Ok(Some(source.value().clone())),
            ByMod::Key(key) => Ok(project_key(ctx, source.value(), key)?),
            ByMod::Token(token) => Ok(project_token(source.value(), *token)),
            ByMod::Traversal(child) => child.produce(ctx, source),
        }
    }

    pub fn requirements(&self) -> Requirements {
        match self {
            ByMod::Identity | ByMod::Token(_) => Requirements::default(),
            ByMod::Key(_) => Requirements { graph: true, ..Requirements::default() },
            ByMod::Traversal(child) => child.requirements(),
        }
    }
}

/// Round-robin ring of `by()` modulators. An empty ring hands out identity.
#[derive(Debug, Clone, Default)]
pub struct TraversalRing {
    mods: Vec<ByMod>,
    cursor: usize,
}

impl TraversalRing {
    pub fn add(&mut self, by: ByMod) {
        self.mods.push(by);
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    /// The next modulator in rotation; a fresh Identity when none were
    /// registered.
    pub fn next(&mut self) -> &mut ByMod {
        if self.mods.is_empty() {
            self.mods.push(ByMod::Identity);
        }
        let index = self.cursor % self.mods.len();
        self.cursor += 1;
        &mut self.mods[index]
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn requirements(&self) -> Requirements {
        self.mods
            .iter()
            .fold(Requirements::default(), |acc, by| acc.union(by.requirements()))
    }
}

/// Property/key projection shared by `has()`, `values()`, ordering and
/// grouping modulators. Elements resolve through the bound graph; maps
/// resolve by string key. Anything else is unproductive.
pub fn project_key(
    ctx: &TraversalContext,
    value: &Value,
    key: &str,
) -> Result<Option<Value>, TraversalError> {
    match value {
        Value::Vertex(v) => {
            let Some(graph) = ctx.graph.as_ref() else {
                return Ok(None);
            };
            let mut props = graph.vertex_properties(v.id, &[key.to_string()]);
            Ok(if props.is_empty() { None } else { Some(props.remove(0).1) })
        }
        Value::Edge(e) => {
            let Some(graph) = ctx.graph.as_ref() else {
                return Ok(None);
            };
            let mut props = graph.edge_properties(e.id, &[key.to_string()]);
            Ok(if props.is_empty() { None } else { Some(props.remove(0).1) })
        }
        Value::Map(map) => Ok(map.get(&Value::String(key.to_string())).cloned()),
        _ => Ok(None),
    }
}

/// Token projection for `by(T::Id)` etc.
pub fn project_token(value: &Value, token: Token) -> Option<Value> {
    match (token, value) {
        (Token::Id, Value::Vertex(v)) => Some(Value::Int(v.id)),
        (Token::Id, Value::Edge(e)) => Some(Value::Int(e.id)),
        (Token::Label, Value::Vertex(v)) => Some(Value::String(v.label.clone())),
        (Token::Label, Value::Edge(e)) => Some(Value::String(e.label.clone())),
        (Token::Key, Value::Property { key, .. }) => Some(Value::String(key.clone())),
        (Token::Value, Value::Property { value, .. }) => Some((**value).clone()),
        _ => None,
    }
}
