// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The fluent traversal builder
//!
//! [`GraphTraversalSource`] is the caller's entry point: it carries the
//! bound graph and source-level configuration (side-effect seeds, sack,
//! rng seed) and spawns [`GraphTraversal`] builders. Every builder call
//! records a bytecode instruction before constructing the real step, so a
//! traversal can be replayed elsewhere; construction errors poison the
//! builder and surface at the first terminal call rather than panicking
//! mid-chain.
//!
//! Anonymous child traversals (`__`) are built with [`anonymous`] and
//! passed to the steps that take children (`by`, `repeat`, `match_`,
//! `union`, ...).

pub mod anonymous;

use std::sync::Arc;
use std::time::Duration;

use crate::step::barrier::NoOpBarrierStep;
use crate::step::base::{
    ConstantStep, ElementMapStep, FlatMapStep, IdStep, IdentityStep, IndexStep, LabelStep,
    LambdaMapStep, LoopsStep, MapFn, MapStep, PathStep, ProjectStep, PropertiesStep,
    PropertyMapStep, PropertyValueStep, SelectStep, UnfoldStep,
};
use crate::step::branch::{
    BranchChoice, BranchStep, CoalesceStep, LocalStep, LoopTest, OptionalStep, RepeatStep,
    UnionStep,
};
use crate::step::filter::{
    CoinStep, ConnectiveKind, ConnectiveStep, DedupLocalStep, DedupStep, DropStep, FilterFn,
    HasContainer, HasStep, IsStep, LambdaFilterStep, PathFilterStep, RangeGlobalStep,
    RangeLocalStep, SampleLocalStep, SampleStep, TailGlobalStep, TailLocalStep, TimeLimitStep,
    WherePredicateStep, WhereTraversalStep,
};
use crate::step::graph_step::{EdgeEndpoint, EdgeVertexStep, GraphStep, InjectStep, VertexStep};
use crate::step::group::{GroupCountStep, GroupStep, TreeStep};
use crate::step::match_step::{MatchAlgorithm, MatchStep};
use crate::step::math::MathStep;
use crate::step::mutate::{AddEdgeStep, AddVertexStep, EdgeEnd, PropertyStep};
use crate::step::order_step::{OrderGlobalStep, OrderLocalStep};
use crate::step::reduce::{ReduceStep, Reduction};
use crate::step::side_effect::{
    AggregateStep, CapStep, FailStep, LambdaSideEffectStep, SackStep, SideEffectFn, SubgraphStep,
};
use crate::step::{ByMod, Step, Token};
use crate::structure::element::{Cardinality, Direction};
use crate::structure::graph::Graph;
use crate::structure::value::Value;
use crate::traversal::bytecode::{arg, Bytecode};
use crate::traversal::{
    Operator, Order, Pick, Scope, Traversal, TraversalContext, TraversalError, P,
};
use crate::traverser::path::Pop;
use crate::traverser::side_effects::new_handle;
use crate::traverser::Traverser;

/// Spawns traversals over one graph with shared source configuration.
#[derive(Debug, Clone)]
pub struct GraphTraversalSource {
    graph: Option<Arc<dyn Graph>>,
    side_effect_seeds: Vec<(String, Value, Option<Operator>)>,
    initial_sack: Option<Value>,
    sack_merge: Option<Operator>,
    seed: Option<u64>,
    bytecode: Bytecode,
}

impl GraphTraversalSource {
    pub fn new(graph: Arc<dyn Graph>) -> Self {
        Self {
            graph: Some(graph),
            side_effect_seeds: Vec::new(),
            initial_sack: None,
            sack_merge: None,
            seed: None,
            bytecode: Bytecode::new(),
        }
    }

    /// A source with no bound graph; only `inject()`-driven traversals can
    /// run from it.
    pub fn empty() -> Self {
        Self {
            graph: None,
            side_effect_seeds: Vec::new(),
            initial_sack: None,
            sack_merge: None,
            seed: None,
            bytecode: Bytecode::new(),
        }
    }

    pub fn with_side_effect(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.bytecode.add_source("withSideEffect", vec![arg(&key), arg(&value)]);
        self.side_effect_seeds.push((key.to_string(), value, None));
        self
    }

    pub fn with_side_effect_reducer(
        mut self,
        key: &str,
        value: impl Into<Value>,
        reducer: Operator,
    ) -> Self {
        let value = value.into();
        self.bytecode
            .add_source("withSideEffect", vec![arg(&key), arg(&value), arg(&reducer)]);
        self.side_effect_seeds.push((key.to_string(), value, Some(reducer)));
        self
    }

    pub fn with_sack(mut self, initial: impl Into<Value>) -> Self {
        let initial = initial.into();
        self.bytecode.add_source("withSack", vec![arg(&initial)]);
        self.initial_sack = Some(initial);
        self
    }

    pub fn with_sack_merge(mut self, initial: impl Into<Value>, merge: Operator) -> Self {
        let initial = initial.into();
        self.bytecode.add_source("withSack", vec![arg(&initial), arg(&merge)]);
        self.initial_sack = Some(initial);
        self.sack_merge = Some(merge);
        self
    }

    /// Seed for shuffle/coin/sample so evaluations are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.bytecode.add_source("withSeed", vec![arg(&seed)]);
        self.seed = Some(seed);
        self
    }

    fn spawn(&self) -> GraphTraversal {
        let handle = new_handle();
        {
            let mut side_effects = handle.write();
            for (key, value, reducer) in &self.side_effect_seeds {
                side_effects.register(key, value.clone(), *reducer);
            }
        }
        let mut ctx = TraversalContext::new(handle);
        ctx.graph = self.graph.clone();
        ctx.initial_sack = self.initial_sack.clone();
        ctx.sack_merge = self.sack_merge;
        ctx.seed = self.seed;
        GraphTraversal {
            traversal: Traversal::new(),
            ctx,
            bytecode: self.bytecode.clone(),
            poison: None,
            next_id: 0,
            pending_until: None,
            pending_emit: None,
            prepared: false,
            peeked: None,
            bulk_buffer: None,
        }
    }

    /// `g.V(ids…)`.
    pub fn v(&self, ids: impl IntoIterator<Item = i64>) -> GraphTraversal {
        let ids: Vec<i64> = ids.into_iter().collect();
        self.spawn()
            .append("V", vec![arg(&ids)], Box::new(GraphStep::vertices(ids.clone())))
    }

    /// `g.E(ids…)`.
    pub fn e(&self, ids: impl IntoIterator<Item = i64>) -> GraphTraversal {
        let ids: Vec<i64> = ids.into_iter().collect();
        self.spawn()
            .append("E", vec![arg(&ids)], Box::new(GraphStep::edges(ids.clone())))
    }

    /// `g.addV(label)`.
    pub fn add_v(&self, label: &str) -> GraphTraversal {
        self.spawn()
            .append("addV", vec![arg(&label)], Box::new(AddVertexStep::new(Some(label))))
    }

    /// `g.inject(values…)`.
    pub fn inject<I, T>(&self, values: I) -> GraphTraversal
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.spawn()
            .append("inject", vec![arg(&values)], Box::new(InjectStep::new(values.clone())))
    }
}

/// A fluent, bytecode-recording traversal under construction. Terminal
/// calls (`next`, `to_list`, `iterate`, `has_next`) evaluate it.
#[derive(Debug, Clone)]
pub struct GraphTraversal {
    traversal: Traversal,
    ctx: TraversalContext,
    bytecode: Bytecode,
    poison: Option<String>,
    next_id: usize,
    pending_until: Option<LoopTest>,
    pending_emit: Option<LoopTest>,
    prepared: bool,
    peeked: Option<Traverser>,
    bulk_buffer: Option<(Value, u64)>,
}

impl GraphTraversal {
    pub(crate) fn anonymous() -> Self {
        Self {
            traversal: Traversal::new(),
            ctx: TraversalContext::new(new_handle()),
            bytecode: Bytecode::new(),
            poison: None,
            next_id: 0,
            pending_until: None,
            pending_emit: None,
            prepared: false,
            peeked: None,
            bulk_buffer: None,
        }
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    fn append(mut self, name: &str, args: Vec<serde_json::Value>, mut step: Box<dyn Step>) -> Self {
        self.bytecode.add_step(name, args);
        if self.poison.is_some() {
            return self;
        }
        step.set_id(format!("step_{}", self.next_id));
        self.next_id += 1;
        self.traversal.add_step(step);
        self
    }

    fn poison_with(mut self, error: TraversalError) -> Self {
        if self.poison.is_none() {
            self.poison = Some(error.to_string());
        }
        self
    }

    /// Consume an anonymous child, surfacing its poison into the parent.
    fn child(traversal: GraphTraversal) -> Result<Traversal, TraversalError> {
        match traversal.poison {
            Some(message) => Err(TraversalError::IllegalConstruction(message)),
            None => Ok(traversal.traversal),
        }
    }

    fn children(
        traversals: Vec<GraphTraversal>,
    ) -> Result<Vec<Traversal>, TraversalError> {
        traversals.into_iter().map(Self::child).collect()
    }

    /// Apply `f` to the last step downcast to `S`, or poison.
    fn modulate_last<S: 'static>(
        mut self,
        name: &str,
        args: Vec<serde_json::Value>,
        f: impl FnOnce(&mut S),
    ) -> Self {
        self.bytecode.add_step(name, args);
        if self.poison.is_some() {
            return self;
        }
        match self
            .traversal
            .steps_mut()
            .last_mut()
            .and_then(|step| step.as_any_mut().downcast_mut::<S>())
        {
            Some(step) => {
                f(step);
                self
            }
            None => self.poison_with(TraversalError::IllegalConstruction(format!(
                "{}() does not modulate the preceding step",
                name
            ))),
        }
    }

    fn modulate_by_with(mut self, args: Vec<serde_json::Value>, by: ByMod) -> Self {
        self.bytecode.add_step("by", args);
        if self.poison.is_some() {
            return self;
        }
        let result = match self.traversal.steps_mut().last_mut() {
            Some(step) => step.modulate_by(by),
            None => Err(TraversalError::IllegalConstruction(
                "by() requires a preceding step".to_string(),
            )),
        };
        match result {
            Ok(()) => self,
            Err(error) => self.poison_with(error),
        }
    }

    // ---- map steps ----

    pub fn identity(self) -> Self {
        self.append("identity", vec![], Box::new(IdentityStep::new()))
    }

    pub fn constant(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.append("constant", vec![arg(&value)], Box::new(ConstantStep::new(value.clone())))
    }

    pub fn id(self) -> Self {
        self.append("id", vec![], Box::new(IdStep::new()))
    }

    pub fn label(self) -> Self {
        self.append("label", vec![], Box::new(LabelStep::new()))
    }

    pub fn map(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("map", vec![bc], Box::new(MapStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn flat_map(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("flatMap", vec![bc], Box::new(FlatMapStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn map_lambda(self, transform: MapFn) -> Self {
        self.append("map", vec![arg(&())], Box::new(LambdaMapStep::new(transform)))
    }

    pub fn key(self) -> Self {
        self.append("key", vec![], Box::new(PropertyValueStep::key()))
    }

    pub fn value(self) -> Self {
        self.append("value", vec![], Box::new(PropertyValueStep::value()))
    }

    pub fn properties(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append(
            "properties",
            vec![arg(&keys)],
            Box::new(PropertiesStep::properties(keys.clone())),
        )
    }

    pub fn values(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append("values", vec![arg(&keys)], Box::new(PropertiesStep::values(keys.clone())))
    }

    pub fn property_map(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append(
            "propertyMap",
            vec![arg(&keys)],
            Box::new(PropertyMapStep::new(keys.clone())),
        )
    }

    /// `valueMap(keys…)`; `with_tokens()` adds the `~id`/`~label` entries.
    pub fn value_map(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append("valueMap", vec![arg(&keys)], Box::new(PropertyMapStep::new(keys.clone())))
    }

    pub fn element_map(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append(
            "elementMap",
            vec![arg(&keys)],
            Box::new(ElementMapStep::new(keys.clone())),
        )
    }

    pub fn select(self, key: &str) -> Self {
        self.append(
            "select",
            vec![arg(&key)],
            Box::new(SelectStep::new(Pop::Last, vec![key.to_string()])),
        )
    }

    pub fn select_many(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append("select", vec![arg(&keys)], Box::new(SelectStep::new(Pop::Last, keys.clone())))
    }

    pub fn select_pop(self, pop: Pop, key: &str) -> Self {
        self.append(
            "select",
            vec![arg(&pop), arg(&key)],
            Box::new(SelectStep::new(pop, vec![key.to_string()])),
        )
    }

    pub fn path(self) -> Self {
        self.append("path", vec![], Box::new(PathStep::new()))
    }

    pub fn project(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append("project", vec![arg(&keys)], Box::new(ProjectStep::new(keys.clone())))
    }

    pub fn unfold(self) -> Self {
        self.append("unfold", vec![], Box::new(UnfoldStep::new()))
    }

    pub fn fold(self) -> Self {
        self.append("fold", vec![], Box::new(ReduceStep::new(Reduction::Fold, Scope::Global)))
    }

    pub fn fold_with(self, seed: impl Into<Value>, op: Operator) -> Self {
        let seed = seed.into();
        self.append(
            "fold",
            vec![arg(&seed), arg(&op)],
            Box::new(ReduceStep::new(
                Reduction::FoldWith { seed: seed.clone(), op },
                Scope::Global,
            )),
        )
    }

    pub fn count(self) -> Self {
        self.append("count", vec![], Box::new(ReduceStep::new(Reduction::Count, Scope::Global)))
    }

    pub fn count_local(self) -> Self {
        self.append(
            "count",
            vec![arg(&Scope::Local)],
            Box::new(ReduceStep::new(Reduction::Count, Scope::Local)),
        )
    }

    pub fn sum(self) -> Self {
        self.append("sum", vec![], Box::new(ReduceStep::new(Reduction::Sum, Scope::Global)))
    }

    pub fn sum_local(self) -> Self {
        self.append(
            "sum",
            vec![arg(&Scope::Local)],
            Box::new(ReduceStep::new(Reduction::Sum, Scope::Local)),
        )
    }

    pub fn min(self) -> Self {
        self.append("min", vec![], Box::new(ReduceStep::new(Reduction::Min, Scope::Global)))
    }

    pub fn min_local(self) -> Self {
        self.append(
            "min",
            vec![arg(&Scope::Local)],
            Box::new(ReduceStep::new(Reduction::Min, Scope::Local)),
        )
    }

    pub fn max(self) -> Self {
        self.append("max", vec![], Box::new(ReduceStep::new(Reduction::Max, Scope::Global)))
    }

    pub fn max_local(self) -> Self {
        self.append(
            "max",
            vec![arg(&Scope::Local)],
            Box::new(ReduceStep::new(Reduction::Max, Scope::Local)),
        )
    }

    pub fn mean(self) -> Self {
        self.append("mean", vec![], Box::new(ReduceStep::new(Reduction::Mean, Scope::Global)))
    }

    pub fn mean_local(self) -> Self {
        self.append(
            "mean",
            vec![arg(&Scope::Local)],
            Box::new(ReduceStep::new(Reduction::Mean, Scope::Local)),
        )
    }

    pub fn group(self) -> Self {
        self.append("group", vec![], Box::new(GroupStep::new(None)))
    }

    /// Side-effect form: `group('x')`.
    pub fn group_as(self, key: &str) -> Self {
        self.append("group", vec![arg(&key)], Box::new(GroupStep::new(Some(key.to_string()))))
    }

    pub fn group_count(self) -> Self {
        self.append("groupCount", vec![], Box::new(GroupCountStep::new(None)))
    }

    pub fn group_count_as(self, key: &str) -> Self {
        self.append(
            "groupCount",
            vec![arg(&key)],
            Box::new(GroupCountStep::new(Some(key.to_string()))),
        )
    }

    pub fn tree(self) -> Self {
        self.append("tree", vec![], Box::new(TreeStep::new(None)))
    }

    pub fn tree_as(self, key: &str) -> Self {
        self.append("tree", vec![arg(&key)], Box::new(TreeStep::new(Some(key.to_string()))))
    }

    pub fn order(self) -> Self {
        self.append("order", vec![], Box::new(OrderGlobalStep::new()))
    }

    pub fn order_local(self) -> Self {
        self.append(
            "order",
            vec![arg(&Scope::Local)],
            Box::new(OrderLocalStep::new()),
        )
    }

    pub fn math(self, expression: &str) -> Self {
        match MathStep::new(expression) {
            Ok(step) => self.append("math", vec![arg(&expression)], Box::new(step)),
            Err(error) => {
                // Record the instruction, then poison.
                self.append("math", vec![arg(&expression)], Box::new(IdentityStep::new()))
                    .poison_with(error)
            }
        }
    }

    pub fn loops(self) -> Self {
        self.append("loops", vec![], Box::new(LoopsStep::new(None)))
    }

    pub fn loops_named(self, name: &str) -> Self {
        self.append("loops", vec![arg(&name)], Box::new(LoopsStep::new(Some(name.to_string()))))
    }

    pub fn index(self) -> Self {
        self.append("index", vec![], Box::new(IndexStep::new()))
    }

    // ---- graph steps ----

    /// Mid-traversal `V(ids…)`.
    pub fn v(self, ids: impl IntoIterator<Item = i64>) -> Self {
        let ids: Vec<i64> = ids.into_iter().collect();
        self.append("V", vec![arg(&ids)], Box::new(GraphStep::vertices(ids.clone())))
    }

    pub fn out(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "out",
            vec![arg(&labels)],
            Box::new(VertexStep::adjacent(Direction::Out, labels.clone())),
        )
    }

    pub fn in_(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "in",
            vec![arg(&labels)],
            Box::new(VertexStep::adjacent(Direction::In, labels.clone())),
        )
    }

    pub fn both(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "both",
            vec![arg(&labels)],
            Box::new(VertexStep::adjacent(Direction::Both, labels.clone())),
        )
    }

    /// `to(direction, labels…)`, the generalized adjacency step.
    pub fn to_direction(self, direction: Direction, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "to",
            vec![arg(&direction), arg(&labels)],
            Box::new(VertexStep::adjacent(direction, labels.clone())),
        )
    }

    pub fn out_e(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "outE",
            vec![arg(&labels)],
            Box::new(VertexStep::incident(Direction::Out, labels.clone())),
        )
    }

    pub fn in_e(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "inE",
            vec![arg(&labels)],
            Box::new(VertexStep::incident(Direction::In, labels.clone())),
        )
    }

    pub fn both_e(self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.append(
            "bothE",
            vec![arg(&labels)],
            Box::new(VertexStep::incident(Direction::Both, labels.clone())),
        )
    }

    pub fn out_v(self) -> Self {
        self.append("outV", vec![], Box::new(EdgeVertexStep::new(EdgeEndpoint::Out)))
    }

    pub fn in_v(self) -> Self {
        self.append("inV", vec![], Box::new(EdgeVertexStep::new(EdgeEndpoint::In)))
    }

    pub fn both_v(self) -> Self {
        self.append("bothV", vec![], Box::new(EdgeVertexStep::new(EdgeEndpoint::Both)))
    }

    pub fn other_v(self) -> Self {
        self.append("otherV", vec![], Box::new(EdgeVertexStep::new(EdgeEndpoint::Other)))
    }

    pub fn inject<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.append("inject", vec![arg(&values)], Box::new(InjectStep::new(values.clone())))
    }

    // ---- filter steps ----

    pub fn filter(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("filter", vec![bc], Box::new(WhereTraversalStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn filter_lambda(self, predicate: FilterFn) -> Self {
        self.append("filter", vec![arg(&())], Box::new(LambdaFilterStep::new(predicate)))
    }

    pub fn has(self, key: &str, predicate: P) -> Self {
        self.append(
            "has",
            vec![arg(&key), arg(&predicate)],
            Box::new(HasStep::new(vec![HasContainer::Key(key.to_string(), Some(predicate.clone()))])),
        )
    }

    /// `has('k', value)` shorthand for `has('k', eq(value))`.
    pub fn has_eq(self, key: &str, value: impl Into<Value>) -> Self {
        self.has(key, P::Eq(value.into()))
    }

    /// `has('k')`: the property must exist.
    pub fn has_key_present(self, key: &str) -> Self {
        self.append(
            "has",
            vec![arg(&key)],
            Box::new(HasStep::new(vec![HasContainer::Key(key.to_string(), None)])),
        )
    }

    pub fn has_not(self, key: &str) -> Self {
        self.append(
            "hasNot",
            vec![arg(&key)],
            Box::new(HasStep::new(vec![HasContainer::Absent(key.to_string())])),
        )
    }

    /// Literal arguments are `eq` predicates; an explicit null is `eq(null)`,
    /// never "no predicate".
    pub fn has_label(self, label: impl Into<Value>) -> Self {
        let label = label.into();
        self.append(
            "hasLabel",
            vec![arg(&label)],
            Box::new(HasStep::new(vec![HasContainer::Label(P::Eq(label.clone()))])),
        )
    }

    pub fn has_label_p(self, predicate: P) -> Self {
        self.append(
            "hasLabel",
            vec![arg(&predicate)],
            Box::new(HasStep::new(vec![HasContainer::Label(predicate.clone())])),
        )
    }

    pub fn has_id(self, id: impl Into<Value>) -> Self {
        let id = id.into();
        self.append(
            "hasId",
            vec![arg(&id)],
            Box::new(HasStep::new(vec![HasContainer::Id(P::Eq(id.clone()))])),
        )
    }

    pub fn has_id_p(self, predicate: P) -> Self {
        self.append(
            "hasId",
            vec![arg(&predicate)],
            Box::new(HasStep::new(vec![HasContainer::Id(predicate.clone())])),
        )
    }

    pub fn has_key_p(self, predicate: P) -> Self {
        self.append(
            "hasKey",
            vec![arg(&predicate)],
            Box::new(HasStep::new(vec![HasContainer::PropKey(predicate.clone())])),
        )
    }

    pub fn has_value_p(self, predicate: P) -> Self {
        self.append(
            "hasValue",
            vec![arg(&predicate)],
            Box::new(HasStep::new(vec![HasContainer::PropValue(predicate.clone())])),
        )
    }

    pub fn is_(self, predicate: P) -> Self {
        self.append("is", vec![arg(&predicate)], Box::new(IsStep::new(predicate.clone())))
    }

    pub fn is_eq(self, value: impl Into<Value>) -> Self {
        self.is_(P::Eq(value.into()))
    }

    pub fn where_(self, predicate: P) -> Self {
        self.append(
            "where",
            vec![arg(&predicate)],
            Box::new(WherePredicateStep::new(None, predicate.clone())),
        )
    }

    pub fn where_from(self, start_key: &str, predicate: P) -> Self {
        self.append(
            "where",
            vec![arg(&start_key), arg(&predicate)],
            Box::new(WherePredicateStep::new(Some(start_key.to_string()), predicate.clone())),
        )
    }

    pub fn where_traversal(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("where", vec![bc], Box::new(WhereTraversalStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn and(self, children: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = children.iter().map(|c| arg(c.bytecode())).collect();
        match Self::children(children) {
            Ok(ts) => {
                self.append("and", bcs, Box::new(ConnectiveStep::new(ConnectiveKind::And, ts)))
            }
            Err(e) => self.poison_with(e),
        }
    }

    pub fn or(self, children: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = children.iter().map(|c| arg(c.bytecode())).collect();
        match Self::children(children) {
            Ok(ts) => {
                self.append("or", bcs, Box::new(ConnectiveStep::new(ConnectiveKind::Or, ts)))
            }
            Err(e) => self.poison_with(e),
        }
    }

    pub fn not(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append(
                "not",
                vec![bc],
                Box::new(ConnectiveStep::new(ConnectiveKind::Not, vec![t])),
            ),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn dedup(self) -> Self {
        self.append("dedup", vec![], Box::new(DedupStep::new(Vec::new())))
    }

    /// `dedup('a','b')`: scoped to label bindings. Directly after `match()`
    /// this configures the match step's own dedup set.
    pub fn dedup_labels(mut self, labels: &[&str]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        if self.poison.is_none() {
            if let Some(match_step) = self
                .traversal
                .steps_mut()
                .last_mut()
                .and_then(|s| s.as_any_mut().downcast_mut::<MatchStep>())
            {
                self.bytecode.add_step("dedup", vec![arg(&labels)]);
                match_step.set_dedup_labels(labels);
                return self;
            }
        }
        self.append("dedup", vec![arg(&labels)], Box::new(DedupStep::new(labels.clone())))
    }

    pub fn dedup_local(self) -> Self {
        self.append("dedup", vec![arg(&Scope::Local)], Box::new(DedupLocalStep::new()))
    }

    pub fn range(self, low: u64, high: u64) -> Self {
        self.append(
            "range",
            vec![arg(&low), arg(&high)],
            Box::new(RangeGlobalStep::new(low, Some(high))),
        )
    }

    pub fn limit(self, n: u64) -> Self {
        self.append("limit", vec![arg(&n)], Box::new(RangeGlobalStep::new(0, Some(n))))
    }

    pub fn skip(self, n: u64) -> Self {
        self.append("skip", vec![arg(&n)], Box::new(RangeGlobalStep::new(n, None)))
    }

    pub fn range_local(self, low: usize, high: usize) -> Self {
        self.append(
            "range",
            vec![arg(&Scope::Local), arg(&low), arg(&high)],
            Box::new(RangeLocalStep::new(low, Some(high))),
        )
    }

    pub fn limit_local(self, n: usize) -> Self {
        self.append(
            "limit",
            vec![arg(&Scope::Local), arg(&n)],
            Box::new(RangeLocalStep::new(0, Some(n))),
        )
    }

    pub fn tail(self, n: u64) -> Self {
        self.append("tail", vec![arg(&n)], Box::new(TailGlobalStep::new(n)))
    }

    pub fn tail_local(self, n: usize) -> Self {
        self.append(
            "tail",
            vec![arg(&Scope::Local), arg(&n)],
            Box::new(TailLocalStep::new(n)),
        )
    }

    pub fn coin(self, probability: f64) -> Self {
        self.append("coin", vec![arg(&probability)], Box::new(CoinStep::new(probability)))
    }

    pub fn sample(self, amount: u64) -> Self {
        self.append("sample", vec![arg(&amount)], Box::new(SampleStep::new(amount)))
    }

    pub fn sample_local(self, amount: usize) -> Self {
        self.append(
            "sample",
            vec![arg(&Scope::Local), arg(&amount)],
            Box::new(SampleLocalStep::new(amount)),
        )
    }

    pub fn simple_path(self) -> Self {
        self.append("simplePath", vec![], Box::new(PathFilterStep::simple()))
    }

    pub fn cyclic_path(self) -> Self {
        self.append("cyclicPath", vec![], Box::new(PathFilterStep::cyclic()))
    }

    pub fn time_limit(self, limit: Duration) -> Self {
        self.append(
            "timeLimit",
            vec![arg(&(limit.as_millis() as u64))],
            Box::new(TimeLimitStep::new(limit)),
        )
    }

    pub fn drop(self) -> Self {
        self.append("drop", vec![], Box::new(DropStep::new()))
    }

    // ---- side-effect steps ----

    pub fn side_effect(self, effect: SideEffectFn) -> Self {
        self.append("sideEffect", vec![arg(&())], Box::new(LambdaSideEffectStep::new(effect)))
    }

    pub fn aggregate(self, key: &str) -> Self {
        self.append(
            "aggregate",
            vec![arg(&key)],
            Box::new(AggregateStep::new(key, Scope::Global)),
        )
    }

    /// `aggregate(local,'x')`, the lazy (store) form.
    pub fn aggregate_local(self, key: &str) -> Self {
        self.append(
            "aggregate",
            vec![arg(&Scope::Local), arg(&key)],
            Box::new(AggregateStep::new(key, Scope::Local)),
        )
    }

    pub fn cap(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.append("cap", vec![arg(&keys)], Box::new(CapStep::new(keys.clone())))
    }

    pub fn fail(self, message: &str) -> Self {
        self.append("fail", vec![arg(&message)], Box::new(FailStep::new(message)))
    }

    pub fn subgraph(self, key: &str) -> Self {
        self.append("subgraph", vec![arg(&key)], Box::new(SubgraphStep::new(key)))
    }

    pub fn sack(self) -> Self {
        self.append("sack", vec![], Box::new(SackStep::read()))
    }

    pub fn sack_merge(self, op: Operator) -> Self {
        self.append("sack", vec![arg(&op)], Box::new(SackStep::merge(op)))
    }

    pub fn barrier(self) -> Self {
        self.append("barrier", vec![], Box::new(NoOpBarrierStep::new(None)))
    }

    pub fn barrier_sized(self, max_size: usize) -> Self {
        self.append(
            "barrier",
            vec![arg(&max_size)],
            Box::new(NoOpBarrierStep::new(Some(max_size))),
        )
    }

    // ---- branch steps ----

    pub fn local(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("local", vec![bc], Box::new(LocalStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn repeat(self, body: GraphTraversal) -> Self {
        let bc = arg(body.bytecode());
        match Self::child(body) {
            Ok(t) => {
                let mut step = RepeatStep::new(t);
                let mut this = self;
                if let Some(test) = this.pending_until.take() {
                    step.set_until(test, true);
                }
                if let Some(test) = this.pending_emit.take() {
                    step.set_emit(test, true);
                }
                this.append("repeat", vec![bc], Box::new(step))
            }
            Err(e) => self.poison_with(e),
        }
    }

    pub fn repeat_named(self, name: &str, body: GraphTraversal) -> Self {
        let bc = arg(body.bytecode());
        match Self::child(body) {
            Ok(t) => {
                let mut step = RepeatStep::new(t);
                step.set_loop_name(name);
                let mut this = self;
                if let Some(test) = this.pending_until.take() {
                    step.set_until(test, true);
                }
                if let Some(test) = this.pending_emit.take() {
                    step.set_emit(test, true);
                }
                this.append("repeat", vec![arg(&name), bc], Box::new(step))
            }
            Err(e) => self.poison_with(e),
        }
    }

    /// `until(child)`; before `repeat()` it becomes a while-loop test.
    pub fn until(mut self, condition: GraphTraversal) -> Self {
        let bc = arg(condition.bytecode());
        let test = match Self::child(condition) {
            Ok(t) => LoopTest::Traversal(t),
            Err(e) => return self.poison_with(e),
        };
        if self.last_is_repeat() {
            self.modulate_last("until", vec![bc], |step: &mut RepeatStep| {
                step.set_until(test, false);
            })
        } else {
            self.bytecode.add_step("until", vec![bc]);
            self.pending_until = Some(test);
            self
        }
    }

    pub fn times(mut self, count: u32) -> Self {
        if self.last_is_repeat() {
            self.modulate_last("times", vec![arg(&count)], |step: &mut RepeatStep| {
                step.set_until(LoopTest::Loops(count), false);
            })
        } else {
            self.bytecode.add_step("times", vec![arg(&count)]);
            self.pending_until = Some(LoopTest::Loops(count));
            self
        }
    }

    pub fn emit(mut self) -> Self {
        if self.last_is_repeat() {
            self.modulate_last("emit", vec![], |step: &mut RepeatStep| {
                step.set_emit(LoopTest::Always, false);
            })
        } else {
            self.bytecode.add_step("emit", vec![]);
            self.pending_emit = Some(LoopTest::Always);
            self
        }
    }

    pub fn emit_when(mut self, condition: GraphTraversal) -> Self {
        let bc = arg(condition.bytecode());
        let test = match Self::child(condition) {
            Ok(t) => LoopTest::Traversal(t),
            Err(e) => return self.poison_with(e),
        };
        if self.last_is_repeat() {
            self.modulate_last("emit", vec![bc], |step: &mut RepeatStep| {
                step.set_emit(test, false);
            })
        } else {
            self.bytecode.add_step("emit", vec![bc]);
            self.pending_emit = Some(test);
            self
        }
    }

    fn last_is_repeat(&self) -> bool {
        self.traversal
            .steps()
            .last()
            .map(|step| step.kind() == "repeat")
            .unwrap_or(false)
    }

    pub fn branch(self, choice: GraphTraversal) -> Self {
        let bc = arg(choice.bytecode());
        match Self::child(choice) {
            Ok(t) => self.append(
                "branch",
                vec![bc],
                Box::new(BranchStep::new(BranchChoice::Traversal(t))),
            ),
            Err(e) => self.poison_with(e),
        }
    }

    /// `choose(predicate, trueBranch, falseBranch)`.
    pub fn choose(
        self,
        predicate: P,
        matched: GraphTraversal,
        otherwise: GraphTraversal,
    ) -> Self {
        let args = vec![arg(&predicate), arg(matched.bytecode()), arg(otherwise.bytecode())];
        let parts = (|| {
            Ok::<_, TraversalError>((Self::child(matched)?, Self::child(otherwise)?))
        })();
        match parts {
            Ok((yes, no)) => {
                let mut step = BranchStep::new(BranchChoice::Predicate(predicate));
                step.add_option(Pick::Token(Value::Bool(true)), yes);
                step.add_option(Pick::Token(Value::Bool(false)), no);
                self.append("choose", args, Box::new(step))
            }
            Err(e) => self.poison_with(e),
        }
    }

    /// `choose(traversal)` with `option()` calls to follow.
    pub fn choose_by(self, choice: GraphTraversal) -> Self {
        let bc = arg(choice.bytecode());
        match Self::child(choice) {
            Ok(t) => self.append(
                "choose",
                vec![bc],
                Box::new(BranchStep::new(BranchChoice::Traversal(t))),
            ),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn option(self, pick: Pick, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.modulate_last(
                "option",
                vec![arg(&pick), bc],
                |step: &mut BranchStep| step.add_option(pick.clone(), t),
            ),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn union(self, children: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = children.iter().map(|c| arg(c.bytecode())).collect();
        match Self::children(children) {
            Ok(ts) => self.append("union", bcs, Box::new(UnionStep::new(ts))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn coalesce(self, children: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = children.iter().map(|c| arg(c.bytecode())).collect();
        match Self::children(children) {
            Ok(ts) => self.append("coalesce", bcs, Box::new(CoalesceStep::new(ts))),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn optional(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.append("optional", vec![bc], Box::new(OptionalStep::new(t))),
            Err(e) => self.poison_with(e),
        }
    }

    // ---- match ----

    pub fn match_(self, patterns: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = patterns.iter().map(|p| arg(p.bytecode())).collect();
        let built = match Self::children(patterns) {
            Ok(ts) => MatchStep::conjunctive(ts),
            Err(e) => Err(e),
        };
        match built {
            Ok(step) => self.append("match", bcs, Box::new(step)),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn match_any(self, patterns: Vec<GraphTraversal>) -> Self {
        let bcs: Vec<serde_json::Value> = patterns.iter().map(|p| arg(p.bytecode())).collect();
        let built = match Self::children(patterns) {
            Ok(ts) => MatchStep::disjunctive(ts),
            Err(e) => Err(e),
        };
        match built {
            Ok(step) => self.append("match", bcs, Box::new(step)),
            Err(e) => self.poison_with(e),
        }
    }

    /// Select the pattern-scheduling policy of the preceding `match()`.
    pub fn with_match_algorithm(self, algorithm: MatchAlgorithm) -> Self {
        self.modulate_last("with", vec![arg(&"matchAlgorithm")], |step: &mut MatchStep| {
            step.set_algorithm(algorithm);
        })
    }

    // ---- mutating steps ----

    pub fn add_v(self, label: &str) -> Self {
        self.append("addV", vec![arg(&label)], Box::new(AddVertexStep::new(Some(label))))
    }

    pub fn add_e(self, label: &str) -> Self {
        self.append("addE", vec![arg(&label)], Box::new(AddEdgeStep::new(label)))
    }

    pub fn from_(self, binding: &str) -> Self {
        let end = EdgeEnd::Binding(binding.to_string());
        self.modulate_last("from", vec![arg(&binding)], |step: &mut AddEdgeStep| {
            step.set_from(end);
        })
    }

    pub fn from_value(self, vertex: impl Into<Value>) -> Self {
        let value = vertex.into();
        let end = EdgeEnd::Literal(value.clone());
        self.modulate_last("from", vec![arg(&value)], |step: &mut AddEdgeStep| {
            step.set_from(end);
        })
    }

    pub fn from_traversal(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.modulate_last("from", vec![bc], |step: &mut AddEdgeStep| {
                step.set_from(EdgeEnd::Traversal(t));
            }),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn to_(self, binding: &str) -> Self {
        let end = EdgeEnd::Binding(binding.to_string());
        self.modulate_last("to", vec![arg(&binding)], |step: &mut AddEdgeStep| {
            step.set_to(end);
        })
    }

    pub fn to_value(self, vertex: impl Into<Value>) -> Self {
        let value = vertex.into();
        let end = EdgeEnd::Literal(value.clone());
        self.modulate_last("to", vec![arg(&value)], |step: &mut AddEdgeStep| {
            step.set_to(end);
        })
    }

    pub fn to_traversal(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.modulate_last("to", vec![bc], |step: &mut AddEdgeStep| {
                step.set_to(EdgeEnd::Traversal(t));
            }),
            Err(e) => self.poison_with(e),
        }
    }

    pub fn property(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.append(
            "property",
            vec![arg(&key), arg(&value)],
            Box::new(PropertyStep::new(None, key, value.clone())),
        )
    }

    pub fn property_with(
        self,
        cardinality: Cardinality,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        let value = value.into();
        self.append(
            "property",
            vec![arg(&cardinality), arg(&key), arg(&value)],
            Box::new(PropertyStep::new(Some(cardinality), key, value.clone())),
        )
    }

    // ---- modulators ----

    /// `as('label')`: labels the last step; an anonymous start gets an
    /// identity step to carry the label.
    pub fn as_(mut self, label: &str) -> Self {
        self.bytecode.add_step("as", vec![arg(&label)]);
        if self.poison.is_some() {
            return self;
        }
        if self.traversal.is_empty() {
            let mut identity: Box<dyn Step> = Box::new(IdentityStep::new());
            identity.set_id(format!("step_{}", self.next_id));
            self.next_id += 1;
            self.traversal.add_step(identity);
        }
        match self.traversal.label_last(label) {
            Ok(()) => self,
            Err(e) => self.poison_with(e),
        }
    }

    pub fn by(self) -> Self {
        self.modulate_by_with(vec![], ByMod::Identity)
    }

    pub fn by_key(self, key: &str) -> Self {
        self.modulate_by_with(vec![arg(&key)], ByMod::Key(key.to_string()))
    }

    pub fn by_token(self, token: Token) -> Self {
        self.modulate_by_with(vec![arg(&token)], ByMod::Token(token))
    }

    pub fn by_traversal(self, child: GraphTraversal) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.modulate_by_with(vec![bc], ByMod::Traversal(t)),
            Err(e) => self.poison_with(e),
        }
    }

    /// `by(order)` on an `order()` step.
    pub fn by_order(self, order: Order) -> Self {
        self.by_comparator(ByMod::Identity, order, vec![arg(&order)])
    }

    pub fn by_key_order(self, key: &str, order: Order) -> Self {
        self.by_comparator(
            ByMod::Key(key.to_string()),
            order,
            vec![arg(&key), arg(&order)],
        )
    }

    pub fn by_traversal_order(self, child: GraphTraversal, order: Order) -> Self {
        let bc = arg(child.bytecode());
        match Self::child(child) {
            Ok(t) => self.by_comparator(ByMod::Traversal(t), order, vec![bc, arg(&order)]),
            Err(e) => self.poison_with(e),
        }
    }

    fn by_comparator(mut self, by: ByMod, order: Order, args: Vec<serde_json::Value>) -> Self {
        self.bytecode.add_step("by", args);
        if self.poison.is_some() {
            return self;
        }
        let last = self.traversal.steps_mut().last_mut();
        let attached = match last {
            Some(step) => {
                if let Some(global) = step.as_any_mut().downcast_mut::<OrderGlobalStep>() {
                    global.add_comparator(by, order);
                    true
                } else if let Some(local) = step.as_any_mut().downcast_mut::<OrderLocalStep>() {
                    local.add_comparator(by, order);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if attached {
            self
        } else {
            self.poison_with(TraversalError::IllegalConstruction(
                "by(order) requires a preceding order() step".to_string(),
            ))
        }
    }

    /// `valueMap(...).with_tokens()`: include `~id` and `~label`.
    pub fn with_tokens(self) -> Self {
        self.modulate_last("with", vec![arg(&"tokens")], |step: &mut PropertyMapStep| {
            step.set_tokens(true);
        })
    }

    // ---- terminals ----

    fn prepare(&mut self) -> Result<(), TraversalError> {
        if let Some(message) = self.poison.take() {
            return Err(TraversalError::IllegalConstruction(message));
        }
        if !self.prepared {
            let requirements = self.traversal.requirements();
            self.ctx.path_tracking = requirements.path || requirements.labeled_path;
            self.ctx.one_bulk = self.ctx.one_bulk || requirements.one_bulk;
            log::debug!(
                "traversal prepared: {} steps, path_tracking={}",
                self.traversal.steps().len(),
                self.ctx.path_tracking
            );
            self.prepared = true;
        }
        Ok(())
    }

    /// Pull the next traverser (bulk preserved).
    pub fn next_traverser(&mut self) -> Result<Option<Traverser>, TraversalError> {
        self.prepare()?;
        if let Some(peeked) = self.peeked.take() {
            return Ok(Some(peeked));
        }
        self.traversal.next_traverser(&self.ctx)
    }

    pub fn has_next(&mut self) -> Result<bool, TraversalError> {
        if self.peeked.is_some() || self.bulk_buffer.is_some() {
            return Ok(true);
        }
        let next = self.next_traverser()?;
        self.peeked = next;
        Ok(self.peeked.is_some())
    }

    /// The next result value; bulk > 1 repeats the value.
    pub fn next(&mut self) -> Result<Option<Value>, TraversalError> {
        if let Some((value, remaining)) = self.bulk_buffer.take() {
            if remaining > 1 {
                self.bulk_buffer = Some((value.clone(), remaining - 1));
            }
            return Ok(Some(value));
        }
        match self.next_traverser()? {
            Some(traverser) => {
                let bulk = traverser.bulk();
                let value = traverser.into_value();
                if bulk > 1 {
                    self.bulk_buffer = Some((value.clone(), bulk - 1));
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Drain every result, expanding bulk.
    pub fn to_list(&mut self) -> Result<Vec<Value>, TraversalError> {
        let mut out = Vec::new();
        while let Some(value) = self.next()? {
            out.push(value);
        }
        Ok(out)
    }

    /// Evaluate for side effects only, discarding results.
    pub fn iterate(&mut self) -> Result<(), TraversalError> {
        while self.next_traverser()?.is_some() {}
        Ok(())
    }

    /// A side-effect value after evaluation (`cap` without the stream).
    pub fn side_effect_value(&self, key: &str) -> Option<Value> {
        self.ctx.side_effects.read().get(key)
    }

    /// Re-run from scratch; seeded randomness reproduces exactly.
    pub fn reset(&mut self) {
        self.traversal.reset();
        self.peeked = None;
        self.bulk_buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::memory::MemoryGraph;

    fn two_vertex_graph() -> Arc<MemoryGraph> {
        let graph = Arc::new(MemoryGraph::new());
        let a = graph.add_vertex("person").unwrap();
        let b = graph.add_vertex("person").unwrap();
        graph.add_edge("knows", a.id, b.id).unwrap();
        graph
    }

    #[test]
    fn build_and_run_a_hop() {
        let g = GraphTraversalSource::new(two_vertex_graph());
        let mut traversal = g.v([]).out(&["knows"]).count();
        assert_eq!(traversal.to_list().unwrap(), vec![Value::Int(1)]);
    }

    #[test]
    fn bytecode_records_every_call() {
        let g = GraphTraversalSource::empty().with_seed(7);
        let traversal = g.inject([1i64, 2]).order().by_order(Order::Desc).limit(1);
        let ops: Vec<&str> = traversal
            .bytecode()
            .step_instructions()
            .iter()
            .map(|i| i.operator.as_str())
            .collect();
        assert_eq!(ops, vec!["inject", "order", "by", "limit"]);
        assert_eq!(traversal.bytecode().source_instructions().len(), 1);
    }

    #[test]
    fn construction_errors_surface_at_first_terminal() {
        let g = GraphTraversalSource::empty();
        let mut bad = g.inject([1i64]).by();
        assert!(matches!(
            bad.to_list(),
            Err(TraversalError::IllegalConstruction(_))
        ));
    }

    #[test]
    fn bulk_expands_in_results() {
        let g = GraphTraversalSource::empty();
        let mut traversal = g.inject([3i64, 3, 3]).barrier();
        let values = traversal.to_list().unwrap();
        assert_eq!(values, vec![Value::Int(3), Value::Int(3), Value::Int(3)]);
    }
}
