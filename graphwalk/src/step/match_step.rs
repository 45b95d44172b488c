// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Constraint pattern matching
//!
//! `match()` runs N sub-traversals ("patterns"), each anchored at a named
//! start label and optionally producing a named end label. Patterns are
//! rewritten once at construction: the first step's label becomes the start
//! anchor, the last step's label the end anchor, and both are stripped so
//! the step machinery does not re-bind them. A traverser completes when
//! every pattern has executed for it (conjunctive) or any one has
//! (disjunctive); completion emits a map of every start/end binding.
//!
//! Re-entry is forbidden through traverser tags: each pattern carries a
//! unique id that is tagged onto a traverser after execution. Pattern
//! selection is pluggable; the count-based algorithm reorders candidates by
//! observed selectivity and prefers cheap predicate clauses.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use uuid::Uuid;

use crate::step::filter::{ConnectiveKind, ConnectiveStep, WherePredicateStep};
use crate::step::{step_common, Requirements, Step, StepMeta, StepOut};
use crate::structure::value::Value;
use crate::traversal::{Traversal, TraversalContext, TraversalError};
use crate::traverser::path::Pop;
use crate::traverser::Traverser;

/// Pattern selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAlgorithm {
    /// First untried pattern in declaration order whose start is bound.
    Greedy,
    /// Reorders by runtime selectivity (ends produced per start attempted),
    /// predicate clauses ahead of full sub-traversals.
    CountBased,
}

// Count-based re-sort cadence: every selection while results are few, then
// periodically. Tuning constants, not correctness.
const AGGRESSIVE_SORT_RESULTS: u64 = 200;
const SORT_INTERVAL: u64 = 250;

#[derive(Debug, Clone)]
struct Pattern {
    id: String,
    start_label: String,
    end_label: Option<String>,
    traversal: Traversal,
    /// Pure filter clause producing no new binding.
    is_where: bool,
    /// Labels beyond the start that must be bound before this pattern may
    /// run (binding names referenced by a `where()` predicate).
    required_labels: Vec<String>,
    starts_attempted: u64,
    ends_produced: u64,
}

impl Pattern {
    fn ready(&self, traverser: &Traverser) -> bool {
        if traverser.path().get(Pop::Last, &self.start_label).is_none() {
            return false;
        }
        self.required_labels
            .iter()
            .all(|label| traverser.path().get(Pop::Last, label).is_some())
    }

    fn selectivity(&self) -> f64 {
        self.ends_produced as f64 / self.starts_attempted.max(1) as f64
    }
}

/// One in-flight traverser plus the labels it carried into the match,
/// which retraction must preserve for downstream steps.
#[derive(Debug, Clone)]
struct WorkItem {
    traverser: Traverser,
    outer_labels: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct MatchStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    patterns: Vec<Pattern>,
    disjunctive: bool,
    algorithm: MatchAlgorithm,
    /// The label a fresh traverser is bound to when none of the pattern
    /// start labels are already on its path.
    computed_start: String,
    /// Every start/end label; the keys of the emitted binding map.
    binding_labels: BTreeSet<String>,
    dedup_labels: Option<Vec<String>>,
    seen: HashSet<Vec<Value>>,
    work: Vec<WorkItem>,
    out: VecDeque<Traverser>,
    results_emitted: u64,
}

impl MatchStep {
    pub fn conjunctive(children: Vec<Traversal>) -> Result<Self, TraversalError> {
        Self::build(children, false)
    }

    pub fn disjunctive(children: Vec<Traversal>) -> Result<Self, TraversalError> {
        Self::build(children, true)
    }

    fn build(children: Vec<Traversal>, disjunctive: bool) -> Result<Self, TraversalError> {
        if children.is_empty() {
            return Err(TraversalError::IllegalConstruction(
                "match() requires at least one pattern".to_string(),
            ));
        }
        let mut patterns = Vec::new();
        collect_patterns(children, &mut patterns)?;

        let starts: BTreeSet<String> = patterns
            .iter()
            .filter(|p| !p.start_label.is_empty())
            .map(|p| p.start_label.clone())
            .collect();
        let ends: BTreeSet<String> = patterns.iter().filter_map(|p| p.end_label.clone()).collect();
        // Prefer a label used as a start but never as an end; tie-break
        // deterministically by name.
        let computed_start = starts
            .iter()
            .find(|label| !ends.contains(*label))
            .or_else(|| starts.iter().next())
            .cloned()
            .ok_or_else(|| {
                TraversalError::IllegalConstruction(
                    "match() patterns declare no start labels".to_string(),
                )
            })?;
        for pattern in &mut patterns {
            if pattern.start_label.is_empty() {
                pattern.start_label = computed_start.clone();
            }
        }

        let mut binding_labels: BTreeSet<String> = starts;
        binding_labels.extend(ends);
        Ok(Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            patterns,
            disjunctive,
            algorithm: MatchAlgorithm::Greedy,
            computed_start,
            binding_labels,
            dedup_labels: None,
            seen: HashSet::new(),
            work: Vec::new(),
            out: VecDeque::new(),
            results_emitted: 0,
        })
    }

    pub fn set_algorithm(&mut self, algorithm: MatchAlgorithm) {
        self.algorithm = algorithm;
    }

    /// Remember emitted label-value tuples and drop repeats.
    pub fn set_dedup_labels(&mut self, labels: Vec<String>) {
        self.dedup_labels = Some(labels);
    }

    fn admit(&mut self, mut traverser: Traverser) -> WorkItem {
        let outer_labels: BTreeSet<String> = traverser
            .path()
            .label_sets()
            .iter()
            .flat_map(|set| set.iter().cloned())
            .collect();
        let anchored = self
            .patterns
            .iter()
            .any(|p| traverser.path().get(Pop::Last, &p.start_label).is_some());
        if !anchored {
            traverser.add_label(&self.computed_start);
        }
        WorkItem { traverser, outer_labels }
    }

    /// Index of the next pattern to run, `Ok(None)` when every pattern is
    /// tagged, `Err` when an untried pattern can never become runnable.
    fn select(&self, traverser: &Traverser) -> Result<Option<usize>, TraversalError> {
        let untried: Vec<usize> = (0..self.patterns.len())
            .filter(|i| !traverser.tags().contains(&self.patterns[*i].id))
            .collect();
        if untried.is_empty() {
            return Ok(None);
        }
        let mut candidates: Vec<usize> = untried
            .iter()
            .copied()
            .filter(|i| self.patterns[*i].ready(traverser))
            .collect();
        if candidates.is_empty() {
            let labels: Vec<&str> = untried
                .iter()
                .map(|i| self.patterns[*i].start_label.as_str())
                .collect();
            return Err(TraversalError::UnmatchablePattern(format!(
                "no pattern starting at [{}] can ever be satisfied",
                labels.join(", ")
            )));
        }
        if self.algorithm == MatchAlgorithm::CountBased && self.should_sort() {
            candidates.sort_by(|a, b| {
                let (pa, pb) = (&self.patterns[*a], &self.patterns[*b]);
                pb.is_where
                    .cmp(&pa.is_where)
                    .then(pa.selectivity().total_cmp(&pb.selectivity()))
            });
        }
        Ok(Some(candidates[0]))
    }

    fn should_sort(&self) -> bool {
        self.results_emitted < AGGRESSIVE_SORT_RESULTS
            || self.results_emitted % SORT_INTERVAL == 0
    }

    /// Run one pattern for one work item; continuations go back on the
    /// work stack.
    fn run_pattern(
        &mut self,
        ctx: &TraversalContext,
        index: usize,
        item: WorkItem,
    ) -> Result<(), TraversalError> {
        let pattern_id = self.patterns[index].id.clone();
        let start_label = self.patterns[index].start_label.clone();
        let end_label = self.patterns[index].end_label.clone();
        let Some(start_value) = item.traverser.path().get(Pop::Last, &start_label) else {
            return Ok(());
        };
        self.patterns[index].starts_attempted += 1;
        let source = item.traverser.split(start_value, true);
        let results = self.patterns[index].traversal.flat(ctx, &source)?;
        self.patterns[index].ends_produced += results.len() as u64;
        log::debug!(
            "match pattern from '{}': {} result(s)",
            start_label,
            results.len()
        );
        match end_label {
            None => {
                // Filter semantics: the traverser survives untouched if the
                // pattern produced anything.
                if !results.is_empty() {
                    let mut item = item;
                    item.traverser.tags_mut().insert(pattern_id);
                    self.work.push(item);
                }
            }
            Some(end) => match item.traverser.path().get(Pop::Last, &end) {
                Some(bound) => {
                    // End already bound: the pattern is a consistency check.
                    if results.iter().any(|r| r.value() == &bound) {
                        let mut item = item;
                        item.traverser.tags_mut().insert(pattern_id);
                        self.work.push(item);
                    }
                }
                None => {
                    for mut result in results {
                        result.add_label(&end);
                        result.tags_mut().insert(pattern_id.clone());
                        self.work.push(WorkItem {
                            traverser: result,
                            outer_labels: item.outer_labels.clone(),
                        });
                    }
                }
            },
        }
        Ok(())
    }

    /// Binding map for a completed traverser, restricted to `labels`.
    fn bindings(traverser: &Traverser, labels: &BTreeSet<String>) -> Value {
        let mut map = BTreeMap::new();
        for label in labels {
            if let Some(value) = traverser.path().get(Pop::Last, label) {
                map.insert(Value::String(label.clone()), value);
            }
        }
        Value::Map(map)
    }

    /// Dedup gate; true means this binding tuple was already emitted.
    fn already_emitted(&mut self, traverser: &Traverser) -> bool {
        let Some(labels) = &self.dedup_labels else {
            return false;
        };
        let tuple: Vec<Value> = labels
            .iter()
            .map(|label| traverser.path().get(Pop::Last, label).unwrap_or(Value::Null))
            .collect();
        !self.seen.insert(tuple)
    }

    /// Produce the result traverser for a completed item, applying the
    /// dedup gate and the label-retraction memory bound.
    fn finish(
        &mut self,
        ctx: &TraversalContext,
        mut item: WorkItem,
        labels: &BTreeSet<String>,
    ) -> Option<Traverser> {
        if self.already_emitted(&item.traverser) {
            return None;
        }
        let bindings = Self::bindings(&item.traverser, labels);
        let mut keep = labels.clone();
        keep.extend(item.outer_labels.iter().cloned());
        item.traverser.path_mut().retract(&keep);
        self.results_emitted += 1;
        Some(item.traverser.split(bindings, ctx.path_tracking))
    }

    fn pull_conjunctive(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            while let Some(item) = self.work.pop() {
                match self.select(&item.traverser)? {
                    None => {
                        let labels = self.binding_labels.clone();
                        if let Some(emitted) = self.finish(ctx, item, &labels) {
                            return Ok(StepOut::Emit(emitted));
                        }
                    }
                    Some(index) => self.run_pattern(ctx, index, item)?,
                }
            }
            match self.starts.pop_front() {
                Some(traverser) => {
                    let item = self.admit(traverser);
                    self.work.push(item);
                }
                None => {
                    return Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
                }
            }
        }
    }

    fn pull_disjunctive(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            if let Some(ready) = self.out.pop_front() {
                return Ok(StepOut::Emit(ready));
            }
            if let Some(item) = self.work.pop() {
                // A fork carries exactly one untried pattern.
                let Some(index) = (0..self.patterns.len())
                    .find(|i| !item.traverser.tags().contains(&self.patterns[*i].id))
                else {
                    continue;
                };
                if !self.patterns[index].ready(&item.traverser) {
                    continue;
                }
                let labels: BTreeSet<String> = [self.patterns[index].start_label.clone()]
                    .into_iter()
                    .chain(self.patterns[index].end_label.clone())
                    .collect();
                let before = self.work.len();
                self.run_pattern(ctx, index, item)?;
                let completed = self.work.split_off(before);
                for done in completed {
                    if let Some(emitted) = self.finish(ctx, done, &labels) {
                        self.out.push_back(emitted);
                    }
                }
                continue;
            }
            match self.starts.pop_front() {
                Some(traverser) => {
                    for index in 0..self.patterns.len() {
                        let mut fork = traverser.fork();
                        // Tag every other pattern so the fork runs just one.
                        for (other, pattern) in self.patterns.iter().enumerate() {
                            if other != index {
                                fork.tags_mut().insert(pattern.id.clone());
                            }
                        }
                        if fork
                            .path()
                            .get(Pop::Last, &self.patterns[index].start_label)
                            .is_none()
                        {
                            fork.add_label(&self.patterns[index].start_label.clone());
                        }
                        let item = WorkItem {
                            outer_labels: fork
                                .path()
                                .label_sets()
                                .iter()
                                .flat_map(|set| set.iter().cloned())
                                .collect(),
                            traverser: fork,
                        };
                        self.work.push(item);
                    }
                }
                None => {
                    return Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
                }
            }
        }
    }
}

/// Recursively flatten child traversals into patterns, rewriting start/end
/// anchor labels off the first/last steps.
fn collect_patterns(
    children: Vec<Traversal>,
    patterns: &mut Vec<Pattern>,
) -> Result<(), TraversalError> {
    for mut child in children {
        if child.is_empty() {
            return Err(TraversalError::IllegalConstruction(
                "match() pattern is empty".to_string(),
            ));
        }
        // A lone and() connective splices its clauses in as sibling
        // patterns; or() nests as a disjunctive sub-match.
        if child.steps().len() == 1 {
            let step = &mut child.steps_mut()[0];
            if let Some(connective) = step.as_any_mut().downcast_mut::<ConnectiveStep>() {
                match connective.kind_of() {
                    ConnectiveKind::And => {
                        collect_patterns(connective.children().to_vec(), patterns)?;
                        continue;
                    }
                    ConnectiveKind::Or => {
                        let nested = MatchStep::disjunctive(connective.children().to_vec())?;
                        let start = nested.computed_start.clone();
                        patterns.push(Pattern {
                            id: Uuid::new_v4().to_string(),
                            start_label: start,
                            end_label: None,
                            traversal: Traversal::with_steps(vec![Box::new(nested)]),
                            is_where: true,
                            required_labels: Vec::new(),
                            starts_attempted: 0,
                            ends_produced: 0,
                        });
                        continue;
                    }
                    ConnectiveKind::Not => {}
                }
            }
        }

        let single_step = child.steps().len() == 1;
        let first_labels: Vec<String> =
            child.steps()[0].labels().iter().cloned().collect();
        let start_label = if first_labels.is_empty() {
            String::new()
        } else {
            // A single labeled step may carry both anchors; a longer
            // pattern must start with exactly one.
            if first_labels.len() > 1 && !single_step {
                return Err(TraversalError::IllegalConstruction(format!(
                    "match() pattern starts with {} labels, exactly one allowed",
                    first_labels.len()
                )));
            }
            let label = first_labels[0].clone();
            child.steps_mut()[0].remove_label(&label);
            label
        };
        let last = child.steps().len() - 1;
        let last_labels: Vec<String> =
            child.steps()[last].labels().iter().cloned().collect();
        let end_label = match last_labels.len() {
            0 => None,
            1 => {
                let label = last_labels[0].clone();
                child.steps_mut()[last].remove_label(&label);
                Some(label)
            }
            _ => {
                return Err(TraversalError::IllegalConstruction(format!(
                    "match() pattern ends with {} labels, at most one allowed",
                    last_labels.len()
                )))
            }
        };

        let mut required_labels = Vec::new();
        let mut filter_shaped = true;
        for step in child.steps_mut() {
            if let Some(where_step) = step.as_any_mut().downcast_mut::<WherePredicateStep>() {
                if let Some(key) = where_step.start_key() {
                    required_labels.push(key.to_string());
                }
                required_labels.extend(where_step.predicate().referenced_keys());
            }
            match step.kind() {
                "where" | "has" | "is" | "filter" | "and" | "identity" => {}
                _ => filter_shaped = false,
            }
        }
        required_labels.retain(|label| label != &start_label);
        let is_where = filter_shaped && end_label.is_none();

        patterns.push(Pattern {
            id: Uuid::new_v4().to_string(),
            start_label,
            end_label,
            traversal: child,
            is_where,
            required_labels,
            starts_attempted: 0,
            ends_produced: 0,
        });
    }
    Ok(())
}

impl Step for MatchStep {
    step_common!("match");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if self.disjunctive {
            self.pull_disjunctive(ctx, upstream_done)
        } else {
            self.pull_conjunctive(ctx, upstream_done)
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.work.clear();
        self.out.clear();
        self.seen.clear();
        self.results_emitted = 0;
        for pattern in &mut self.patterns {
            pattern.traversal.reset();
            pattern.starts_attempted = 0;
            pattern.ends_produced = 0;
        }
    }

    fn requirements(&self) -> Requirements {
        let base = Requirements {
            path: true,
            labeled_path: true,
            ..Requirements::default()
        };
        self.patterns
            .iter()
            .fold(base, |acc, p| acc.union(p.traversal.requirements()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::base::IdentityStep;
    use crate::traversal::P;
    use crate::traverser::side_effects::new_handle;

    fn labeled_identity(labels: &[&str]) -> Traversal {
        let mut identity = IdentityStep::new();
        for label in labels {
            identity.add_label(label);
        }
        Traversal::with_steps(vec![Box::new(identity)])
    }

    #[test]
    fn construction_strips_anchor_labels() {
        let step = MatchStep::conjunctive(vec![labeled_identity(&["a"])]).unwrap();
        assert_eq!(step.patterns.len(), 1);
        assert_eq!(step.patterns[0].start_label, "a");
        assert!(step.patterns[0].traversal.steps()[0].labels().is_empty());
    }

    #[test]
    fn single_step_carries_both_anchors() {
        let step = MatchStep::conjunctive(vec![labeled_identity(&["a", "b"])]).unwrap();
        assert_eq!(step.patterns[0].start_label, "a");
        assert_eq!(step.patterns[0].end_label, Some("b".to_string()));
    }

    #[test]
    fn three_anchor_labels_are_rejected() {
        let result = MatchStep::conjunctive(vec![labeled_identity(&["a", "b", "c"])]);
        assert!(matches!(result, Err(TraversalError::IllegalConstruction(_))));
    }

    #[test]
    fn computed_start_prefers_never_an_end() {
        let step = MatchStep::conjunctive(vec![
            labeled_identity(&["b"]),
            labeled_identity(&["a"]),
        ])
        .unwrap();
        assert_eq!(step.computed_start, "a");
    }

    #[test]
    fn where_predicate_requirements_are_collected() {
        let mut traversal = Traversal::new();
        traversal.add_step(Box::new(IdentityStep::new()));
        traversal.label_last("a").unwrap();
        traversal.add_step(Box::new(WherePredicateStep::new(
            Some("a".to_string()),
            P::eq(Value::String("b".to_string())),
        )));
        let step = MatchStep::conjunctive(vec![traversal]).unwrap();
        assert!(step.patterns[0].is_where);
        assert_eq!(step.patterns[0].required_labels, vec!["b".to_string()]);
    }

    #[test]
    fn disjoint_patterns_fail_at_evaluation_not_construction() {
        let mut step = MatchStep::conjunctive(vec![
            labeled_identity(&["a", "b"]),
            labeled_identity(&["x", "y"]),
        ])
        .unwrap();
        let ctx = TraversalContext::new(new_handle());
        step.add_start(Traverser::new(Value::Int(1), new_handle(), true, None));
        let result = step.pull(&ctx, true);
        assert!(matches!(result, Err(TraversalError::UnmatchablePattern(_))));
    }
}
