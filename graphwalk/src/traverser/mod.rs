// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The traverser data model
//!
//! A traverser is the unit of flow through the step pipeline: a value, a
//! bulk multiplicity ("this traverser stands in for N duplicates"), a
//! labeled path history, re-entry tags, a loop-counter stack, an optional
//! sack, and a shared side-effect reference.

pub mod path;
pub mod side_effects;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use crate::structure::value::Value;

pub use path::{Path, Pop};
pub use side_effects::{new_handle, SideEffects, SideEffectsHandle};

/// One nested-loop frame; `repeat()` steps push and pop these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopFrame {
    pub step_id: String,
    pub name: Option<String>,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct Traverser {
    value: Value,
    bulk: u64,
    path: Path,
    tags: BTreeSet<String>,
    loops: Vec<LoopFrame>,
    sack: Option<Value>,
    side_effects: SideEffectsHandle,
}

impl Traverser {
    /// Generate a fresh traverser at a start step. Bulk starts at 1; the
    /// path records the value only when the traversal tracks paths.
    pub fn new(
        value: Value,
        side_effects: SideEffectsHandle,
        path_tracking: bool,
        sack: Option<Value>,
    ) -> Self {
        let mut path = Path::new();
        if path_tracking {
            path.extend(value.clone());
        }
        Self {
            value,
            bulk: 1,
            path,
            tags: BTreeSet::new(),
            loops: Vec::new(),
            sack,
            side_effects,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub fn bulk(&self) -> u64 {
        self.bulk
    }

    /// Bulk is invariantly >= 1; a merge below 1 is clamped.
    pub fn set_bulk(&mut self, bulk: u64) {
        self.bulk = bulk.max(1);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_mut(&mut self) -> &mut Path {
        &mut self.path
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.tags
    }

    pub fn sack(&self) -> Option<&Value> {
        self.sack.as_ref()
    }

    pub fn set_sack(&mut self, sack: Option<Value>) {
        self.sack = sack;
    }

    pub fn side_effects(&self) -> &SideEffectsHandle {
        &self.side_effects
    }

    /// Map/flatMap product: a new traverser carrying `value`, sharing this
    /// traverser's bulk, tags, loops, sack, and side-effect reference. The
    /// path is extended only when the traversal tracks paths.
    pub fn split(&self, value: Value, path_tracking: bool) -> Traverser {
        let mut child = self.clone();
        if path_tracking {
            child.path.extend(value.clone());
        }
        child.value = value;
        child
    }

    /// Identity fork used by OR-match and branching: same value, same path.
    pub fn fork(&self) -> Traverser {
        self.clone()
    }

    /// Add a path label to the current head.
    pub fn add_label(&mut self, label: &str) {
        self.path.add_label(label);
    }

    // Loop counter stack. `repeat()` establishes one frame per step id; a
    // nested repeat pushes a second frame.

    pub fn loops(&self) -> u32 {
        self.loops.last().map(|f| f.count).unwrap_or(0)
    }

    pub fn loops_named(&self, name: &str) -> Option<u32> {
        self.loops
            .iter()
            .rev()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| f.count)
    }

    pub fn initialise_loops(&mut self, step_id: &str, name: Option<&str>) {
        if self.loops.last().map(|f| f.step_id.as_str()) != Some(step_id) {
            self.loops.push(LoopFrame {
                step_id: step_id.to_string(),
                name: name.map(str::to_string),
                count: 0,
            });
        }
    }

    pub fn increment_loops(&mut self) {
        if let Some(frame) = self.loops.last_mut() {
            frame.count += 1;
        }
    }

    pub fn reset_loops(&mut self) {
        self.loops.pop();
    }

    fn coalesce_key(&self) -> TraverserKey {
        TraverserKey {
            value: self.value.clone(),
            path: self.path.clone(),
            tags: self.tags.clone(),
            loops: self.loops.clone(),
            sack: self.sack.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TraverserKey {
    value: Value,
    path: Path,
    tags: BTreeSet<String>,
    loops: Vec<LoopFrame>,
    sack: Option<Value>,
}

/// An insertion-ordered buffer of traversers that coalesces equal entries
/// by summing bulks. Equality covers value, path, tags, loops, and sack, so
/// path-tracking traversals never merge distinct histories.
#[derive(Debug, Default, Clone)]
pub struct TraverserSet {
    items: VecDeque<Traverser>,
    index: HashMap<u64, Vec<usize>>,
    draining: bool,
}

fn key_hash(key: &TraverserKey) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl TraverserSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a traverser, merging bulk into an equal buffered entry when
    /// possible. Coalescing stops once draining has begun; late adds are
    /// appended as-is, which costs only bulk compression.
    pub fn add(&mut self, traverser: Traverser) {
        if !self.draining {
            let key = traverser.coalesce_key();
            let hash = key_hash(&key);
            if let Some(slots) = self.index.get(&hash) {
                for slot in slots {
                    let existing = &mut self.items[*slot];
                    if existing.coalesce_key() == key {
                        let merged = existing.bulk() + traverser.bulk();
                        existing.set_bulk(merged);
                        return;
                    }
                }
            }
            let slot = self.items.len();
            self.items.push_back(traverser);
            self.index.entry(hash).or_default().push(slot);
        } else {
            self.items.push_back(traverser);
        }
    }

    pub fn pop(&mut self) -> Option<Traverser> {
        if !self.draining {
            self.draining = true;
            self.index.clear();
        }
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total bulk across buffered traversers.
    pub fn bulk_size(&self) -> u64 {
        self.items.iter().map(Traverser::bulk).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
        self.draining = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Traverser> {
        self.items.iter()
    }

    /// Randomly permute the buffered traversers and begin draining.
    pub fn shuffle(&mut self, rng: &mut fastrand::Rng) {
        self.index.clear();
        self.draining = true;
        let mut items: Vec<Traverser> = self.items.drain(..).collect();
        rng.shuffle(&mut items);
        self.items = items.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(value: i64) -> Traverser {
        Traverser::new(Value::Int(value), side_effects::new_handle(), false, None)
    }

    #[test]
    fn equal_traversers_coalesce() {
        let mut set = TraverserSet::new();
        for _ in 0..5 {
            set.add(plain(7));
        }
        set.add(plain(8));
        assert_eq!(set.len(), 2);
        let first = set.pop().unwrap();
        assert_eq!(first.bulk(), 5);
        assert_eq!(first.value(), &Value::Int(7));
    }

    #[test]
    fn distinct_paths_do_not_coalesce() {
        let handle = side_effects::new_handle();
        let a = Traverser::new(Value::Int(1), handle.clone(), true, None);
        let via = a.split(Value::Int(2), true);
        let direct = Traverser::new(Value::Int(2), handle, true, None);
        let mut set = TraverserSet::new();
        set.add(via);
        set.add(direct);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn shuffle_permutes_without_losing_bulk() {
        let mut set = TraverserSet::new();
        for value in 0..6 {
            set.add(plain(value));
            set.add(plain(value));
        }
        let before = set.bulk_size();
        let mut rng = fastrand::Rng::with_seed(7);
        set.shuffle(&mut rng);
        assert_eq!(set.bulk_size(), before);
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn loop_frames_nest() {
        let mut t = plain(1);
        t.initialise_loops("s1", None);
        t.increment_loops();
        t.initialise_loops("s1", None);
        assert_eq!(t.loops(), 1);
        t.initialise_loops("s2", Some("inner"));
        t.increment_loops();
        t.increment_loops();
        assert_eq!(t.loops(), 2);
        assert_eq!(t.loops_named("inner"), Some(2));
        t.reset_loops();
        assert_eq!(t.loops(), 1);
    }
}
