// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Labeled traverser history
//!
//! A path is an append-only sequence of (object, label-set) pairs. Insertion
//! order is significant and never reordered; entries are only appended, or
//! selectively retracted by the match step's memory optimization.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::structure::value::Value;

/// Which binding to take when a label occurs on several path entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pop {
    First,
    Last,
    /// Every binding, as a list (a single binding stays unwrapped).
    All,
    /// Single binding unwrapped, multiple bindings as a list.
    Mixed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    objects: Vec<Value>,
    labels: Vec<BTreeSet<String>>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Append an object with an initially empty label set.
    pub fn extend(&mut self, object: Value) {
        self.objects.push(object);
        self.labels.push(BTreeSet::new());
    }

    /// Add a label to the most recent entry. A no-op on an empty path.
    pub fn add_label(&mut self, label: &str) {
        if let Some(last) = self.labels.last_mut() {
            last.insert(label.to_string());
        }
    }

    pub fn add_labels<I: IntoIterator<Item = String>>(&mut self, labels: I) {
        if let Some(last) = self.labels.last_mut() {
            last.extend(labels);
        }
    }

    pub fn head(&self) -> Option<&Value> {
        self.objects.last()
    }

    pub fn objects(&self) -> &[Value] {
        &self.objects
    }

    pub fn label_sets(&self) -> &[BTreeSet<String>] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|set| set.contains(label))
    }

    /// Resolve a label to its bound object(s) per the `Pop` rule.
    pub fn get(&self, pop: Pop, label: &str) -> Option<Value> {
        let mut found: Vec<&Value> = Vec::new();
        for (object, labels) in self.objects.iter().zip(self.labels.iter()) {
            if labels.contains(label) {
                found.push(object);
            }
        }
        match pop {
            Pop::First => found.first().map(|v| (*v).clone()),
            Pop::Last => found.last().map(|v| (*v).clone()),
            Pop::All => {
                if found.is_empty() {
                    None
                } else {
                    Some(Value::List(found.into_iter().cloned().collect()))
                }
            }
            Pop::Mixed => match found.len() {
                0 => None,
                1 => Some(found[0].clone()),
                _ => Some(Value::List(found.into_iter().cloned().collect())),
            },
        }
    }

    /// Drop every label not in `keep`, then drop entries whose label set
    /// became empty (except the head, which is the current position). This
    /// is the match step's memory bound; callers must never retract a label
    /// that is still referenced.
    pub fn retract(&mut self, keep: &BTreeSet<String>) {
        for set in &mut self.labels {
            set.retain(|l| keep.contains(l));
        }
        let head_index = self.objects.len().saturating_sub(1);
        let mut index = 0;
        let mut kept_objects = Vec::with_capacity(self.objects.len());
        let mut kept_labels = Vec::with_capacity(self.labels.len());
        for (object, labels) in self.objects.drain(..).zip(self.labels.drain(..)) {
            if index == head_index || !labels.is_empty() {
                kept_objects.push(object);
                kept_labels.push(labels);
            }
            index += 1;
        }
        self.objects = kept_objects;
        self.labels = kept_labels;
    }

    /// True when no object occurs twice (cyclic check for simplePath).
    pub fn is_simple(&self) -> bool {
        for i in 0..self.objects.len() {
            for j in (i + 1)..self.objects.len() {
                if self.objects[i] == self.objects[j] {
                    return false;
                }
            }
        }
        true
    }
}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (object, labels) in self.objects.iter().zip(self.labels.iter()) {
            object.hash(state);
            for label in labels {
                label.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(entries: &[(i64, &[&str])]) -> Path {
        let mut path = Path::new();
        for (value, labels) in entries {
            path.extend(Value::Int(*value));
            for label in *labels {
                path.add_label(label);
            }
        }
        path
    }

    #[test]
    fn pop_addressing() {
        let path = labeled(&[(1, &["a"]), (2, &["a", "b"]), (3, &[])]);
        assert_eq!(path.get(Pop::First, "a"), Some(Value::Int(1)));
        assert_eq!(path.get(Pop::Last, "a"), Some(Value::Int(2)));
        assert_eq!(
            path.get(Pop::All, "a"),
            Some(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(path.get(Pop::Mixed, "b"), Some(Value::Int(2)));
        assert_eq!(path.get(Pop::Last, "missing"), None);
    }

    #[test]
    fn retraction_keeps_head_and_kept_labels() {
        let mut path = labeled(&[(1, &["a"]), (2, &["b"]), (3, &[])]);
        let keep: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        path.retract(&keep);
        assert_eq!(path.len(), 2);
        assert!(path.has_label("b"));
        assert!(!path.has_label("a"));
        assert_eq!(path.head(), Some(&Value::Int(3)));
    }

    #[test]
    fn simplicity() {
        assert!(labeled(&[(1, &[]), (2, &[])]).is_simple());
        assert!(!labeled(&[(1, &[]), (2, &[]), (1, &[])]).is_simple());
    }
}
