// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-traversal shared side-effect registry
//!
//! Side-effects are the only resource shared across all traversers of one
//! traversal. They are mutated in place by reference and are not safe for
//! concurrent pulls against the same traversal instance; concurrent use
//! requires separate clones (which get separate registries).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::structure::value::Value;
use crate::traversal::operator::Operator;
use crate::traversal::TraversalError;

/// Shared handle to the side-effect registry of one traversal.
pub type SideEffectsHandle = Arc<RwLock<SideEffects>>;

pub fn new_handle() -> SideEffectsHandle {
    Arc::new(RwLock::new(SideEffects::default()))
}

/// String-keyed side-effect map with optional per-key reducers. A key with
/// a registered reducer supports associative `add` merges (needed by
/// `aggregate`, side-effect `group`, and any partial-result combination).
#[derive(Debug, Default, Clone)]
pub struct SideEffects {
    entries: HashMap<String, Value>,
    reducers: HashMap<String, Operator>,
}

impl SideEffects {
    /// Register a key with an initial value and an optional reducer.
    /// Re-registration overwrites, which lets `with_side_effect` seed a key
    /// the steps later fold into.
    pub fn register(&mut self, key: &str, initial: Value, reducer: Option<Operator>) {
        self.entries.insert(key.to_string(), initial);
        match reducer {
            Some(op) => {
                self.reducers.insert(key.to_string(), op);
            }
            None => {
                self.reducers.remove(key);
            }
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    /// Replace the value under `key`.
    pub fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    /// Fold `value` into the current value under `key` using the key's
    /// registered reducer; without a reducer the value is assigned.
    pub fn add(&mut self, key: &str, value: Value) -> Result<(), TraversalError> {
        let merged = match (self.entries.get(key), self.reducers.get(key)) {
            (Some(current), Some(op)) => op.apply(current.clone(), value)?,
            _ => value,
        };
        self.entries.insert(key.to_string(), merged);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_uses_registered_reducer() {
        let mut se = SideEffects::default();
        se.register("total", Value::Int(0), Some(Operator::Sum));
        se.add("total", Value::Int(3)).unwrap();
        se.add("total", Value::Int(4)).unwrap();
        assert_eq!(se.get("total"), Some(Value::Int(7)));
    }

    #[test]
    fn add_without_reducer_assigns() {
        let mut se = SideEffects::default();
        se.register("last", Value::Null, None);
        se.add("last", Value::Int(1)).unwrap();
        se.add("last", Value::Int(2)).unwrap();
        assert_eq!(se.get("last"), Some(Value::Int(2)));
    }

    #[test]
    fn list_concat_reducer() {
        let mut se = SideEffects::default();
        se.register("x", Value::List(Vec::new()), Some(Operator::AddAll));
        se.add("x", Value::List(vec![Value::Int(1)])).unwrap();
        se.add("x", Value::List(vec![Value::Int(2)])).unwrap();
        assert_eq!(
            se.get("x"),
            Some(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }
}
