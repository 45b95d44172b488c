// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value type system for traverser payloads and graph properties
//!
//! Every object that flows through the step pipeline is a [`Value`]: graph
//! elements, scalars, collections, and the binding maps produced by
//! `select`/`match`/`group`. Values carry a total order (used by the order
//! comparators) and are hashable (used as group/dedup keys), which requires
//! manual `Eq`/`Ord`/`Hash` impls because of floating point payloads.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::structure::element::{Edge, Vertex};
use crate::structure::memory::MemoryGraph;

/// A single value flowing through the traversal pipeline or stored as a
/// graph property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(#[serde(with = "map_as_pairs")] BTreeMap<Value, Value>),
    Vertex(Vertex),
    Edge(Edge),
    /// A single key/value property entry, produced by `properties()`.
    Property { key: String, value: Box<Value> },
    /// An edge-induced side-effect graph, produced by `subgraph()`. Not
    /// serializable; it is an in-memory handle, not a wire value.
    #[serde(skip)]
    Subgraph(Arc<MemoryGraph>),
}

/// JSON objects require string keys, but `Value::Map` keys are arbitrary
/// `Value`s, so the map is carried on the wire as a sequence of pairs.
mod map_as_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Value;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Value, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Value, Value>, D::Error> {
        let pairs = Vec::<(Value, Value)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl Value {
    /// Ordering rank of the value kind, used to totally order values of
    /// different kinds. Null sorts before everything.
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::DateTime(_) => 4,
            Value::List(_) => 5,
            Value::Set(_) => 6,
            Value::Map(_) => 7,
            Value::Vertex(_) => 8,
            Value::Edge(_) => 9,
            Value::Property { .. } => 10,
            Value::Subgraph(_) => 11,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The element id, if the value is a graph element.
    pub fn element_id(&self) -> Option<i64> {
        match self {
            Value::Vertex(v) => Some(v.id),
            Value::Edge(e) => Some(e.id),
            _ => None,
        }
    }

    /// Human-oriented kind name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Vertex(_) => "vertex",
            Value::Edge(_) => "edge",
            Value::Property { .. } => "property",
            Value::Subgraph(_) => "subgraph",
        }
    }

    /// Total order over values. Numbers compare across `Int`/`Float`;
    /// values of different kinds order by kind rank so sorting mixed
    /// streams is deterministic rather than an error.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => total_f64_cmp(*a, *b),
            (Value::Int(a), Value::Float(b)) => total_f64_cmp(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => total_f64_cmp(*a, *b as f64),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => compare_seq(a.iter(), b.iter()),
            (Value::Set(a), Value::Set(b)) => compare_seq(a.iter(), b.iter()),
            (Value::Map(a), Value::Map(b)) => {
                compare_seq(a.iter().map(|(k, _)| k), b.iter().map(|(k, _)| k)).then_with(|| {
                    compare_seq(a.iter().map(|(_, v)| v), b.iter().map(|(_, v)| v))
                })
            }
            (Value::Vertex(a), Value::Vertex(b)) => a.id.cmp(&b.id),
            (Value::Edge(a), Value::Edge(b)) => a.id.cmp(&b.id),
            (Value::Property { key: ka, value: va }, Value::Property { key: kb, value: vb }) => {
                ka.cmp(kb).then_with(|| va.compare(vb))
            }
            (Value::Subgraph(a), Value::Subgraph(b)) => {
                (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize))
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

fn compare_seq<'a, A, B>(a: A, b: B) -> Ordering
where
    A: Iterator<Item = &'a Value>,
    B: Iterator<Item = &'a Value>,
{
    let mut a = a;
    let mut b = b;
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.compare(y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

fn total_f64_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.to_bits().cmp(&b.to_bits()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            // Int(1) and Float(1.0) are equal under compare(), so integral
            // floats must hash identically to the matching Int.
            Value::Float(f) => {
                state.write_u8(2);
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    (*f as i64).hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Value::String(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Value::DateTime(dt) => {
                state.write_u8(4);
                dt.hash(state);
            }
            Value::List(items) => {
                state.write_u8(5);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Set(items) => {
                state.write_u8(6);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(entries) => {
                state.write_u8(7);
                for (k, v) in entries {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Vertex(v) => {
                state.write_u8(8);
                v.id.hash(state);
            }
            Value::Edge(e) => {
                state.write_u8(9);
                e.id.hash(state);
            }
            Value::Property { key, value } => {
                state.write_u8(10);
                key.hash(state);
                value.hash(state);
            }
            Value::Subgraph(g) => {
                state.write_u8(11);
                (Arc::as_ptr(g) as usize).hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Vertex(v) => write!(f, "v[{}]", v.id),
            Value::Edge(e) => write!(f, "e[{}][{}-{}->{}]", e.id, e.out_v, e.label, e.in_v),
            Value::Property { key, value } => write!(f, "p[{}->{}]", key, value),
            Value::Subgraph(_) => write!(f, "subgraph"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vertex> for Value {
    fn from(v: Vertex) -> Self {
        Value::Vertex(v)
    }
}

impl From<Edge> for Value {
    fn from(e: Edge) -> Self {
        Value::Edge(e)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn cross_type_numeric_equality() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_eq!(hash_of(&Value::Int(3)), hash_of(&Value::Float(3.0)));
        assert_ne!(Value::Int(3), Value::Float(3.5));
    }

    #[test]
    fn null_sorts_first() {
        let mut values = vec![Value::Int(1), Value::Null, Value::from("a")];
        values.sort();
        assert_eq!(values[0], Value::Null);
    }

    #[test]
    fn list_ordering_is_lexicographic() {
        let a = Value::from(vec![1i64, 2]);
        let b = Value::from(vec![1i64, 3]);
        assert_eq!(a.compare(&b), Ordering::Less);
        let shorter = Value::from(vec![1i64]);
        assert_eq!(shorter.compare(&a), Ordering::Less);
    }

    #[test]
    fn wire_values_round_trip_and_subgraph_is_refused() {
        let value = Value::Map(
            [(Value::from("ages"), Value::from(vec![29i64, 32]))].into_iter().collect(),
        );
        let encoded = serde_json::to_string(&value).unwrap();
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
        // A subgraph is an in-memory handle, not a wire value.
        let handle = Value::Subgraph(Arc::new(MemoryGraph::new()));
        assert!(serde_json::to_string(&handle).is_err());
    }
}
