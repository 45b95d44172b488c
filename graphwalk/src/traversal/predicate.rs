// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value predicates for `has()`/`is()`/`where()`
//!
//! `P` is a serializable predicate tree. Note the documented contract: a
//! literal null argument to `eq` is a real predicate (`eq(null)`), never
//! "no predicate".

use serde::{Deserialize, Serialize};

use crate::structure::value::Value;
use crate::traversal::TraversalError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum P {
    Eq(Value),
    Neq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Exclusive on both ends.
    Inside(Value, Value),
    /// Strictly below the low bound or strictly above the high bound.
    Outside(Value, Value),
    /// Inclusive low bound, exclusive high bound.
    Between(Value, Value),
    Within(Vec<Value>),
    Without(Vec<Value>),
    And(Box<P>, Box<P>),
    Or(Box<P>, Box<P>),
    Not(Box<P>),
    Text(TextP),
}

impl P {
    pub fn eq(value: impl Into<Value>) -> P {
        P::Eq(value.into())
    }

    pub fn neq(value: impl Into<Value>) -> P {
        P::Neq(value.into())
    }

    pub fn lt(value: impl Into<Value>) -> P {
        P::Lt(value.into())
    }

    pub fn lte(value: impl Into<Value>) -> P {
        P::Lte(value.into())
    }

    pub fn gt(value: impl Into<Value>) -> P {
        P::Gt(value.into())
    }

    pub fn gte(value: impl Into<Value>) -> P {
        P::Gte(value.into())
    }

    pub fn inside(low: impl Into<Value>, high: impl Into<Value>) -> P {
        P::Inside(low.into(), high.into())
    }

    pub fn outside(low: impl Into<Value>, high: impl Into<Value>) -> P {
        P::Outside(low.into(), high.into())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> P {
        P::Between(low.into(), high.into())
    }

    pub fn within<I, T>(values: I) -> P
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        P::Within(values.into_iter().map(Into::into).collect())
    }

    pub fn without<I, T>(values: I) -> P
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        P::Without(values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: P) -> P {
        P::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: P) -> P {
        P::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> P {
        P::Not(Box::new(self))
    }

    pub fn test(&self, value: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            P::Eq(other) => value == other,
            P::Neq(other) => value != other,
            P::Lt(other) => value.compare(other) == Less,
            P::Lte(other) => value.compare(other) != Greater,
            P::Gt(other) => value.compare(other) == Greater,
            P::Gte(other) => value.compare(other) != Less,
            P::Inside(low, high) => {
                value.compare(low) == Greater && value.compare(high) == Less
            }
            P::Outside(low, high) => {
                value.compare(low) == Less || value.compare(high) == Greater
            }
            P::Between(low, high) => {
                value.compare(low) != Less && value.compare(high) == Less
            }
            P::Within(values) => values.contains(value),
            P::Without(values) => !values.contains(value),
            P::And(a, b) => a.test(value) && b.test(value),
            P::Or(a, b) => a.test(value) || b.test(value),
            P::Not(inner) => !inner.test(value),
            P::Text(text) => text.test(value),
        }
    }

    /// The label keys referenced when this predicate is used inside
    /// `where()`: every string operand is read as a binding name there.
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        let mut push = |v: &Value| {
            if let Value::String(s) = v {
                if !keys.contains(s) {
                    keys.push(s.clone());
                }
            }
        };
        match self {
            P::Eq(v) | P::Neq(v) | P::Lt(v) | P::Lte(v) | P::Gt(v) | P::Gte(v) => push(v),
            P::Inside(a, b) | P::Outside(a, b) | P::Between(a, b) => {
                push(a);
                push(b);
            }
            P::Within(values) | P::Without(values) => values.iter().for_each(push),
            P::And(a, b) | P::Or(a, b) => {
                a.collect_keys(keys);
                b.collect_keys(keys);
            }
            P::Not(inner) => inner.collect_keys(keys),
            P::Text(_) => {}
        }
    }

    /// Rewrite every string operand through `resolve`, for `where()`
    /// evaluation where operands are binding names.
    pub fn resolve_operands<F>(&self, resolve: &F) -> Option<P>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let map = |v: &Value| -> Option<Value> {
            match v {
                Value::String(s) => resolve(s),
                other => Some(other.clone()),
            }
        };
        Some(match self {
            P::Eq(v) => P::Eq(map(v)?),
            P::Neq(v) => P::Neq(map(v)?),
            P::Lt(v) => P::Lt(map(v)?),
            P::Lte(v) => P::Lte(map(v)?),
            P::Gt(v) => P::Gt(map(v)?),
            P::Gte(v) => P::Gte(map(v)?),
            P::Inside(a, b) => P::Inside(map(a)?, map(b)?),
            P::Outside(a, b) => P::Outside(map(a)?, map(b)?),
            P::Between(a, b) => P::Between(map(a)?, map(b)?),
            P::Within(values) => P::Within(values.iter().map(&map).collect::<Option<Vec<_>>>()?),
            P::Without(values) => P::Without(values.iter().map(&map).collect::<Option<Vec<_>>>()?),
            P::And(a, b) => P::And(
                Box::new(a.resolve_operands(resolve)?),
                Box::new(b.resolve_operands(resolve)?),
            ),
            P::Or(a, b) => P::Or(
                Box::new(a.resolve_operands(resolve)?),
                Box::new(b.resolve_operands(resolve)?),
            ),
            P::Not(inner) => P::Not(Box::new(inner.resolve_operands(resolve)?)),
            P::Text(t) => P::Text(t.clone()),
        })
    }
}

/// Text predicates over string values; non-strings never match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextP {
    StartingWith(String),
    NotStartingWith(String),
    EndingWith(String),
    NotEndingWith(String),
    Containing(String),
    NotContaining(String),
    Regex(RegexPattern),
}

impl TextP {
    /// Validates and compiles `pattern` once; an invalid pattern is a
    /// construction error, not a silent non-match.
    pub fn regex(pattern: &str) -> Result<TextP, TraversalError> {
        Ok(TextP::Regex(RegexPattern::compile(pattern)?))
    }

    pub fn test(&self, value: &Value) -> bool {
        let Some(s) = value.as_str() else {
            return false;
        };
        match self {
            TextP::StartingWith(p) => s.starts_with(p),
            TextP::NotStartingWith(p) => !s.starts_with(p),
            TextP::EndingWith(p) => s.ends_with(p),
            TextP::NotEndingWith(p) => !s.ends_with(p),
            TextP::Containing(p) => s.contains(p),
            TextP::NotContaining(p) => !s.contains(p),
            TextP::Regex(pattern) => pattern.is_match(s),
        }
    }
}

/// A regex held alongside its source pattern. Compilation happens exactly
/// once, at construction or deserialization.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    source: String,
    compiled: regex::Regex,
}

impl RegexPattern {
    pub fn compile(pattern: &str) -> Result<Self, TraversalError> {
        let compiled = regex::Regex::new(pattern).map_err(|err| {
            TraversalError::IllegalConstruction(format!("invalid regex '{}': {}", pattern, err))
        })?;
        Ok(Self { source: pattern.to_string(), compiled })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.compiled.is_match(s)
    }
}

// Equality and the wire form are both the source pattern.
impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for RegexPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for RegexPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        RegexPattern::compile(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_predicates() {
        assert!(P::inside(1i64, 5i64).test(&Value::Int(3)));
        assert!(!P::inside(1i64, 5i64).test(&Value::Int(5)));
        assert!(P::between(1i64, 5i64).test(&Value::Int(1)));
        assert!(!P::between(1i64, 5i64).test(&Value::Int(5)));
        assert!(P::outside(1i64, 5i64).test(&Value::Int(0)));
    }

    #[test]
    fn eq_null_is_a_real_predicate() {
        assert!(P::Eq(Value::Null).test(&Value::Null));
        assert!(!P::Eq(Value::Null).test(&Value::Int(0)));
    }

    #[test]
    fn connective_composition() {
        let p = P::gt(1i64).and(P::lt(5i64));
        assert!(p.test(&Value::Int(3)));
        assert!(!p.test(&Value::Int(5)));
        assert!(P::eq(1i64).or(P::eq(2i64)).test(&Value::Int(2)));
    }

    #[test]
    fn text_predicates() {
        assert!(TextP::Containing("ark".to_string()).test(&Value::from("marko")));
        assert!(!TextP::StartingWith("x".to_string()).test(&Value::from("marko")));
        assert!(!TextP::Containing("a".to_string()).test(&Value::Int(1)));
    }

    #[test]
    fn regex_compiles_once_and_matches() {
        let p = TextP::regex("^m.*o$").unwrap();
        assert!(p.test(&Value::from("marko")));
        assert!(!p.test(&Value::from("josh")));
        assert!(!p.test(&Value::Int(1)));
    }

    #[test]
    fn invalid_regex_is_a_construction_error() {
        let err = TextP::regex("[unclosed").unwrap_err();
        assert!(matches!(err, TraversalError::IllegalConstruction(_)));
    }
}
