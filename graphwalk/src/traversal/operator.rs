// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Associative binary operators over values
//!
//! These drive every fold in the engine: reducing barriers, sack merges,
//! and side-effect aggregation. Each operator is associative so partial
//! results can be combined in any grouping.

use serde::{Deserialize, Serialize};

use crate::structure::value::Value;
use crate::traversal::TraversalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Keep the right operand.
    Assign,
    Sum,
    Minus,
    Mult,
    Div,
    Min,
    Max,
    /// Boolean conjunction.
    And,
    /// Boolean disjunction.
    Or,
    /// Collection merge: list/set concatenation, map union.
    AddAll,
    /// Integer-only summation for counters.
    SumLong,
}

fn numeric_pair(op: Operator, a: &Value, b: &Value) -> Result<(f64, f64), TraversalError> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(TraversalError::IllegalState(format!(
            "{:?} operator requires numeric operands, found {} and {}",
            op,
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

fn both_int(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Int(_), Value::Int(_)))
}

impl Operator {
    pub fn apply(self, a: Value, b: Value) -> Result<Value, TraversalError> {
        match self {
            Operator::Assign => Ok(b),
            Operator::Sum => {
                if both_int(&a, &b) {
                    match (a, b) {
                        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
                        _ => unreachable!(),
                    }
                } else {
                    let (x, y) = numeric_pair(self, &a, &b)?;
                    Ok(Value::Float(x + y))
                }
            }
            Operator::Minus => {
                if both_int(&a, &b) {
                    match (a, b) {
                        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x - y)),
                        _ => unreachable!(),
                    }
                } else {
                    let (x, y) = numeric_pair(self, &a, &b)?;
                    Ok(Value::Float(x - y))
                }
            }
            Operator::Mult => {
                if both_int(&a, &b) {
                    match (a, b) {
                        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x * y)),
                        _ => unreachable!(),
                    }
                } else {
                    let (x, y) = numeric_pair(self, &a, &b)?;
                    Ok(Value::Float(x * y))
                }
            }
            Operator::Div => {
                let (x, y) = numeric_pair(self, &a, &b)?;
                Ok(Value::Float(x / y))
            }
            Operator::Min => Ok(if b.compare(&a) == std::cmp::Ordering::Less { b } else { a }),
            Operator::Max => Ok(if b.compare(&a) == std::cmp::Ordering::Greater { b } else { a }),
            Operator::And => match (a.as_bool(), b.as_bool()) {
                (Some(x), Some(y)) => Ok(Value::Bool(x && y)),
                _ => Err(TraversalError::IllegalState(
                    "and operator requires boolean operands".to_string(),
                )),
            },
            Operator::Or => match (a.as_bool(), b.as_bool()) {
                (Some(x), Some(y)) => Ok(Value::Bool(x || y)),
                _ => Err(TraversalError::IllegalState(
                    "or operator requires boolean operands".to_string(),
                )),
            },
            Operator::AddAll => match (a, b) {
                (Value::List(mut x), Value::List(y)) => {
                    x.extend(y);
                    Ok(Value::List(x))
                }
                (Value::List(mut x), other) => {
                    x.push(other);
                    Ok(Value::List(x))
                }
                (Value::Set(mut x), Value::Set(y)) => {
                    x.extend(y);
                    Ok(Value::Set(x))
                }
                (Value::Set(mut x), other) => {
                    x.insert(other);
                    Ok(Value::Set(x))
                }
                (Value::Map(mut x), Value::Map(y)) => {
                    x.extend(y);
                    Ok(Value::Map(x))
                }
                (Value::Null, other) => Ok(other),
                (a, b) => Err(TraversalError::IllegalState(format!(
                    "addAll operator requires collection operands, found {} and {}",
                    a.kind_name(),
                    b.kind_name()
                ))),
            },
            Operator::SumLong => match (a, b) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
                (a, b) => Err(TraversalError::IllegalState(format!(
                    "sumLong operator requires integer operands, found {} and {}",
                    a.kind_name(),
                    b.kind_name()
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_preserves_int_until_float_appears() {
        assert_eq!(
            Operator::Sum.apply(Value::Int(1), Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            Operator::Sum.apply(Value::Int(1), Value::Float(2.5)).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn min_max_are_order_based() {
        assert_eq!(
            Operator::Min.apply(Value::from("b"), Value::from("a")).unwrap(),
            Value::from("a")
        );
        assert_eq!(
            Operator::Max.apply(Value::Int(1), Value::Float(1.5)).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn non_numeric_sum_is_an_error() {
        assert!(Operator::Sum.apply(Value::from("a"), Value::Int(1)).is_err());
    }
}
