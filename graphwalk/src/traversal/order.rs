// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Order tokens for the `order()` comparators.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::structure::value::Value;

/// Comparator token attached to an `order().by(..)` pair. `Shuffle` is not
/// a comparison at all: if it appears anywhere in a comparator list, the
/// whole list collapses to a seeded random permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
    Shuffle,
}

impl Order {
    pub fn compare(self, a: &Value, b: &Value) -> Ordering {
        match self {
            Order::Asc => a.compare(b),
            Order::Desc => b.compare(a),
            Order::Shuffle => Ordering::Equal,
        }
    }

    pub fn is_shuffle(self) -> bool {
        matches!(self, Order::Shuffle)
    }
}
