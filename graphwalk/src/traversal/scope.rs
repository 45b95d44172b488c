// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scope and branch-pick tokens.

use serde::{Deserialize, Serialize};

/// Whether a step operates over the whole stream or within each
/// traverser's own collection value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Local,
}

/// Branch option selector for `branch()`/`choose()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pick {
    /// Taken by every traverser regardless of the branch choice.
    Any,
    /// Taken only when no token option matched.
    None,
    /// Taken when the branch choice equals this token.
    Token(crate::structure::value::Value),
}
