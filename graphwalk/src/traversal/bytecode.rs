// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bytecode recording
//!
//! Every DSL builder call appends a `(step_name, args…)` record before the
//! real step is constructed, so a traversal can be replayed on a different
//! runtime. The wire encoding itself is out of scope; the instruction log
//! and the step-name vocabulary are the stable contract surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub operator: String,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    source_instructions: Vec<Instruction>,
    step_instructions: Vec<Instruction>,
}

/// Best-effort serialization of one bytecode argument. Arguments that
/// cannot be represented (e.g. closures) record as null.
pub fn arg<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, operator: &str, args: Vec<serde_json::Value>) {
        self.source_instructions.push(Instruction { operator: operator.to_string(), args });
    }

    pub fn add_step(&mut self, operator: &str, args: Vec<serde_json::Value>) {
        self.step_instructions.push(Instruction { operator: operator.to_string(), args });
    }

    pub fn source_instructions(&self) -> &[Instruction] {
        &self.source_instructions
    }

    pub fn step_instructions(&self) -> &[Instruction] {
        &self.step_instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_call_order() {
        let mut bc = Bytecode::new();
        bc.add_source("withSideEffect", vec![arg(&"x")]);
        bc.add_step("V", vec![]);
        bc.add_step("out", vec![arg(&"knows")]);
        assert_eq!(bc.source_instructions().len(), 1);
        let ops: Vec<&str> =
            bc.step_instructions().iter().map(|i| i.operator.as_str()).collect();
        assert_eq!(ops, vec!["V", "out"]);
    }
}
