// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bulk-synchronous staging
//!
//! `barrier(max_size)` buffers traversers purely to create a
//! synchronization point between pipeline phases. Buffering coalesces
//! equal traversers by bulk, which is the step's practical payoff: a
//! barrier in front of an expensive phase compresses duplicate work.

use crate::step::{step_common, Step, StepMeta, StepOut};
use crate::traversal::{TraversalContext, TraversalError};
use crate::traverser::{Traverser, TraverserSet};

#[derive(Debug, Clone)]
pub struct NoOpBarrierStep {
    meta: StepMeta,
    max_size: Option<usize>,
    buffer: TraverserSet,
    draining: bool,
}

impl NoOpBarrierStep {
    /// Unbounded when `max_size` is absent.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            meta: StepMeta::default(),
            max_size,
            buffer: TraverserSet::new(),
            draining: false,
        }
    }

    fn at_capacity(&self) -> bool {
        self.max_size.is_some_and(|cap| self.buffer.len() >= cap)
    }
}

impl Step for NoOpBarrierStep {
    step_common!("barrier");

    fn add_start(&mut self, traverser: Traverser) {
        self.buffer.add(traverser);
    }

    fn pull(
        &mut self,
        _ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        if !self.draining {
            if !upstream_done && !self.at_capacity() {
                return Ok(StepOut::NeedMore);
            }
            log::debug!("barrier draining {} traverser(s)", self.buffer.len());
            self.draining = true;
        }
        match self.buffer.pop() {
            Some(traverser) => {
                if self.buffer.is_empty() {
                    // This batch is done; start filling the next one.
                    self.buffer.clear();
                    self.draining = false;
                }
                Ok(StepOut::Emit(traverser))
            }
            None => {
                self.buffer.clear();
                self.draining = false;
                Ok(if upstream_done { StepOut::Done } else { StepOut::NeedMore })
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::value::Value;
    use crate::traverser::side_effects::new_handle;

    #[test]
    fn barrier_coalesces_equal_traversers() {
        let mut step = NoOpBarrierStep::new(None);
        let ctx = TraversalContext::new(new_handle());
        for _ in 0..4 {
            step.add_start(Traverser::new(Value::Int(1), new_handle(), false, None));
        }
        match step.pull(&ctx, true).unwrap() {
            StepOut::Emit(t) => assert_eq!(t.bulk(), 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(step.pull(&ctx, true).unwrap(), StepOut::Done));
    }

    #[test]
    fn bounded_barrier_flushes_at_capacity() {
        let mut step = NoOpBarrierStep::new(Some(2));
        let ctx = TraversalContext::new(new_handle());
        step.add_start(Traverser::new(Value::Int(1), new_handle(), false, None));
        assert!(matches!(step.pull(&ctx, false).unwrap(), StepOut::NeedMore));
        step.add_start(Traverser::new(Value::Int(2), new_handle(), false, None));
        assert!(matches!(step.pull(&ctx, false).unwrap(), StepOut::Emit(_)));
    }
}
