//! Custom operation registry.
//!
//! Custom calls are resolved by target name through a [`CustomOpRegistry`] carried by
//! the [`CompilationContext`](crate::CompilationContext). The default registry ships
//! the operations the backend itself emits.

use std::collections::BTreeMap;

use strata_device::Sequence;
use strata_ir::{Instruction, Op};

use crate::context::CompilationContext;
use crate::error::*;
use crate::inplace::materialize_inplace_operands;
use crate::ops::{LowerFn, Lowered, copy_leaves, expanded_operand};
use crate::tensor_map::TensorMap;

pub const SCALED_INPLACE: &str = "scaled_inplace";
pub const RECOMPUTE_CHECKPOINT: &str = "recompute_checkpoint";

#[derive(Debug, Clone)]
pub struct CustomOpRegistry {
    ops: BTreeMap<String, LowerFn>,
}

impl Default for CustomOpRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SCALED_INPLACE, lower_scaled_inplace);
        registry.register(RECOMPUTE_CHECKPOINT, lower_recompute_checkpoint);
        registry
    }
}

impl CustomOpRegistry {
    pub fn empty() -> Self {
        Self { ops: BTreeMap::new() }
    }

    /// Register `lower` for `target`, returning the lowering it replaces.
    pub fn register(&mut self, target: impl Into<String>, lower: LowerFn) -> Option<LowerFn> {
        self.ops.insert(target.into(), lower)
    }

    pub fn get(&self, target: &str) -> Option<LowerFn> {
        self.ops.get(target).copied()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.ops.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }
}

/// `a += scale * b`, written into `a`.
fn lower_scaled_inplace(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let updates_first =
        matches!(&inst.op, Op::CustomCall { inplace_operands, .. } if inplace_operands.as_slice() == [0]);
    if inst.operand_count() != 3 || !updates_first {
        return UnimplementedSnafu {
            instruction: &inst.name,
            reason: format!("{SCALED_INPLACE} takes (a, b, scale) and updates `a` in place"),
        }
        .fail();
    }
    let mut seq = Sequence::new();
    let inplace = materialize_inplace_operands(cx, map, inst, &mut seq)?;
    let Some(target) = inplace.into_iter().flatten().next() else {
        return UnimplementedSnafu { instruction: &inst.name, reason: "operand `a` is not an array" }.fail();
    };
    let b = expanded_operand(cx, map, inst, 1, &mut seq)?;
    let scale = expanded_operand(cx, map, inst, 2, &mut seq)?;
    seq.add(cx.graph.compute(SCALED_INPLACE, &[b, scale], std::slice::from_ref(&target)));
    Ok(Lowered::new(seq, vec![target]))
}

/// Identity barrier between the forward pass and its recomputation.
fn lower_recompute_checkpoint(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let mut seq = Sequence::new();
    if cx.is_inplace(inst.id) {
        let outputs = materialize_inplace_operands(cx, map, inst, &mut seq)?.into_iter().flatten().collect();
        return Ok(Lowered::new(seq, outputs));
    }
    let module = cx.module;
    let inputs = map.lookup_all(module.operand(inst.id, 0))?;
    let outputs = copy_leaves(cx, inst, &inputs, &mut seq)?;
    Ok(Lowered::new(seq, outputs))
}
