//! Tensor binding table.
//!
//! Every flat output slot of a lowered instruction is bound exactly once to the
//! tensor it lives in. Tuple-shaped values occupy a contiguous slot range, so looking
//! up an element of a tuple is a range query.

use std::collections::BTreeMap;
use std::ops::Range;

use snafu::{OptionExt, ensure};
use strata_device::TensorHandle;
use strata_ir::{InstId, Instruction};
use tracing::trace;

use crate::error::*;

#[derive(Debug, Clone, Default)]
pub struct TensorMap {
    tensors: BTreeMap<(InstId, usize), TensorHandle>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, inst: &Instruction, slot: usize, tensor: TensorHandle) -> Result<()> {
        ensure!(
            !self.tensors.contains_key(&(inst.id, slot)),
            AlreadyBoundSnafu { instruction: inst.name.clone(), slot }
        );
        trace!(instruction = %inst.name, slot, tensor = %tensor, "bind");
        self.tensors.insert((inst.id, slot), tensor);
        Ok(())
    }

    /// Bind `tensors` to slots `0..tensors.len()`.
    pub fn bind_all(&mut self, inst: &Instruction, tensors: impl IntoIterator<Item = TensorHandle>) -> Result<()> {
        tensors.into_iter().enumerate().try_for_each(|(slot, tensor)| self.bind(inst, slot, tensor))
    }

    pub fn lookup_one(&self, inst: &Instruction, slot: usize) -> Result<TensorHandle> {
        self.tensors.get(&(inst.id, slot)).cloned().context(NotBoundSnafu { instruction: inst.name.clone(), slot })
    }

    /// Tensors of `slots`, in slot order.
    pub fn lookup_range(&self, inst: &Instruction, slots: Range<usize>) -> Result<Vec<TensorHandle>> {
        slots.map(|slot| self.lookup_one(inst, slot)).collect()
    }

    /// Tensors of every slot of `inst`.
    pub fn lookup_all(&self, inst: &Instruction) -> Result<Vec<TensorHandle>> {
        self.lookup_range(inst, 0..inst.leaf_count())
    }

    pub fn get(&self, id: InstId, slot: usize) -> Option<&TensorHandle> {
        self.tensors.get(&(id, slot))
    }

    pub fn contains(&self, id: InstId, slot: usize) -> bool {
        self.tensors.contains_key(&(id, slot))
    }

    /// Entries ordered by instruction, then slot.
    pub fn iter(&self) -> impl Iterator<Item = (InstId, usize, &TensorHandle)> {
        self.tensors.iter().map(|(&(id, slot), tensor)| (id, slot, tensor))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}
