//! Pipeline stage bodies.
//!
//! A stage runs on the pipeline's tensors directly. A forward stage that is
//! recomputed later instead reads fresh copies of its non-parameter inputs, so the
//! recomputation can feed the same body again. Stage outputs that alias an input,
//! and every output of a recomputed stage, are copied out.

use std::collections::BTreeSet;

use strata_device::TensorHandle;
use strata_ir::Instruction;

use super::subcomputation::{InputMode, SubComputation};
use super::{Boundary, VisitorState};
use crate::context::CompilationContext;
use crate::error::*;

#[derive(Debug, Clone)]
pub struct PipelineStage {
    inner: SubComputation,
    recomputed: bool,
    output_copies: Vec<bool>,
}

impl PipelineStage {
    /// `fresh` lists the parameters that get fresh storage.
    pub fn new(arguments: Vec<Vec<TensorHandle>>, fresh: BTreeSet<usize>, recomputed: bool) -> Self {
        let mode = if fresh.is_empty() { InputMode::Inplace } else { InputMode::FreshParameters(fresh) };
        Self { inner: SubComputation::new(arguments, mode), recomputed, output_copies: Vec::new() }
    }

    pub fn visitor_inputs(&self) -> Vec<Vec<TensorHandle>> {
        self.inner.visitor_inputs().0
    }

    /// Per output leaf, whether the caller must copy it out.
    pub fn output_copies(&self) -> &[bool] {
        &self.output_copies
    }
}

impl Boundary for PipelineStage {
    fn parameter(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<()> {
        self.inner.parameter(cx, state, inst)
    }

    fn deferred_input(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        parameter: &Instruction,
        slot: usize,
        tensor: TensorHandle,
    ) -> Result<TensorHandle> {
        self.inner.deferred_input(cx, state, parameter, slot, tensor)
    }

    fn finish(&mut self, cx: &mut CompilationContext<'_>, state: &mut VisitorState, root: &Instruction) -> Result<()> {
        self.inner.finish(cx, state, root)?;
        let inputs = self.visitor_inputs();
        self.output_copies = state
            .outputs
            .iter()
            .map(|output| self.recomputed || inputs.iter().flatten().any(|input| input == output))
            .collect();
        Ok(())
    }
}
