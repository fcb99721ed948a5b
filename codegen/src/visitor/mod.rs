//! Lowering visitor.
//!
//! A [`Visitor`] walks the schedule of one computation once. For every instruction it
//! selects the instruction's shard, keeps stochastic rounding in sync with the
//! instruction's setting, and lowers the instruction through its [`Boundary`] or the
//! opcode table. The program fragments are appended to the visitor's sequence in
//! schedule order and the outputs are bound in its [`TensorMap`].
//!
//! Boundaries hold whatever differs between computations: where parameter tensors
//! come from, which instructions they route themselves and what happens after the
//! root.
//!
//! # Deferred allocation
//!
//! A parameter leaf whose allocation target sits behind get-tuple-element
//! instructions is not allocated with the parameter. The visitor tracks it until
//! the last get-tuple-element of the path, allocates it there with the consumer's
//! preferred layout, and binds the tensor to the parameter and every forwarding
//! instruction in between.
//!
//! # Module Organization
//!
//! - [`entry`] - Entry computation with host streams and resource handling
//! - [`subcomputation`] - Called computations on fresh or caller tensors
//! - [`pipeline_stage`] - Bodies of pipeline stages
//! - [`pipeline`] - Pipeline computations and their schedule

pub mod entry;
pub mod pipeline;
pub mod pipeline_stage;
pub mod subcomputation;

use std::collections::BTreeMap;
use std::ops::Range;

use snafu::ResultExt;
use strata_device::{Layout, Program, Sequence, TensorHandle};
use strata_ir::analysis::{TargetLayout, TensorSource};
use strata_ir::{ComputationId, Instruction, Module, Op, OpKind};
use tracing::{debug, trace};

use crate::context::CompilationContext;
use crate::error::*;
use crate::ops::lowering_fn;
use crate::tensor_map::TensorMap;

/// Lowering state of one computation.
#[derive(Debug, Clone)]
pub struct VisitorState {
    computation: ComputationId,
    pub tensor_map: TensorMap,
    pub sequence: Sequence,
    pub outputs: Vec<TensorHandle>,
    /// Shard of instructions without a sharding of their own.
    pub shard: u32,
    /// Deferred slots, each mapped to the parameter leaf it forwards.
    deferred: BTreeMap<TensorSource, TensorSource>,
    stochastic_rounding: bool,
}

impl VisitorState {
    fn new(computation: ComputationId, shard: u32) -> Self {
        Self {
            computation,
            tensor_map: TensorMap::new(),
            sequence: Sequence::new(),
            outputs: Vec::new(),
            shard,
            deferred: BTreeMap::new(),
            stochastic_rounding: false,
        }
    }

    pub fn computation(&self) -> ComputationId {
        self.computation
    }

    pub fn bind_outputs(&mut self, inst: &Instruction, outputs: Vec<TensorHandle>) -> Result<()> {
        self.tensor_map.bind_all(inst, outputs)
    }

    /// Postpone allocating parameter leaf `source` until its allocation target.
    pub fn defer(&mut self, source: TensorSource) {
        trace!(instruction = %source.0, slot = source.1, "defer allocation");
        self.deferred.insert(source, source);
    }

    pub fn is_deferred(&self, source: TensorSource) -> bool {
        self.deferred.contains_key(&source)
    }

    /// Slots still waiting for their allocation.
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }
}

/// What a visitor does at the edges of its computation.
pub trait Boundary {
    /// Bind the tensors of parameter `inst`, or defer some of its leaves.
    fn parameter(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<()>;

    /// A deferred leaf `slot` of `parameter` was allocated. Returns the tensor bound
    /// for the parameter and its forwarding path.
    fn deferred_input(
        &mut self,
        _cx: &mut CompilationContext<'_>,
        _state: &mut VisitorState,
        _parameter: &Instruction,
        _slot: usize,
        tensor: TensorHandle,
    ) -> Result<TensorHandle> {
        Ok(tensor)
    }

    /// Lower `inst` in place of the opcode table. Returns whether it did.
    fn lower(
        &mut self,
        _cx: &mut CompilationContext<'_>,
        _state: &mut VisitorState,
        _inst: &Instruction,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Called once after the last instruction; sets the computation outputs.
    fn finish(&mut self, _cx: &mut CompilationContext<'_>, state: &mut VisitorState, root: &Instruction) -> Result<()> {
        state.outputs = state.tensor_map.lookup_all(root)?;
        Ok(())
    }

    /// Whether per-instruction stochastic rounding settings are applied.
    fn tracks_stochastic_rounding(&self) -> bool {
        true
    }
}

pub struct Visitor<B> {
    state: VisitorState,
    boundary: B,
}

impl<B: Boundary> Visitor<B> {
    pub fn new(computation: ComputationId, shard: u32, boundary: B) -> Self {
        Self { state: VisitorState::new(computation, shard), boundary }
    }

    #[tracing::instrument(skip_all, fields(computation = %cx.module.computation(self.state.computation).name))]
    pub fn accept(&mut self, cx: &mut CompilationContext<'_>) -> Result<()> {
        let module = cx.module;
        let computation = module.computation(self.state.computation);
        let default_rounding = cx.options.stochastic_rounding;
        let tracks_rounding = self.boundary.tracks_stochastic_rounding();
        self.state.stochastic_rounding = default_rounding;

        for inst in module.schedule(computation.id) {
            trace!(instruction = %inst.name, kind = %inst.kind(), "visit");
            let shard = inst.sharding.unwrap_or(self.state.shard);
            cx.graph.select_shard(shard).context(DeviceSnafu { instruction: &inst.name })?;
            if tracks_rounding {
                self.sync_stochastic_rounding(inst.backend_config.stochastic_rounding.resolve(default_rounding));
            }
            self.visit(cx, inst)?;
        }

        let root = module.instruction(computation.root);
        self.boundary.finish(cx, &mut self.state, root)?;
        if tracks_rounding {
            self.sync_stochastic_rounding(default_rounding);
        }
        cx.tensor_maps.insert(computation.name.clone(), self.state.tensor_map.clone());
        debug!(
            instructions = computation.instruction_count(),
            outputs = self.state.outputs.len(),
            programs = self.state.sequence.len(),
            "computation lowered"
        );
        Ok(())
    }

    fn sync_stochastic_rounding(&mut self, enabled: bool) {
        if self.state.stochastic_rounding != enabled {
            self.state.sequence.add(Program::SetStochasticRounding(enabled));
            self.state.stochastic_rounding = enabled;
        }
    }

    fn visit(&mut self, cx: &mut CompilationContext<'_>, inst: &Instruction) -> Result<()> {
        if inst.kind() == OpKind::Parameter {
            return self.boundary.parameter(cx, &mut self.state, inst);
        }
        if let Some(slots) = self.deferred_slots(cx.module, inst) {
            return self.lower_deferred_get_tuple_element(cx, inst, slots);
        }
        if self.boundary.lower(cx, &mut self.state, inst)? {
            return Ok(());
        }
        let Some(lower) = lowering_fn(inst.kind()) else {
            return UnimplementedSnafu { instruction: &inst.name, reason: format!("no lowering for {}", inst.kind()) }
                .fail();
        };
        let lowered = lower(cx, &self.state.tensor_map, inst)?;
        self.state.sequence.append(lowered.sequence);
        self.state.bind_outputs(inst, lowered.outputs)
    }

    /// Operand slots of a get-tuple-element, if any of them is deferred.
    fn deferred_slots(&self, module: &Module, inst: &Instruction) -> Option<Range<usize>> {
        let Op::GetTupleElement { index } = inst.op else {
            return None;
        };
        if self.state.deferred.is_empty() {
            return None;
        }
        let operand = module.operand(inst.id, 0);
        let slots = operand.shape.tuple_slot_range(index)?;
        slots.clone().any(|slot| self.state.deferred.contains_key(&(operand.id, slot))).then_some(slots)
    }

    fn lower_deferred_get_tuple_element(
        &mut self,
        cx: &mut CompilationContext<'_>,
        inst: &Instruction,
        slots: Range<usize>,
    ) -> Result<()> {
        let module = cx.module;
        let operand = module.operand(inst.id, 0);
        let eligible = cx.is_inplace(inst.id);
        let leaves = inst.shape.leaves();

        for (slot, operand_slot) in slots.enumerate() {
            let Some(origin) = self.state.deferred.get(&(operand.id, operand_slot)).copied() else {
                let mut tensor = self.state.tensor_map.lookup_one(operand, operand_slot)?;
                if !eligible || !tensor.parallel_writeable {
                    let clone = cx
                        .graph
                        .clone_tensor(&tensor, &format!("{}.clone", inst.name))
                        .context(DeviceSnafu { instruction: &inst.name })?;
                    self.state
                        .sequence
                        .add(cx.graph.copy(&tensor, &clone).context(DeviceSnafu { instruction: &inst.name })?);
                    tensor = clone;
                }
                self.state.tensor_map.bind(inst, slot, tensor)?;
                continue;
            };

            let allocates_here = cx
                .annotations
                .allocation_targets
                .get(&origin)
                .is_some_and(|target| target.path.last() == Some(&inst.id));
            if !allocates_here {
                self.state.deferred.insert((inst.id, slot), origin);
                continue;
            }

            let parameter = module.instruction(origin.0);
            let tensor = allocate_input(cx, &self.state.tensor_map, parameter, origin.1, leaves[slot])?;
            let tensor = self.boundary.deferred_input(cx, &mut self.state, parameter, origin.1, tensor)?;
            trace!(parameter = %parameter.name, slot = origin.1, at = %inst.name, %tensor, "deferred allocation");

            let forwarded: Vec<TensorSource> =
                self.state.deferred.iter().filter(|(_, o)| **o == origin).map(|(source, _)| *source).collect();
            for source in forwarded {
                self.state.deferred.remove(&source);
                self.state.tensor_map.bind(module.instruction(source.0), source.1, tensor.clone())?;
            }
            self.state.tensor_map.bind(inst, slot, tensor)?;
        }
        Ok(())
    }

    pub fn state(&self) -> &VisitorState {
        &self.state
    }

    pub fn outputs(&self) -> &[TensorHandle] {
        &self.state.outputs
    }

    pub fn sequence(&self) -> &Sequence {
        &self.state.sequence
    }

    pub fn tensor_map(&self) -> &TensorMap {
        &self.state.tensor_map
    }

    pub fn boundary(&self) -> &B {
        &self.boundary
    }

    pub fn into_parts(self) -> (VisitorState, B) {
        (self.state, self.boundary)
    }
}

/// Whether parameter leaf `source` can wait for its allocation target: the target
/// sits behind get-tuple-elements, neither the parameter nor any forwarding instruction
/// before the last one is read by anything but get-tuple-elements, and every
/// get-tuple-element extracting the leaf lies on the path.
pub fn can_defer(cx: &CompilationContext<'_>, source: TensorSource) -> bool {
    let Some(target) = cx.annotations.allocation_targets.get(&source) else {
        return false;
    };
    let Some((_, forwarding)) = target.path.split_last() else {
        return false;
    };
    let module = cx.module;
    let mut slot = source.1;
    for (id, &next) in std::iter::once(source.0).chain(forwarding.iter().copied()).zip(&target.path) {
        if module.is_root(id) {
            return false;
        }
        let shape = &module.instruction(id).shape;
        let mut next_slot = None;
        for &user in module.users(id) {
            let Op::GetTupleElement { index } = module.instruction(user).op else {
                return false;
            };
            let Some(range) = shape.tuple_slot_range(index) else {
                return false;
            };
            if !range.contains(&slot) {
                continue;
            }
            if user != next {
                return false;
            }
            next_slot = Some(slot - range.start);
        }
        let Some(next_slot) = next_slot else {
            return false;
        };
        slot = next_slot;
    }
    true
}

/// Fresh tensor for input leaf `slot` of `parameter`, laid out for its allocation
/// target when it has one.
pub fn allocate_input(
    cx: &mut CompilationContext<'_>,
    map: &TensorMap,
    parameter: &Instruction,
    slot: usize,
    shape: &strata_ir::Shape,
) -> Result<TensorHandle> {
    let layout = match cx.annotations.allocation_targets.get(&(parameter.id, slot)) {
        Some(target) => match target.layout {
            TargetLayout::MatMulOperand => Layout::MatMulOperand { operand: target.operand },
            TargetLayout::LikeOperand { other } => map.get(other, 0).map_or(Layout::Linear, |t| Layout::Like(t.id)),
        },
        None => Layout::Linear,
    };
    let Some(element_type) = shape.element_type() else {
        return UnimplementedSnafu { instruction: &parameter.name, reason: "input leaf is not an array" }.fail();
    };
    cx.graph
        .add_variable(element_type, shape.dims(), &format!("{}.{slot}", parameter.name), layout)
        .context(DeviceSnafu { instruction: &parameter.name })
}
