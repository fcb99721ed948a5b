//! Inplace classification.
//!
//! Some opcodes reuse the storage of selected operands for their output instead of
//! allocating. Forwarding opcodes (tuple, get-tuple-element, add-dependency and
//! bitcast-convert) only alias their operands; the others write into them.
//!
//! [`find_inplace_instructions`] decides which inplace-type instructions may actually
//! run in place: a writing instruction may not clobber a value that is still read
//! later in the schedule, directly or through a view (reshape, transpose, broadcast)
//! or forwarding instruction sharing its storage.

use std::collections::BTreeSet;

use smallvec::{SmallVec, smallvec};
use tracing::trace;

use crate::config::CallConfig;
use crate::instruction::{InstId, Instruction};
use crate::module::Module;
use crate::op::{Op, OpKind};

/// Operand positions an instruction may update or alias in place, or `None` when the
/// opcode is not an inplace type.
pub fn inplace_operand_indices(module: &Module, inst: &Instruction) -> Option<SmallVec<[usize; 4]>> {
    match &inst.op {
        Op::GetTupleElement { .. } | Op::AddDependency | Op::BitcastConvert | Op::DynamicUpdateSlice => {
            Some(smallvec![0])
        }
        Op::Tuple => Some((0..inst.operand_count()).collect()),
        Op::CustomCall { inplace_operands, .. } if !inplace_operands.is_empty() => {
            Some(inplace_operands.iter().copied().collect())
        }
        Op::Call { .. } => match inst.call_config()? {
            CallConfig::PipelineStage { .. }
            | CallConfig::PipelineStageBackward { .. }
            | CallConfig::PipelineStageRecomputation { .. } => Some(
                inst.operands
                    .iter()
                    .enumerate()
                    .filter(|(_, operand)| module.instruction(**operand).kind() != OpKind::Parameter)
                    .map(|(index, _)| index)
                    .collect(),
            ),
            CallConfig::Pipeline { .. } | CallConfig::Inline => Some((0..inst.operand_count()).collect()),
            CallConfig::Function => None,
        },
        _ => None,
    }
}

pub fn is_inplace_type(module: &Module, inst: &Instruction) -> bool {
    inplace_operand_indices(module, inst).is_some()
}

/// Whether the instruction only aliases its inplace operands without writing them.
pub fn is_forwarding(inst: &Instruction) -> bool {
    matches!(inst.kind(), OpKind::GetTupleElement | OpKind::Tuple | OpKind::AddDependency | OpKind::BitcastConvert)
}

/// Instructions that may run in place.
#[tracing::instrument(skip_all, fields(module = module.name()))]
pub fn find_inplace_instructions(module: &Module) -> BTreeSet<InstId> {
    let mut result = BTreeSet::new();
    for computation in module.computations() {
        for inst in module.schedule(computation.id) {
            let Some(indices) = inplace_operand_indices(module, inst) else { continue };
            let eligible = is_forwarding(inst)
                || indices.iter().all(|&index| !is_live_after(module, inst.operand(index), inst.id));
            trace!(instruction = %inst.name, eligible, "inplace classification");
            if eligible {
                result.insert(inst.id);
            }
        }
    }
    result
}

/// Whether the instruction is lowered as a view sharing the storage of its operand.
pub fn is_view(inst: &Instruction) -> bool {
    matches!(inst.kind(), OpKind::Reshape | OpKind::Transpose | OpKind::Broadcast)
}

/// Operands whose storage `inst` shares with its output.
fn aliased_operands(module: &Module, inst: &Instruction) -> SmallVec<[InstId; 4]> {
    if is_view(inst) {
        smallvec![inst.operand(0)]
    } else if is_forwarding(inst) {
        let indices = inplace_operand_indices(module, inst).unwrap_or_default();
        indices.iter().map(|&index| inst.operand(index)).collect()
    } else {
        SmallVec::new()
    }
}

/// Whether the storage of `value` is still needed after `writer` runs: it or a value
/// sharing its storage is read after `writer`, or is the root.
fn is_live_after(module: &Module, value: InstId, writer: InstId) -> bool {
    if is_read_after(module, value, writer) {
        return true;
    }
    let inst = module.instruction(value);
    aliased_operands(module, inst).iter().any(|&operand| is_live_after(module, operand, writer))
}

/// Whether `value`, or a view or forwarding user of it other than `writer`, is the root
/// or is read after `writer` in the schedule.
fn is_read_after(module: &Module, value: InstId, writer: InstId) -> bool {
    if module.is_root(value) {
        return true;
    }
    let writer_position = module.schedule_position(writer);
    module.users(value).iter().filter(|&&user| user != writer).any(|&user| {
        if module.schedule_position(user) > writer_position {
            return true;
        }
        let user_inst = module.instruction(user);
        aliased_operands(module, user_inst).contains(&value) && is_read_after(module, user, writer)
    })
}
