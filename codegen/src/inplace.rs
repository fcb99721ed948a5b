//! Inplace operand materialization.
//!
//! An inplace instruction writes into (or aliases) the tensors of its inplace
//! operands. That is only safe when the instruction survived the inplace eligibility
//! pass and the tensor is parallel writeable; every other tensor is replaced by a
//! fresh clone and a copy is emitted before the instruction runs.

use snafu::ResultExt;
use strata_device::{Sequence, TensorHandle};
use strata_ir::analysis::inplace_operand_indices;
use strata_ir::{Instruction, Module, Op};
use tracing::trace;

use crate::context::CompilationContext;
use crate::error::*;
use crate::tensor_map::TensorMap;

/// Tensors of every inplace operand, one list per operand. A get-tuple-element only
/// takes the slots of the element it extracts.
fn inplace_tensors(module: &Module, map: &TensorMap, inst: &Instruction) -> Result<Vec<Vec<TensorHandle>>> {
    let Some(indices) = inplace_operand_indices(module, inst) else {
        panic!("{} is lowered in place, but it is not an inplace operation", inst.name);
    };

    if let Op::GetTupleElement { index } = inst.op {
        let operand = module.operand(inst.id, 0);
        let Some(slots) = operand.shape.tuple_slot_range(index) else {
            panic!("{} extracts element {index} of non-tuple {}", inst.name, operand.name);
        };
        return Ok(vec![map.lookup_range(operand, slots)?]);
    }

    indices.iter().map(|&index| map.lookup_all(module.operand(inst.id, index))).collect()
}

/// Whether `inst` may write its inplace operands without copying any of them.
pub fn is_writable(cx: &CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<bool> {
    if !cx.is_inplace(inst.id) {
        return Ok(false);
    }
    Ok(inplace_tensors(cx.module, map, inst)?.iter().flatten().all(|tensor| tensor.parallel_writeable))
}

/// Tensors `inst` may write, one list per inplace operand. Copies for tensors that
/// cannot be written are appended to `seq`.
pub fn materialize_inplace_operands(
    cx: &mut CompilationContext<'_>,
    map: &TensorMap,
    inst: &Instruction,
    seq: &mut Sequence,
) -> Result<Vec<Vec<TensorHandle>>> {
    let eligible = cx.is_inplace(inst.id);
    let mut tensors = inplace_tensors(cx.module, map, inst)?;

    for (position, leaves) in tensors.iter_mut().enumerate() {
        for (leaf, tensor) in leaves.iter_mut().enumerate() {
            if eligible && tensor.parallel_writeable {
                continue;
            }
            trace!(instruction = %inst.name, position, leaf, tensor = %tensor, eligible, "copy inplace operand");
            let clone = cx
                .graph
                .clone_tensor(tensor, &format!("{}.clone", inst.name))
                .context(DeviceSnafu { instruction: &inst.name })?;
            seq.add(cx.graph.copy(tensor, &clone).context(DeviceSnafu { instruction: &inst.name })?);
            *tensor = clone;
        }
    }
    Ok(tensors)
}
