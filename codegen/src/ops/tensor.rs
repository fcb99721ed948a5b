//! Views, tuples, copies and inplace updates.
//!
//! Views alias their operand's storage. Forwarding instructions hand out the
//! operand's tensors after inplace materialization, so a later writer never clobbers
//! a value somebody else still reads.

use snafu::ResultExt;
use strata_device::Sequence;
use strata_ir::{Instruction, Op};

use super::{Lowered, copy_leaves, expanded_operand};
use crate::context::CompilationContext;
use crate::error::*;
use crate::inplace::materialize_inplace_operands;
use crate::tensor_map::TensorMap;

fn forward_inplace(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let mut seq = Sequence::new();
    let outputs = materialize_inplace_operands(cx, map, inst, &mut seq)?.into_iter().flatten().collect();
    Ok(Lowered::new(seq, outputs))
}

pub fn tuple(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    forward_inplace(cx, map, inst)
}

pub fn get_tuple_element(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    forward_inplace(cx, map, inst)
}

/// Forwards operand 0; the other operands only order the schedule.
pub fn add_dependency(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    forward_inplace(cx, map, inst)
}

pub fn after_all(_cx: &mut CompilationContext<'_>, _map: &TensorMap, _inst: &Instruction) -> Result<Lowered> {
    Ok(Lowered::default())
}

pub fn copy(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let inputs = map.lookup_all(cx.module.operand(inst.id, 0))?;
    let mut seq = Sequence::new();
    let outputs = copy_leaves(cx, inst, &inputs, &mut seq)?;
    Ok(Lowered::new(seq, outputs))
}

pub fn reshape(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let source = map.lookup_one(cx.module.operand(inst.id, 0), 0)?;
    let view = cx.graph.reshape(&source, inst.shape.dims()).context(DeviceSnafu { instruction: &inst.name })?;
    Ok(Lowered::forward(vec![view]))
}

pub fn transpose(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::Transpose { permutation } = &inst.op else {
        panic!("{} is not a transpose", inst.name);
    };
    let source = map.lookup_one(cx.module.operand(inst.id, 0), 0)?;
    let view = cx.graph.transpose(&source, permutation).context(DeviceSnafu { instruction: &inst.name })?;
    Ok(Lowered::forward(vec![view]))
}

pub fn broadcast(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::Broadcast { dimensions } = &inst.op else {
        panic!("{} is not a broadcast", inst.name);
    };
    let source = map.lookup_one(cx.module.operand(inst.id, 0), 0)?;
    let view = cx
        .graph
        .broadcast(&source, inst.shape.dims(), dimensions)
        .context(DeviceSnafu { instruction: &inst.name })?;
    Ok(Lowered::forward(vec![view]))
}

pub fn bitcast_convert(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Some(element_type) = inst.shape.element_type() else {
        return UnimplementedSnafu { instruction: &inst.name, reason: "bitcast of a tuple" }.fail();
    };
    let mut seq = Sequence::new();
    let source = materialize_inplace_operands(cx, map, inst, &mut seq)?.into_iter().flatten().next();
    let Some(source) = source else {
        panic!("{} has no inplace operand", inst.name);
    };
    let view = cx.graph.reinterpret(&source, element_type).context(DeviceSnafu { instruction: &inst.name })?;
    Ok(Lowered::new(seq, vec![view]))
}

/// Writes the update into operand 0 and forwards it.
pub fn dynamic_update_slice(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let mut seq = Sequence::new();
    let target = materialize_inplace_operands(cx, map, inst, &mut seq)?.into_iter().flatten().next();
    let Some(target) = target else {
        panic!("{} has no inplace operand", inst.name);
    };
    let inputs = (1..inst.operand_count())
        .map(|index| expanded_operand(cx, map, inst, index, &mut seq))
        .collect::<Result<Vec<_>>>()?;
    seq.add(cx.graph.compute("dynamic-update-slice", &inputs, std::slice::from_ref(&target)));
    Ok(Lowered::new(seq, vec![target]))
}
