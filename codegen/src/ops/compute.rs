//! Constants and compute steps.

use snafu::ResultExt;
use strata_device::Sequence;
use strata_ir::{Instruction, Op};

use super::{Lowered, expanded_operand, output_variable};
use crate::context::CompilationContext;
use crate::error::*;
use crate::tensor_map::TensorMap;

pub fn constant(cx: &mut CompilationContext<'_>, _map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::Constant { values } = &inst.op else {
        panic!("{} is not a constant", inst.name);
    };
    let Some(element_type) = inst.shape.element_type() else {
        return UnimplementedSnafu { instruction: &inst.name, reason: "tuple constants are not supported" }.fail();
    };
    let tensor = cx
        .graph
        .add_constant(element_type, inst.shape.dims(), values, &inst.name)
        .context(DeviceSnafu { instruction: &inst.name })?;
    Ok(Lowered::forward(vec![tensor]))
}

fn step_name(op: &Op) -> String {
    match op {
        Op::Unary(op) => op.to_string(),
        Op::Binary(op) => op.to_string(),
        Op::Compare(direction) => format!("compare-{direction}"),
        other => other.kind().to_string(),
    }
}

/// Unary, binary, compare, select and convert: one compute step over every operand.
pub fn elementwise(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let mut seq = Sequence::new();
    let inputs = (0..inst.operand_count())
        .map(|index| expanded_operand(cx, map, inst, index, &mut seq))
        .collect::<Result<Vec<_>>>()?;
    let output = output_variable(cx, inst)?;
    seq.add(cx.graph.compute(&step_name(&inst.op), &inputs, std::slice::from_ref(&output)));
    Ok(Lowered::new(seq, vec![output]))
}

pub fn iota(cx: &mut CompilationContext<'_>, _map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let output = output_variable(cx, inst)?;
    let mut seq = Sequence::new();
    seq.add(cx.graph.compute("iota", &[], std::slice::from_ref(&output)));
    Ok(Lowered::new(seq, vec![output]))
}

pub fn dot(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::Dot { lhs_contracting, rhs_contracting } = &inst.op else {
        panic!("{} is not a dot", inst.name);
    };
    if lhs_contracting.len() != 1 || rhs_contracting.len() != 1 {
        return UnimplementedSnafu {
            instruction: &inst.name,
            reason: "dot products need exactly one contracting dimension per operand",
        }
        .fail();
    }
    let mut seq = Sequence::new();
    let lhs = expanded_operand(cx, map, inst, 0, &mut seq)?;
    let rhs = expanded_operand(cx, map, inst, 1, &mut seq)?;
    let output = output_variable(cx, inst)?;
    seq.add(cx.graph.compute("dot", &[lhs, rhs], std::slice::from_ref(&output)));
    Ok(Lowered::new(seq, vec![output]))
}
