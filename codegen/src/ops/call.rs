//! Calls.
//!
//! Function calls are lowered once per callee into a device function with fresh
//! input tensors; each call site copies its arguments in and the results out.
//! Inline calls lower the callee on the caller's tensors. Pipelines get their own
//! visitor and scheduler.

use snafu::ResultExt;
use strata_device::{Program, Sequence, TensorHandle};
use strata_ir::{CallKind, ComputationId, Instruction, Op};
use tracing::debug;

use super::{Lowered, copy_leaves};
use crate::context::{CachedFunction, CompilationContext};
use crate::error::*;
use crate::inplace::materialize_inplace_operands;
use crate::tensor_map::TensorMap;
use crate::visitor::pipeline::lower_pipeline;
use crate::visitor::subcomputation::SubComputation;
use crate::visitor::Visitor;

pub fn call(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    match inst.call_kind()? {
        Some(CallKind::Inline) => inline_call(cx, map, inst),
        Some(CallKind::Pipeline(config)) => lower_pipeline(cx, map, inst, config),
        Some(kind) if kind.is_pipeline_stage() => UnimplementedSnafu {
            instruction: &inst.name,
            reason: "pipeline stages can only be called from a pipeline",
        }
        .fail(),
        _ => function_call(cx, map, inst),
    }
}

pub fn custom_call(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::CustomCall { target, .. } = &inst.op else {
        panic!("{} is not a custom call", inst.name);
    };
    match cx.custom_ops.get(target) {
        Some(lower) => lower(cx, map, inst),
        None => UnknownCustomOpSnafu { instruction: &inst.name, target }.fail(),
    }
}

pub(crate) fn callee(inst: &Instruction) -> ComputationId {
    match inst.op.called_computation() {
        Some(computation) => computation,
        None => panic!("{} does not call a computation", inst.name),
    }
}

fn inline_call(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let mut seq = Sequence::new();
    let arguments = materialize_inplace_operands(cx, map, inst, &mut seq)?;
    let shard = cx.graph.current_shard();
    let mut visitor = Visitor::new(callee(inst), shard, SubComputation::inplace(arguments));
    visitor.accept(cx)?;
    cx.graph.select_shard(shard).context(DeviceSnafu { instruction: &inst.name })?;
    let (state, _) = visitor.into_parts();
    seq.append(state.sequence);
    Ok(Lowered::new(seq, state.outputs))
}

fn lower_function(
    cx: &mut CompilationContext<'_>,
    inst: &Instruction,
    computation: ComputationId,
    arguments: Vec<Vec<TensorHandle>>,
) -> Result<CachedFunction> {
    let module = cx.module;
    let shard = cx.graph.current_shard();
    let mut visitor = Visitor::new(computation, shard, SubComputation::fresh(arguments));
    visitor.accept(cx)?;
    cx.graph.select_shard(shard).context(DeviceSnafu { instruction: &inst.name })?;

    let (state, boundary) = visitor.into_parts();
    let (inputs, used) = boundary.visitor_inputs();
    let name = &module.computation(computation).name;
    let function = cx.graph.add_function(name, state.sequence.into_program());
    debug!(computation = %name, %function, outputs = state.outputs.len(), "function lowered");
    Ok(CachedFunction { function, inputs, used, outputs: state.outputs })
}

fn function_call(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let module = cx.module;
    let computation = callee(inst);
    let arguments = inst
        .operands
        .iter()
        .map(|&operand| map.lookup_all(module.instruction(operand)))
        .collect::<Result<Vec<_>>>()?;

    let cached = match cx.functions.get(&computation) {
        Some(cached) => cached.clone(),
        None => {
            let cached = lower_function(cx, inst, computation, arguments.clone())?;
            cx.functions.insert(computation, cached.clone());
            cached
        }
    };

    let mut seq = Sequence::new();
    for ((arguments, inputs), used) in arguments.iter().zip(&cached.inputs).zip(&cached.used) {
        for ((argument, input), &used) in arguments.iter().zip(inputs).zip(used) {
            if used && argument != input {
                seq.add(cx.graph.copy(argument, input).context(DeviceSnafu { instruction: &inst.name })?);
            }
        }
    }
    seq.add(Program::Call(cached.function));
    let outputs = copy_leaves(cx, inst, &cached.outputs, &mut seq)?;
    Ok(Lowered::new(seq, outputs))
}
