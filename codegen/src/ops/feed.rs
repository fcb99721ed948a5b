//! Host feeds, FIFOs and inter-shard copies.

use snafu::{ResultExt, ensure};
use strata_device::{Layout, Program, Sequence};
use strata_ir::{FeedConfig, Instruction, Op};
use tracing::debug;

use super::{Lowered, copy_leaves};
use crate::context::{CompilationContext, FeedInfo};
use crate::error::*;
use crate::tensor_map::TensorMap;

fn feed_config(inst: &Instruction) -> FeedConfig {
    inst.backend_config.feed_config.clone().unwrap_or_else(|| FeedConfig::new(&inst.name))
}

/// Delays its operand by `depth` pipeline iterations through a ring buffer.
pub fn fifo(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let Op::Fifo { depth } = inst.op else {
        panic!("{} is not a fifo", inst.name);
    };
    let inputs = map.lookup_all(cx.module.operand(inst.id, 0))?;
    let mut seq = Sequence::new();
    if depth == 0 {
        let outputs = copy_leaves(cx, inst, &inputs, &mut seq)?;
        return Ok(Lowered::new(seq, outputs));
    }

    let mut outputs = Vec::with_capacity(inputs.len());
    for (slot, input) in inputs.iter().enumerate() {
        let dims: Vec<usize> = std::iter::once(depth).chain(input.dims.iter().copied()).collect();
        let buffer = cx
            .graph
            .add_variable(input.element_type, &dims, &format!("{}/buffer.{slot}", inst.name), Layout::Linear)
            .context(DeviceSnafu { instruction: &inst.name })?;
        let output = cx
            .graph
            .clone_tensor(input, &format!("{}.{slot}", inst.name))
            .context(DeviceSnafu { instruction: &inst.name })?;
        seq.add(cx.graph.compute("fifo", &[input.clone(), buffer.clone()], &[buffer, output.clone()]));
        outputs.push(output);
    }
    Ok(Lowered::new(seq, outputs))
}

/// Copies every operand onto the shard the instruction is placed on.
pub fn inter_shard_copy(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let module = cx.module;
    let mut inputs = Vec::new();
    for &operand in &inst.operands {
        inputs.extend(map.lookup_all(module.instruction(operand))?);
    }
    let mut seq = Sequence::new();
    let outputs = copy_leaves(cx, inst, &inputs, &mut seq)?;
    Ok(Lowered::new(seq, outputs))
}

/// Infeeds only make sense inside a pipeline, which routes them to [`lower_infeed`].
pub fn infeed(_cx: &mut CompilationContext<'_>, _map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    InfeedOutsideLoopSnafu { instruction: &inst.name }.fail()
}

/// Allocates the data leaves of an infeed and streams them from the host.
pub(crate) fn lower_infeed(cx: &mut CompilationContext<'_>, inst: &Instruction) -> Result<Lowered> {
    ensure!(cx.infeeds.is_empty(), MultipleInfeedsSnafu { instruction: &inst.name });
    let config = feed_config(inst);
    let module_replication = cx.module.config().replication_factor;
    ensure!(
        config.replication_factor == module_replication,
        ReplicationMismatchSnafu {
            instruction: &inst.name,
            module: module_replication,
            feed: config.replication_factor
        }
    );

    let Some(data) = inst.shape.tuple_element(0) else {
        panic!("{} does not produce a (data, token) tuple", inst.name);
    };
    let mut seq = Sequence::new();
    let mut outputs = Vec::new();
    let mut shapes = Vec::new();
    for (slot, leaf) in data.leaves().into_iter().enumerate() {
        let Some(element_type) = leaf.element_type() else {
            continue;
        };
        let tensor = cx
            .graph
            .add_variable(element_type, leaf.dims(), &format!("{}.{slot}", inst.name), Layout::Linear)
            .context(DeviceSnafu { instruction: &inst.name })?;
        if !cx.options.synthetic_data {
            let stream = cx.graph.add_host_to_device_stream(&format!("{}.{slot}", config.feed_id));
            seq.add(Program::StreamToDevice { stream, tensor: tensor.id });
        }
        outputs.push(tensor);
        shapes.push(leaf.clone());
    }
    debug!(instruction = %inst.name, feed = %config.feed_id, leaves = outputs.len(), "infeed lowered");
    cx.infeeds.push(FeedInfo { instruction: inst.name.clone(), config, shapes });
    Ok(Lowered::new(seq, outputs))
}

/// Streams every leaf of operand 0 to the host.
pub fn outfeed(cx: &mut CompilationContext<'_>, map: &TensorMap, inst: &Instruction) -> Result<Lowered> {
    let config = feed_config(inst);
    let operand = cx.module.operand(inst.id, 0);
    let data = map.lookup_all(operand)?;
    let mut seq = Sequence::new();
    if !cx.options.synthetic_data {
        for (slot, tensor) in data.iter().enumerate() {
            let stream = cx.graph.add_device_to_host_stream(&format!("{}.{slot}", config.feed_id));
            seq.add(Program::StreamFromDevice { stream, tensor: tensor.id });
        }
    }
    let shapes = operand.shape.leaves().into_iter().cloned().collect();
    debug!(instruction = %inst.name, feed = %config.feed_id, leaves = data.len(), "outfeed lowered");
    cx.outfeeds.push(FeedInfo { instruction: inst.name.clone(), config, shapes });
    Ok(Lowered::default())
}
