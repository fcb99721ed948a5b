//! Opcode lowering table.
//!
//! Each opcode lowers through a plain function from the tensors bound to its operands
//! to the program fragment it needs and its output tensors. The visitor appends the
//! fragment and binds the outputs; boundaries take over parameters and whatever
//! they route themselves.
//!
//! # Module Organization
//!
//! - [`compute`] - Constants and compute steps (elementwise, iota, dot)
//! - [`tensor`] - Views, tuples, copies and inplace updates
//! - [`feed`] - Host feeds, FIFOs and inter-shard copies
//! - [`call`] - Function, inline, pipeline and custom calls

pub mod call;
pub mod compute;
pub mod feed;
pub mod tensor;

use snafu::ResultExt;
use strata_device::{Layout, Sequence, TensorHandle};
use strata_ir::{Instruction, OpKind};
use tracing::trace;

use crate::context::CompilationContext;
use crate::error::*;
use crate::tensor_map::TensorMap;

/// Program fragment and output tensors of one lowered instruction.
#[derive(Debug, Clone, Default)]
pub struct Lowered {
    pub sequence: Sequence,
    pub outputs: Vec<TensorHandle>,
}

impl Lowered {
    pub fn new(sequence: Sequence, outputs: Vec<TensorHandle>) -> Self {
        Self { sequence, outputs }
    }

    /// Outputs that need no program.
    pub fn forward(outputs: Vec<TensorHandle>) -> Self {
        Self { sequence: Sequence::new(), outputs }
    }
}

pub type LowerFn = fn(&mut CompilationContext<'_>, &TensorMap, &Instruction) -> Result<Lowered>;

/// Default lowering of `kind`. Parameters have none: their tensors come from the
/// visitor's boundary.
pub fn lowering_fn(kind: OpKind) -> Option<LowerFn> {
    let lower: LowerFn = match kind {
        OpKind::Parameter => return None,
        OpKind::Constant => compute::constant,
        OpKind::Unary | OpKind::Binary | OpKind::Compare | OpKind::Select | OpKind::Convert => compute::elementwise,
        OpKind::Iota => compute::iota,
        OpKind::Dot => compute::dot,
        OpKind::BitcastConvert => tensor::bitcast_convert,
        OpKind::Broadcast => tensor::broadcast,
        OpKind::Reshape => tensor::reshape,
        OpKind::Transpose => tensor::transpose,
        OpKind::DynamicUpdateSlice => tensor::dynamic_update_slice,
        OpKind::Tuple => tensor::tuple,
        OpKind::GetTupleElement => tensor::get_tuple_element,
        OpKind::Copy => tensor::copy,
        OpKind::AddDependency => tensor::add_dependency,
        OpKind::AfterAll => tensor::after_all,
        OpKind::Call => call::call,
        OpKind::CustomCall => call::custom_call,
        OpKind::Fifo => feed::fifo,
        OpKind::InterShardCopy => feed::inter_shard_copy,
        OpKind::Infeed => feed::infeed,
        OpKind::Outfeed => feed::outfeed,
    };
    Some(lower)
}

/// Tensor of the single-leaf operand `index`. A constant held on one tile is first
/// copied into a variable spread over the shard.
pub fn expanded_operand(
    cx: &mut CompilationContext<'_>,
    map: &TensorMap,
    inst: &Instruction,
    index: usize,
    seq: &mut Sequence,
) -> Result<TensorHandle> {
    let module = cx.module;
    let tensor = map.lookup_one(module.operand(inst.id, index), 0)?;
    if cx.options.no_constant_expansion || !tensor.is_constant() || tensor.element_count() <= 1 {
        return Ok(tensor);
    }
    let mapping = cx.graph.tile_mapping(&tensor).context(DeviceSnafu { instruction: &inst.name })?;
    if mapping.tile_count() > 1 {
        return Ok(tensor);
    }
    trace!(instruction = %inst.name, constant = %tensor, "expand constant");
    let expanded = cx
        .graph
        .clone_tensor(&tensor, &format!("{}/expanded", tensor.name))
        .context(DeviceSnafu { instruction: &inst.name })?;
    seq.add(cx.graph.copy(&tensor, &expanded).context(DeviceSnafu { instruction: &inst.name })?);
    Ok(expanded)
}

/// Fresh copies of `inputs`, one per leaf.
pub fn copy_leaves(
    cx: &mut CompilationContext<'_>,
    inst: &Instruction,
    inputs: &[TensorHandle],
    seq: &mut Sequence,
) -> Result<Vec<TensorHandle>> {
    inputs
        .iter()
        .enumerate()
        .map(|(slot, input)| {
            let output = cx
                .graph
                .clone_tensor(input, &format!("{}.{slot}", inst.name))
                .context(DeviceSnafu { instruction: &inst.name })?;
            seq.add(cx.graph.copy(input, &output).context(DeviceSnafu { instruction: &inst.name })?);
            Ok(output)
        })
        .collect()
}

/// Linearly mapped variable for the array output of `inst`.
pub fn output_variable(cx: &mut CompilationContext<'_>, inst: &Instruction) -> Result<TensorHandle> {
    let Some(element_type) = inst.shape.element_type() else {
        return UnimplementedSnafu { instruction: &inst.name, reason: "output is not an array" }.fail();
    };
    cx.graph
        .add_variable(element_type, inst.shape.dims(), &inst.name, Layout::Linear)
        .context(DeviceSnafu { instruction: &inst.name })
}
