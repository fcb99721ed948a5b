//! Pipeline computations.
//!
//! Every instruction of a pipeline computation is lowered into the fragment of its
//! stage and category. The scheduler then arranges the fragments into ramp-up,
//! repeated steady state and ramp-down. Function and inline calls run in the compute
//! fragment of the stage they are assigned to. Pipeline parameters alias the caller's
//! tensors; whatever the root returns for a parameter is copied back into it, in the
//! copy fragment of the stage producing it.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use snafu::{OptionExt, ResultExt, ensure};
use strata_device::{FunctionId, Program, Sequence, TensorHandle};
use strata_ir::analysis::{PipelineStages, inplace_operand_indices};
use strata_ir::{CallKind, Instruction, Op, OpKind, PipelineConfig};
use strata_schedule::{PipelineFragments, PipelineScheduler, StageAssignment, StageCategory};
use tracing::debug;

use super::pipeline_stage::PipelineStage;
use super::{Boundary, Visitor, VisitorState};
use crate::context::CompilationContext;
use crate::error::*;
use crate::inplace::materialize_inplace_operands;
use crate::ops::call::{call, callee};
use crate::ops::{Lowered, feed, tensor};
use crate::tensor_map::TensorMap;

/// What a recomputation needs from the forward stage it repeats.
#[derive(Debug, Clone)]
struct StageProgram {
    function: Option<FunctionId>,
    inputs: Vec<Vec<TensorHandle>>,
    outputs: Vec<TensorHandle>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    arguments: Vec<Vec<TensorHandle>>,
    assignment: StageAssignment,
    /// Forward stages with a recomputation.
    recomputed: BTreeSet<usize>,
    fragments: PipelineFragments<Sequence>,
    stages: BTreeMap<usize, StageProgram>,
}

impl Pipeline {
    pub fn new(arguments: Vec<Vec<TensorHandle>>, assignment: StageAssignment, recomputed: BTreeSet<usize>) -> Self {
        let fragments = PipelineFragments::new(assignment.stage_count());
        Self { arguments, assignment, recomputed, fragments, stages: BTreeMap::new() }
    }

    pub fn fragments(&self) -> &PipelineFragments<Sequence> {
        &self.fragments
    }

    pub fn into_fragments(self) -> PipelineFragments<Sequence> {
        self.fragments
    }

    fn stage(&self, inst: &Instruction) -> Result<usize> {
        self.assignment
            .stage(inst.id)
            .context(InvalidPipelineSnafu { instruction: &inst.name, reason: "instruction has no pipeline stage" })
    }

    fn lower_stage(
        &mut self,
        cx: &mut CompilationContext<'_>,
        map: &TensorMap,
        inst: &Instruction,
        stage: usize,
    ) -> Result<Lowered> {
        let mut seq = Sequence::new();
        let arguments = stage_arguments(cx, map, inst, &mut seq)?;
        let recomputed = inst.is_pipeline_stage() && self.recomputed.contains(&stage);
        let fresh: BTreeSet<usize> = if recomputed {
            inplace_operand_indices(cx.module, inst).unwrap_or_default().into_iter().collect()
        } else {
            BTreeSet::new()
        };

        let shard = cx.graph.current_shard();
        let boundary = PipelineStage::new(arguments.clone(), fresh.clone(), recomputed);
        let mut visitor = Visitor::new(callee(inst), shard, boundary);
        visitor.accept(cx)?;
        cx.graph.select_shard(shard).context(DeviceSnafu { instruction: &inst.name })?;
        let (body, boundary) = visitor.into_parts();
        let inputs = boundary.visitor_inputs();

        for &index in &fresh {
            for (argument, input) in arguments[index].iter().zip_eq(&inputs[index]) {
                if argument != input {
                    seq.add(cx.graph.copy(argument, input).context(DeviceSnafu { instruction: &inst.name })?);
                }
            }
        }

        let function = if recomputed {
            let function = cx.graph.add_function(&inst.name, body.sequence.into_program());
            seq.add(Program::Call(function));
            Some(function)
        } else {
            seq.append(body.sequence);
            None
        };

        let mut outputs = Vec::with_capacity(body.outputs.len());
        for (index, (output, &copy)) in body.outputs.iter().zip_eq(boundary.output_copies()).enumerate() {
            if !copy {
                outputs.push(output.clone());
                continue;
            }
            let duplicate = cx
                .graph
                .clone_tensor(output, &format!("{}/output/{index}", inst.name))
                .context(DeviceSnafu { instruction: &inst.name })?;
            seq.add(cx.graph.copy(output, &duplicate).context(DeviceSnafu { instruction: &inst.name })?);
            outputs.push(duplicate);
        }

        debug!(stage, instruction = %inst.name, recomputed, outputs = outputs.len(), "stage lowered");
        self.stages.insert(stage, StageProgram { function, inputs, outputs: body.outputs });
        Ok(Lowered::new(seq, outputs))
    }

    fn lower_recomputation(
        &mut self,
        cx: &mut CompilationContext<'_>,
        map: &TensorMap,
        inst: &Instruction,
        stage: usize,
    ) -> Result<Lowered> {
        let forward = self.stages.get(&stage).cloned().context(InvalidPipelineSnafu {
            instruction: &inst.name,
            reason: format!("stage {stage} is recomputed before it runs"),
        })?;
        let function = forward.function.context(InvalidPipelineSnafu {
            instruction: &inst.name,
            reason: format!("stage {stage} was not lowered for recomputation"),
        })?;

        let mut seq = Sequence::new();
        let arguments = stage_arguments(cx, map, inst, &mut seq)?;
        ensure!(
            arguments.len() == forward.inputs.len(),
            InvalidPipelineSnafu {
                instruction: &inst.name,
                reason: format!("recomputation of stage {stage} takes a different number of operands"),
            }
        );
        for index in inplace_operand_indices(cx.module, inst).unwrap_or_default() {
            for (argument, input) in arguments[index].iter().zip_eq(&forward.inputs[index]) {
                if argument != input {
                    seq.add(cx.graph.copy(argument, input).context(DeviceSnafu { instruction: &inst.name })?);
                }
            }
        }
        seq.add(Program::Call(function));
        Ok(Lowered::new(seq, forward.outputs))
    }
}

/// Arguments of a stage call: materialized inplace operands, the bound tensors of
/// every other operand.
fn stage_arguments(
    cx: &mut CompilationContext<'_>,
    map: &TensorMap,
    inst: &Instruction,
    seq: &mut Sequence,
) -> Result<Vec<Vec<TensorHandle>>> {
    let module = cx.module;
    let indices = inplace_operand_indices(module, inst).unwrap_or_default();
    let materialized = materialize_inplace_operands(cx, map, inst, seq)?;
    let mut arguments: Vec<Option<Vec<TensorHandle>>> = vec![None; inst.operand_count()];
    for (&index, tensors) in indices.iter().zip(materialized) {
        arguments[index] = Some(tensors);
    }
    arguments
        .into_iter()
        .enumerate()
        .map(|(index, tensors)| match tensors {
            Some(tensors) => Ok(tensors),
            None => map.lookup_all(module.operand(inst.id, index)),
        })
        .collect()
}

fn not_a_stage_instruction(inst: &Instruction) -> Result<bool> {
    let reason = format!("{} is not a valid pipeline stage instruction", inst.kind());
    UnimplementedSnafu { instruction: &inst.name, reason }.fail()
}

impl Boundary for Pipeline {
    fn parameter(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<()> {
        let number = match inst.op {
            Op::Parameter { number } => number,
            _ => panic!("{} is not a parameter", inst.name),
        };
        let Some(arguments) = self.arguments.get(number).cloned() else {
            panic!("pipeline {} has no argument for parameter {number}", cx.module.computation(inst.parent).name);
        };
        state.bind_outputs(inst, arguments)
    }

    fn lower(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<bool> {
        let module = cx.module;
        let stage = self.stage(inst)?;
        let map = &state.tensor_map;
        let (category, lowered) = match inst.kind() {
            OpKind::Call => match inst.call_kind()? {
                Some(CallKind::Stage { .. } | CallKind::Backward { .. }) => {
                    (StageCategory::Compute, self.lower_stage(cx, map, inst, stage)?)
                }
                Some(CallKind::Recomputation { .. }) => {
                    (StageCategory::Recomputation, self.lower_recomputation(cx, map, inst, stage)?)
                }
                Some(CallKind::Function | CallKind::Inline) => (StageCategory::Compute, call(cx, map, inst)?),
                _ => return not_a_stage_instruction(inst),
            },
            OpKind::Copy => (StageCategory::Copy, tensor::copy(cx, map, inst)?),
            OpKind::Fifo => (StageCategory::Fifo, feed::fifo(cx, map, inst)?),
            OpKind::InterShardCopy => (StageCategory::InterShardCopy, feed::inter_shard_copy(cx, map, inst)?),
            OpKind::GetTupleElement => {
                let category = if module.operand(inst.id, 0).is_pipeline_stage_recomputation() {
                    StageCategory::Recomputation
                } else {
                    StageCategory::Compute
                };
                (category, tensor::get_tuple_element(cx, map, inst)?)
            }
            OpKind::Infeed => (StageCategory::Infeed, feed::lower_infeed(cx, inst)?),
            OpKind::Outfeed => (StageCategory::Outfeed, feed::outfeed(cx, map, inst)?),
            OpKind::AfterAll => (StageCategory::Compute, Lowered::default()),
            OpKind::Tuple => {
                ensure!(
                    module.is_root(inst.id),
                    InvalidPipelineSnafu {
                        instruction: &inst.name,
                        reason: "tuples are only allowed as the pipeline root",
                    }
                );
                let mut outputs = Vec::new();
                for &operand in &inst.operands {
                    outputs.extend(map.lookup_all(module.instruction(operand))?);
                }
                (StageCategory::Compute, Lowered::forward(outputs))
            }
            _ => return not_a_stage_instruction(inst),
        };
        self.fragments.get_mut(category, stage).append(lowered.sequence);
        state.bind_outputs(inst, lowered.outputs)?;
        Ok(true)
    }

    fn finish(&mut self, cx: &mut CompilationContext<'_>, state: &mut VisitorState, root: &Instruction) -> Result<()> {
        let module = cx.module;
        let parameters = &module.computation(state.computation()).parameters;
        ensure!(
            root.kind() == OpKind::Tuple && root.operand_count() == parameters.len(),
            InvalidPipelineSnafu {
                instruction: &root.name,
                reason: format!("the root must return one value per parameter, {} parameters", parameters.len()),
            }
        );

        let mut outputs = Vec::new();
        for (number, &parameter) in parameters.iter().enumerate() {
            let parameter = module.instruction(parameter);
            let operand = module.operand(root.id, number);
            ensure!(
                parameter.shape == operand.shape,
                InvalidPipelineSnafu {
                    instruction: &root.name,
                    reason: format!("output {number} does not match the shape of its parameter"),
                }
            );
            let stage = self.stage(operand)?;
            let inputs = state.tensor_map.lookup_all(parameter)?;
            let results = state.tensor_map.lookup_all(operand)?;
            for (input, result) in inputs.iter().zip_eq(&results) {
                if input != result {
                    let copy = cx.graph.copy(result, input).context(DeviceSnafu { instruction: &root.name })?;
                    self.fragments.get_mut(StageCategory::Copy, stage).add(copy);
                }
            }
            outputs.extend(inputs);
        }
        state.outputs = outputs;
        Ok(())
    }

    fn tracks_stochastic_rounding(&self) -> bool {
        false
    }
}

/// Lowers pipeline call `inst` into its overlapped schedule.
#[tracing::instrument(skip_all, fields(pipeline = %inst.name, depth = config.pipeline_depth))]
pub fn lower_pipeline(
    cx: &mut CompilationContext<'_>,
    map: &TensorMap,
    inst: &Instruction,
    config: PipelineConfig,
) -> Result<Lowered> {
    let module = cx.module;
    let computation = callee(inst);
    let mut seq = Sequence::new();
    let arguments = materialize_inplace_operands(cx, map, inst, &mut seq)?;

    let stages = PipelineStages::find(module, computation)?;
    let assignment = StageAssignment::compute(module, computation, &stages);
    let scheduler = PipelineScheduler::new(&stages.device_mapping(module), config.interleave)
        .context(ScheduleSnafu { instruction: &inst.name })?;
    scheduler.check_depth(config.pipeline_depth).context(ScheduleSnafu { instruction: &inst.name })?;
    debug!(
        stages = stages.stage_count(),
        offsets = ?scheduler.offsets(),
        recomputed = ?stages.with_recomputation(),
        "pipeline stages assigned"
    );

    let shard = cx.graph.current_shard();
    let boundary = Pipeline::new(arguments, assignment, stages.with_recomputation());
    let mut visitor = Visitor::new(computation, shard, boundary);
    visitor.accept(cx)?;
    cx.graph.select_shard(shard).context(DeviceSnafu { instruction: &inst.name })?;

    let (state, boundary) = visitor.into_parts();
    let program = scheduler
        .program(boundary.fragments(), config.pipeline_depth)
        .context(ScheduleSnafu { instruction: &inst.name })?;
    match config.repeat_count {
        1 => seq.append(program),
        count => seq.add(Program::repeat(count, program)),
    }
    Ok(Lowered::new(seq, state.outputs))
}
