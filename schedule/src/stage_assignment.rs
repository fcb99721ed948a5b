//! Assignment of pipeline instructions to stages.
//!
//! Stage calls own their position in execution order (forward stages, then backward
//! stages in reverse). Every other instruction of the pipeline computation is placed
//! by closure over its operands or users, one opcode group at a time:
//!
//! 1. infeeds (with their get-tuple-element and token) take the stage of the one
//!    forward stage reading them
//! 2. outfeeds (with their get-tuple-element and token) take the stage producing the
//!    value they drain
//! 3. inter-shard copies and their get-tuple-element operands take the latest
//!    operand stage
//! 4. unassigned get-tuple-elements and copies take the latest operand stage
//! 5. FIFOs feeding a recomputation take its stage, others their operand's
//! 6. parameters take the earliest user stage
//! 7. everything else, in post-order, takes the latest operand stage
//!
//! Instructions without operands in the last group take the earliest stage of their
//! users once those are placed; unused ones get none. An instruction left without a
//! stage means the pipeline is malformed and is a fatal error.

use std::collections::BTreeMap;

use strata_ir::analysis::PipelineStages;
use strata_ir::{ComputationId, InstId, Module, OpKind};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAssignment {
    stages: BTreeMap<InstId, usize>,
    stage_count: usize,
}

struct Assigner<'a> {
    module: &'a Module,
    result: BTreeMap<InstId, usize>,
}

impl Assigner<'_> {
    fn stage(&self, id: InstId) -> usize {
        match self.result.get(&id) {
            Some(&stage) => stage,
            None => panic!("{} has no pipeline stage yet", self.module.instruction(id).name),
        }
    }

    fn assign(&mut self, id: InstId, stage: usize) {
        trace!(instruction = %self.module.instruction(id).name, stage, "stage assigned");
        self.result.insert(id, stage);
    }

    fn from_operands(&self, id: InstId) -> usize {
        let operands = &self.module.instruction(id).operands;
        match operands.iter().map(|&operand| self.stage(operand)).max() {
            Some(stage) => stage,
            None => panic!("{} has no operands to take a stage from", self.module.instruction(id).name),
        }
    }

    /// Latest stage among the operands that already have one.
    fn from_assigned_operands(&self, id: InstId) -> usize {
        let operands = &self.module.instruction(id).operands;
        operands.iter().filter_map(|operand| self.result.get(operand).copied()).max().unwrap_or(0)
    }

    fn from_users(&self, id: InstId) -> Option<usize> {
        self.module.users(id).iter().map(|&user| self.stage(user)).min()
    }
}

/// Stable partition of `instructions` into those of `kind` and the rest.
fn take_kind(instructions: &mut Vec<InstId>, module: &Module, kind: OpKind) -> Vec<InstId> {
    let (taken, rest) = instructions.iter().partition(|&&id| module.instruction(id).kind() == kind);
    *instructions = rest;
    taken
}

impl StageAssignment {
    #[tracing::instrument(skip_all, fields(computation = %module.computation(computation).name))]
    pub fn compute(module: &Module, computation: ComputationId, stages: &PipelineStages) -> Self {
        let comp = module.computation(computation);
        let ordered = stages.ordered();
        let stage_count = ordered.len();
        let mut a = Assigner { module, result: BTreeMap::new() };

        for (position, &call) in ordered.iter().enumerate() {
            a.assign(call, position);
        }
        for (&stage_id, &call) in &stages.recomputation {
            a.assign(call, stage_id);
        }

        let root = module.instruction(comp.root);
        assert_eq!(root.kind(), OpKind::Tuple, "pipeline root {} must be a tuple", root.name);
        a.assign(comp.root, stage_count - 1);

        let mut rest: Vec<InstId> =
            module.post_order(computation).into_iter().filter(|id| !a.result.contains_key(id)).collect();

        for infeed in take_kind(&mut rest, module, OpKind::Infeed) {
            let inst = module.instruction(infeed);
            assert_eq!(module.user_count(infeed), 1, "infeed {} must have a single user", inst.name);
            let gte = module.users(infeed)[0];
            let consumers: Vec<InstId> = module
                .users(gte)
                .iter()
                .copied()
                .filter(|&user| module.instruction(user).is_pipeline_stage())
                .collect();
            let &[consumer] = consumers.as_slice() else {
                panic!("infeed {} must feed exactly one forward pipeline stage, feeds {}", inst.name, consumers.len());
            };
            let stage = a.stage(consumer);
            a.assign(infeed, stage);
            a.assign(gte, stage);
            a.assign(inst.operand(0), stage);
        }

        for outfeed in take_kind(&mut rest, module, OpKind::Outfeed) {
            let inst = module.instruction(outfeed);
            let copy = module.instruction(inst.operand(0));
            let gte = module.instruction(copy.operand(0));
            let stage = a.stage(gte.operand(0));
            a.assign(outfeed, stage);
            a.assign(gte.id, stage);
            a.assign(inst.operand(1), stage);
        }

        for copy in take_kind(&mut rest, module, OpKind::InterShardCopy) {
            for &operand in &module.instruction(copy).operands {
                let operand_inst = module.instruction(operand);
                assert_eq!(
                    operand_inst.kind(),
                    OpKind::GetTupleElement,
                    "operand {} of inter-shard copy must be a get-tuple-element",
                    operand_inst.name
                );
                let stage = a.from_operands(operand);
                a.assign(operand, stage);
            }
            let stage = a.from_operands(copy);
            a.assign(copy, stage);
        }

        rest.retain(|id| !a.result.contains_key(id));
        for gte in take_kind(&mut rest, module, OpKind::GetTupleElement) {
            let stage = a.from_operands(gte);
            a.assign(gte, stage);
        }

        for copy in take_kind(&mut rest, module, OpKind::Copy) {
            let stage = a.from_operands(copy);
            a.assign(copy, stage);
        }

        for fifo in take_kind(&mut rest, module, OpKind::Fifo) {
            let inst = module.instruction(fifo);
            assert_eq!(module.user_count(fifo), 1, "FIFO {} must have a single user", inst.name);
            let user = module.instruction(module.users(fifo)[0]);
            let stage = if user.is_pipeline_stage_recomputation() {
                a.stage(user.id)
            } else {
                a.from_operands(fifo)
            };
            a.assign(fifo, stage);
        }

        for parameter in take_kind(&mut rest, module, OpKind::Parameter) {
            let stage = a.from_users(parameter).unwrap_or(stage_count - 1);
            a.assign(parameter, stage);
        }

        let mut sources = Vec::new();
        for id in rest {
            if a.result.contains_key(&id) {
                continue;
            }
            if module.instruction(id).operand_count() == 0 {
                sources.push(id);
                continue;
            }
            let stage = a.from_assigned_operands(id);
            a.assign(id, stage);
        }
        for &id in sources.iter().rev() {
            if let Some(stage) = a.from_users(id) {
                a.assign(id, stage);
            }
        }

        if a.result.len() != comp.instruction_count() {
            panic!(
                "could not assign all {} instructions of {} to pipeline stages, {} assigned",
                comp.instruction_count(),
                comp.name,
                a.result.len()
            );
        }
        debug!(stage_count, instructions = a.result.len(), "pipeline stages assigned");
        Self { stages: a.result, stage_count }
    }

    pub fn stage(&self, id: InstId) -> Option<usize> {
        self.stages.get(&id).copied()
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstId, usize)> + '_ {
        self.stages.iter().map(|(&id, &stage)| (id, stage))
    }

    /// Instructions placed on `stage`, in arena order.
    pub fn instructions_in(&self, stage: usize) -> Vec<InstId> {
        self.iter().filter(|&(_, s)| s == stage).map(|(id, _)| id).collect()
    }
}
