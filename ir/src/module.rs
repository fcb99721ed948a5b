//! Module arena.
//!
//! A [`Module`] owns every instruction and computation. Computations list their
//! instructions by [`InstId`] in schedule order; the schedule is a valid post-order of
//! the data dependencies and is consumed as is by later passes.

use std::fmt;

use bon::bon;
use smallvec::SmallVec;

use crate::instruction::{InstId, Instruction};

/// Index of a computation in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u32);

impl ComputationId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computation#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Computation {
    pub id: ComputationId,
    pub name: String,
    /// Instructions in schedule order.
    pub instructions: Vec<InstId>,
    /// Parameter instructions indexed by parameter number.
    pub parameters: Vec<InstId>,
    pub root: InstId,
}

impl Computation {
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn parameter(&self, number: usize) -> Option<InstId> {
        self.parameters.get(number).copied()
    }
}

/// Module-wide execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Number of replicas the module runs on.
    pub replication_factor: usize,
    /// Number of trailing entry input leaves that are resource variables.
    pub resource_input_count: usize,
    /// Number of trailing entry output leaves that update resource inputs.
    pub resource_update_count: usize,
}

#[bon]
impl ModuleConfig {
    #[builder]
    pub fn builder(
        #[builder(default = 1)] replication_factor: usize,
        #[builder(default = 0)] resource_input_count: usize,
        #[builder(default = 0)] resource_update_count: usize,
    ) -> Self {
        Self { replication_factor, resource_input_count, resource_update_count }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) name: String,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) users: Vec<SmallVec<[InstId; 4]>>,
    pub(crate) positions: Vec<usize>,
    pub(crate) computations: Vec<Computation>,
    pub(crate) entry: ComputationId,
    pub(crate) config: ModuleConfig,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn entry_id(&self) -> ComputationId {
        self.entry
    }

    pub fn entry(&self) -> &Computation {
        self.computation(self.entry)
    }

    pub fn computation(&self, id: ComputationId) -> &Computation {
        &self.computations[id.index()]
    }

    pub fn computations(&self) -> impl Iterator<Item = &Computation> {
        self.computations.iter()
    }

    pub fn instruction(&self, id: InstId) -> &Instruction {
        &self.instructions[id.index()]
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Operand `index` of `id`.
    pub fn operand(&self, id: InstId, index: usize) -> &Instruction {
        self.instruction(self.instruction(id).operand(index))
    }

    /// Users of `id` in schedule order, each listed once.
    pub fn users(&self, id: InstId) -> &[InstId] {
        &self.users[id.index()]
    }

    pub fn user_count(&self, id: InstId) -> usize {
        self.users[id.index()].len()
    }

    pub fn is_root(&self, id: InstId) -> bool {
        let inst = self.instruction(id);
        self.computation(inst.parent).root == id
    }

    /// Instructions of `computation` in schedule order.
    pub fn schedule(&self, computation: ComputationId) -> impl Iterator<Item = &Instruction> {
        self.computation(computation).instructions.iter().map(|&id| self.instruction(id))
    }

    /// Depth-first post-order of `computation`: every instruction appears after its
    /// operands. Roots are taken in schedule order, so unreachable instructions are
    /// included too.
    pub fn post_order(&self, computation: ComputationId) -> Vec<InstId> {
        let comp = self.computation(computation);
        let mut visited = vec![false; self.instructions.len()];
        let mut order = Vec::with_capacity(comp.instructions.len());
        let mut stack: Vec<(InstId, usize)> = Vec::new();

        for &start in &comp.instructions {
            if visited[start.index()] {
                continue;
            }
            visited[start.index()] = true;
            stack.push((start, 0));
            while let Some((id, next)) = stack.pop() {
                let operands = &self.instruction(id).operands;
                match operands.get(next) {
                    Some(&operand) => {
                        stack.push((id, next + 1));
                        if !visited[operand.index()] {
                            visited[operand.index()] = true;
                            stack.push((operand, 0));
                        }
                    }
                    None => order.push(id),
                }
            }
        }
        order
    }

    /// Position of `id` within its computation's schedule.
    pub fn schedule_position(&self, id: InstId) -> usize {
        self.positions[id.index()]
    }

    pub fn find_instruction(&self, name: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|inst| inst.name == name)
    }

    pub fn find_computation(&self, name: &str) -> Option<&Computation> {
        self.computations.iter().find(|comp| comp.name == name)
    }
}
