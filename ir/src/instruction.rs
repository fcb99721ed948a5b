use std::fmt;

use smallvec::SmallVec;

use crate::config::{BackendConfig, CallConfig, CallKind};
use crate::error::Result;
use crate::module::ComputationId;
use crate::op::{Op, OpKind};
use crate::shape::Shape;

/// Index of an instruction in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);

impl InstId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A scheduled node of a computation.
///
/// Instructions are immutable once the module is built and refer to their operands
/// and parent computation by arena index.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: InstId,
    pub name: String,
    pub op: Op,
    pub operands: SmallVec<[InstId; 4]>,
    pub shape: Shape,
    pub parent: ComputationId,
    /// Shard the instruction is placed on, if pinned.
    pub sharding: Option<u32>,
    pub backend_config: BackendConfig,
}

impl Instruction {
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn operand(&self, index: usize) -> InstId {
        self.operands[index]
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Number of flat output slots.
    pub fn leaf_count(&self) -> usize {
        self.shape.leaf_count()
    }

    pub fn call_config(&self) -> Option<&CallConfig> {
        self.backend_config.call_config.as_ref()
    }

    /// Validated role of a call; `None` for every other opcode. Calls without a
    /// config are plain function calls.
    pub fn call_kind(&self) -> Result<Option<CallKind>> {
        if !matches!(self.op, Op::Call { .. }) {
            return Ok(None);
        }
        match self.call_config() {
            Some(config) => config.resolve(&self.name).map(Some),
            None => Ok(Some(CallKind::Function)),
        }
    }

    pub fn is_pipeline_stage(&self) -> bool {
        matches!(self.call_config(), Some(CallConfig::PipelineStage { .. }))
    }

    pub fn is_pipeline_stage_backward(&self) -> bool {
        matches!(self.call_config(), Some(CallConfig::PipelineStageBackward { .. }))
    }

    pub fn is_pipeline_stage_or_backward(&self) -> bool {
        self.is_pipeline_stage() || self.is_pipeline_stage_backward()
    }

    pub fn is_pipeline_stage_recomputation(&self) -> bool {
        matches!(self.call_config(), Some(CallConfig::PipelineStageRecomputation { .. }))
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self.call_config(), Some(CallConfig::Pipeline { .. }))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} {}(", self.name, self.shape, self.kind())?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ")")
    }
}
