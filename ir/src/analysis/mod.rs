//! Static analyses run before lowering.
//!
//! - [`inplace`] - per-opcode inplace operand classification and the eligibility pass
//! - [`allocation`] - allocation targets for parameter leaves
//! - [`aliasing`] - entry input/output aliasing of resource variables
//! - [`pipeline`] - discovery of the stages of a pipeline computation

pub mod aliasing;
pub mod allocation;
pub mod inplace;
pub mod pipeline;

pub use aliasing::{InputInfo, InputKind, InputOutputAliasingMap, OutputInfo, OutputKind};
pub use allocation::{AllocationTarget, TargetLayout, TensorSource, find_allocation_targets};
pub use inplace::{find_inplace_instructions, inplace_operand_indices, is_forwarding, is_inplace_type, is_view};
pub use pipeline::PipelineStages;
