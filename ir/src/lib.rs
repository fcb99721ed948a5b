//! Intermediate representation consumed by the strata backend.
//!
//! Modules are arenas: computations and instructions live in flat vectors and refer
//! to each other by [`ComputationId`] and [`InstId`]. Every computation carries its
//! schedule, the order lowering visits its instructions in.
//!
//! # Module Organization
//!
//! - [`shape`] - Array, tuple and token shapes with flat slot numbering
//! - [`op`] - Opcodes and their attributes
//! - [`instruction`] - Scheduled instruction nodes
//! - [`module`] - Module and computation arenas, module configuration
//! - [`builder`] - Module construction
//! - [`config`] - Serialized per-instruction backend configuration
//! - [`analysis`] - Inplace, allocation, aliasing and pipeline analyses
//! - [`error`] - Error types and result handling

pub mod analysis;
pub mod builder;
pub mod config;
pub mod error;
pub mod instruction;
pub mod module;
pub mod op;
pub mod shape;

#[cfg(any(test, feature = "fixtures"))]
pub mod test;

pub use builder::{ComputationBuilder, ModuleBuilder};
pub use config::{BackendConfig, CallConfig, CallKind, FeedConfig, PipelineConfig, StochasticRounding};
pub use error::{Error, Result};
pub use instruction::{InstId, Instruction};
pub use module::{Computation, ComputationId, Module, ModuleConfig};
pub use op::{BinaryOp, CompareDirection, Op, OpKind, UnaryOp};
pub use shape::{Dims, Shape};

pub use strata_dtype::PrimitiveType;
