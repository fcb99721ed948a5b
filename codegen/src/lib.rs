//! Lowering of strata modules into device programs.
//!
//! Lowering walks every computation once in schedule order. Each instruction's
//! outputs are bound to device tensors in a [`TensorMap`]; the program fragment it
//! needs is appended to the visitor's sequence. Inplace instructions reuse their
//! operands' tensors when the inplace analysis allows it and copy them otherwise.
//!
//! # Usage
//!
//! ```ignore
//! use strata_codegen::{CompilationContext, CompilerOptions, Visitor, visitor::entry::Entry};
//!
//! let mut cx = CompilationContext::new(&module, Box::new(graph), CompilerOptions::from_env())?;
//! let mut visitor = Visitor::new(module.entry_id(), 0, Entry::new());
//! visitor.accept(&mut cx)?;
//! ```
//!
//! # Module Organization
//!
//! - [`tensor_map`] - Instruction output to tensor bindings
//! - [`inplace`] - Inplace operand materialization
//! - [`context`] - Compilation context and analysis annotations
//! - [`options`] - Compiler options
//! - [`ops`] - Per-opcode lowering table
//! - [`custom_ops`] - Custom call registry
//! - [`visitor`] - Computation visitor and its boundaries
//! - [`error`] - Error types and result handling

pub mod context;
pub mod custom_ops;
pub mod error;
pub mod inplace;
pub mod ops;
pub mod options;
pub mod tensor_map;
pub mod visitor;

#[cfg(test)]
pub mod test;

pub use context::{Annotations, CachedFunction, CompilationContext, FeedInfo};
pub use custom_ops::CustomOpRegistry;
pub use error::{Error, Result};
pub use inplace::{is_writable, materialize_inplace_operands};
pub use ops::{LowerFn, Lowered};
pub use options::CompilerOptions;
pub use tensor_map::TensorMap;
pub use visitor::{Boundary, Visitor, VisitorState};
