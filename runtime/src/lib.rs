//! Executable assembly for the strata backend.
//!
//! [`compile`] lowers a module's entry computation and packs the result into an
//! [`Executable`]: three programs in fixed order plus the metadata a runtime needs to
//! drive them (host streams, device functions, feeds, input/output aliasing and a
//! tensor mapping report).
//!
//! # Usage
//!
//! ```ignore
//! use strata_codegen::CompilerOptions;
//! use strata_runtime::{ProgramKind, compile};
//!
//! let executable = compile(&module, CompilerOptions::from_env())?;
//! let main = executable.program(ProgramKind::Main);
//! ```
//!
//! # Module Organization
//!
//! - [`compile`](mod@compile) - Compile entry point
//! - [`executable`] - The assembled [`Executable`]
//! - [`report`] - Tensor mapping report
//! - [`error`] - Error types and result handling

pub mod compile;
pub mod error;
pub mod executable;
pub mod report;


pub use compile::{compile, compile_with};
pub use error::{Error, Result};
pub use executable::{Executable, ProgramKind};
pub use report::{TensorMapReport, TensorMapping};
