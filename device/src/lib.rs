//! Device layer of the strata backend.
//!
//! Lowering produces [`Program`] trees over tensors owned by a [`TensorBackend`]. The
//! [`VirtualGraph`] backend keeps everything in memory and models the accelerator as
//! shards of equally sized tile groups.
//!
//! # Module Organization
//!
//! - [`tensor`] - Tensor handles and tile mappings
//! - [`program`] - Program trees and the append-only [`Sequence`] builder
//! - [`backend`] - The [`TensorBackend`] interface
//! - [`graph`] - In-memory [`VirtualGraph`] backend
//! - [`error`] - Error types and result handling

pub mod backend;
pub mod error;
pub mod graph;
pub mod program;
pub mod tensor;


pub use backend::{Layout, TensorBackend};
pub use error::{Error, Result};
pub use graph::VirtualGraph;
pub use program::{ComputeStep, Function, FunctionId, Program, Sequence, Stream, StreamDirection, StreamId};
pub use tensor::{TensorHandle, TensorId, TensorKind, TileInterval, TileMapping};
