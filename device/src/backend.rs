//! Tensor operation backend interface.
//!
//! Lowering talks to the device only through [`TensorBackend`]: it creates and
//! clones tensors, asks for copies and compute steps, registers host streams and
//! device functions. Implementations own every tensor they hand out; handles are
//! plain references into that storage.

use strata_dtype::PrimitiveType;

use crate::error::Result;
use crate::program::{Function, FunctionId, Program, Stream, StreamId};
use crate::tensor::{TensorHandle, TensorId, TileMapping};

/// Preferred placement of a new variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Equal contiguous chunks over the tiles of the current shard.
    #[default]
    Linear,
    /// Operand `operand` of a matrix product.
    MatMulOperand { operand: usize },
    /// Same placement as an existing tensor with the same element count.
    Like(TensorId),
}

pub trait TensorBackend {
    fn shard_count(&self) -> u32;

    fn tiles_per_shard(&self) -> usize;

    /// Shard new tensors and compute steps are placed on.
    fn current_shard(&self) -> u32;

    fn select_shard(&mut self, shard: u32) -> Result<()>;

    fn add_variable(
        &mut self,
        element_type: PrimitiveType,
        dims: &[usize],
        name: &str,
        layout: Layout,
    ) -> Result<TensorHandle>;

    /// Constant holding `values`; a single value is splatted over the shape.
    fn add_constant(
        &mut self,
        element_type: PrimitiveType,
        dims: &[usize],
        values: &[f64],
        name: &str,
    ) -> Result<TensorHandle>;

    /// Fresh writable variable with the shape of `source`.
    fn clone_tensor(&mut self, source: &TensorHandle, name: &str) -> Result<TensorHandle>;

    /// Program copying `source` into `destination`; both must have the same shape.
    fn copy(&self, source: &TensorHandle, destination: &TensorHandle) -> Result<Program>;

    /// Compute step on the current shard.
    fn compute(&mut self, name: &str, inputs: &[TensorHandle], outputs: &[TensorHandle]) -> Program;

    fn reshape(&mut self, source: &TensorHandle, dims: &[usize]) -> Result<TensorHandle>;

    fn transpose(&mut self, source: &TensorHandle, permutation: &[usize]) -> Result<TensorHandle>;

    /// View of `source` repeated into `dims`; `dimensions` maps source dimensions to
    /// output dimensions.
    fn broadcast(&mut self, source: &TensorHandle, dims: &[usize], dimensions: &[usize]) -> Result<TensorHandle>;

    /// View of `source` with a different element type of the same width.
    fn reinterpret(&mut self, source: &TensorHandle, element_type: PrimitiveType) -> Result<TensorHandle>;

    fn add_host_to_device_stream(&mut self, name: &str) -> StreamId;

    fn add_device_to_host_stream(&mut self, name: &str) -> StreamId;

    fn streams(&self) -> &[Stream];

    fn tile_mapping(&self, tensor: &TensorHandle) -> Result<TileMapping>;

    /// Re-map `tensor` into equal chunks over its shard.
    fn set_linear_mapping(&mut self, tensor: &TensorHandle) -> Result<()>;

    fn add_function(&mut self, name: &str, body: Program) -> FunctionId;

    fn functions(&self) -> &[Function];

    fn tensor(&self, id: TensorId) -> Option<&TensorHandle>;
}
