use snafu::Snafu;
use strata_dtype::PrimitiveType;

use crate::tensor::TensorId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Shape of target tensor does not match expected shape.
    #[snafu(display("shape mismatch on {tensor}: expected {expected:?}, got {actual:?}"))]
    ShapeMismatch { tensor: String, expected: Vec<usize>, actual: Vec<usize> },

    #[snafu(display("element type mismatch on {tensor}: expected {expected}, got {actual}"))]
    ElementTypeMismatch { tensor: String, expected: PrimitiveType, actual: PrimitiveType },

    /// Constant literal does not cover its shape.
    #[snafu(display("constant {name} has {actual} values for {expected} elements"))]
    ConstantSize { name: String, expected: usize, actual: usize },

    #[snafu(display("invalid view of {tensor}: {reason}"))]
    InvalidView { tensor: String, reason: String },

    #[snafu(display("shard {shard} does not exist, the graph has {shards} shards"))]
    InvalidShard { shard: u32, shards: u32 },

    /// Handle was not created by this graph.
    #[snafu(display("unknown tensor {id}"))]
    UnknownTensor { id: TensorId },
}
