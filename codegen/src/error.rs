//! Error types for lowering.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// An output slot was bound twice.
    #[snafu(display("output {slot} of {instruction} is already bound"))]
    AlreadyBound { instruction: String, slot: usize },

    /// An output slot was read before it was bound.
    #[snafu(display("output {slot} of {instruction} is not bound"))]
    NotBound { instruction: String, slot: usize },

    /// The opcode or attribute combination has no lowering.
    #[snafu(display("{instruction} is not supported: {reason}"))]
    Unimplemented { instruction: String, reason: String },

    #[snafu(display("infeed {instruction} must be inside a pipeline"))]
    InfeedOutsideLoop { instruction: String },

    #[snafu(display("infeed {instruction}: only one infeed per program is supported"))]
    MultipleInfeeds { instruction: String },

    #[snafu(display(
        "{instruction} is configured for replication factor {feed}, but the module is replicated {module} times"
    ))]
    ReplicationMismatch { instruction: String, module: usize, feed: usize },

    #[snafu(display("{instruction} calls unknown custom operation `{target}`"))]
    UnknownCustomOp { instruction: String, target: String },

    /// Pipeline computation violates a lowering precondition.
    #[snafu(display("invalid pipeline instruction {instruction}: {reason}"))]
    InvalidPipeline { instruction: String, reason: String },

    #[snafu(display("device error while lowering {instruction}: {source}"))]
    Device { instruction: String, source: strata_device::Error },

    #[snafu(display("cannot schedule pipeline {instruction}: {source}"))]
    Schedule { instruction: String, source: strata_schedule::Error },

    #[snafu(context(false), display("{source}"))]
    Ir { source: strata_ir::Error },
}
