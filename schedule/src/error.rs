use snafu::Snafu;

use crate::category::StageCategory;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Requested micro-batch count does not fill whole overlap periods.
    #[snafu(display("the pipeline depth of the pipeline must be a multiple of {overlap}, but it is {depth}"))]
    PipelineDepthNotMultiple { depth: usize, overlap: usize },

    /// Not enough micro-batches to ramp the pipeline up and down.
    #[snafu(display("the pipeline depth of the pipeline must be at least {overlap}, but it is {depth}"))]
    PipelineDepthTooSmall { depth: usize, overlap: usize },

    #[snafu(display("a pipeline needs at least one stage"))]
    EmptyPipeline,

    #[snafu(display("{category} has {actual} fragments for {expected} stages"))]
    FragmentCountMismatch { category: StageCategory, expected: usize, actual: usize },
}
