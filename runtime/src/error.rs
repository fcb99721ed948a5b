//! Error types for compilation.

use snafu::Snafu;

/// Result type for compilation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Lowering failed.
    #[snafu(context(false), display("{source}"))]
    Codegen { source: strata_codegen::Error },

    #[snafu(display("no tile mapping for output {slot} of {instruction}: {source}"))]
    TileMapping { instruction: String, slot: usize, source: strata_device::Error },

    #[snafu(display("failed to serialize the tensor map report: {source}"))]
    Report { source: serde_json::Error },
}
