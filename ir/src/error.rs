use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Serialized backend config could not be parsed.
    #[snafu(display("invalid backend config on {instruction}: {source}"))]
    BackendConfigParse { instruction: String, source: serde_json::Error },

    /// Backend config could not be serialized.
    #[snafu(display("cannot serialize backend config: {source}"))]
    BackendConfigSerialize { source: serde_json::Error },

    /// A call config is missing a field required by its kind.
    #[snafu(display("{instruction} has a {kind} call config without `{field}`"))]
    MissingBackendConfig { instruction: String, kind: &'static str, field: &'static str },

    /// Shape inference failed while building an instruction.
    #[snafu(display("invalid shape for {instruction}: {reason}"))]
    InvalidShape { instruction: String, reason: String },

    /// Module structure violates an arena invariant.
    #[snafu(display("malformed module: {reason}"))]
    MalformedModule { reason: String },

    /// Pipeline computation is not well formed.
    #[snafu(display("malformed pipeline {computation}: {reason}"))]
    MalformedPipeline { computation: String, reason: String },
}
