//! Per-instruction backend configuration.
//!
//! Instructions carry a JSON-serialized [`BackendConfig`] describing their role in a
//! pipeline, their feed and their stochastic rounding override. Call configs are
//! validated into a [`CallKind`] before use; fields required by a kind are optional
//! on the wire so that a missing field is reported against the instruction.

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use crate::error::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_config: Option<CallConfig>,

    #[serde(skip_serializing_if = "StochasticRounding::is_not_set")]
    pub stochastic_rounding: StochasticRounding,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_config: Option<FeedConfig>,
}

impl BackendConfig {
    pub fn from_json(instruction: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).context(BackendConfigParseSnafu { instruction })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context(BackendConfigSerializeSnafu)
    }

    pub fn with_call(call_config: CallConfig) -> Self {
        Self { call_config: Some(call_config), ..Default::default() }
    }

    pub fn with_feed(feed_config: FeedConfig) -> Self {
        Self { feed_config: Some(feed_config), ..Default::default() }
    }
}

/// Role of a call instruction as serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallConfig {
    Function,
    Inline,
    PipelineStage {
        stage_id: Option<usize>,
    },
    PipelineStageBackward {
        stage_id: Option<usize>,
    },
    PipelineStageRecomputation {
        stage_id: Option<usize>,
    },
    Pipeline {
        pipeline_depth: Option<usize>,
        #[serde(default)]
        interleave: bool,
        repeat_count: Option<usize>,
    },
}

impl CallConfig {
    pub fn resolve(&self, instruction: &str) -> Result<CallKind> {
        let stage = |stage_id: &Option<usize>, kind: &'static str| -> Result<usize> {
            (*stage_id).context(MissingBackendConfigSnafu { instruction, kind, field: "stage_id" })
        };

        Ok(match self {
            Self::Function => CallKind::Function,
            Self::Inline => CallKind::Inline,
            Self::PipelineStage { stage_id } => CallKind::Stage { stage_id: stage(stage_id, "pipeline_stage")? },
            Self::PipelineStageBackward { stage_id } => {
                CallKind::Backward { stage_id: stage(stage_id, "pipeline_stage_backward")? }
            }
            Self::PipelineStageRecomputation { stage_id } => {
                CallKind::Recomputation { stage_id: stage(stage_id, "pipeline_stage_recomputation")? }
            }
            Self::Pipeline { pipeline_depth, interleave, repeat_count } => CallKind::Pipeline(PipelineConfig {
                pipeline_depth: (*pipeline_depth).context(MissingBackendConfigSnafu {
                    instruction,
                    kind: "pipeline",
                    field: "pipeline_depth",
                })?,
                interleave: *interleave,
                repeat_count: repeat_count.unwrap_or(1),
            }),
        })
    }
}

/// Validated role of a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Lowered once into a device function and called from every call site.
    Function,
    /// Lowered at the call site on the caller's tensors.
    Inline,
    /// Forward pipeline stage.
    Stage { stage_id: usize },
    /// Backward pipeline stage.
    Backward { stage_id: usize },
    /// Recomputation of forward stage `stage_id`.
    Recomputation { stage_id: usize },
    Pipeline(PipelineConfig),
}

impl CallKind {
    pub fn is_pipeline_stage(&self) -> bool {
        matches!(self, Self::Stage { .. } | Self::Backward { .. } | Self::Recomputation { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of micro-batches pushed through the pipeline per execution.
    pub pipeline_depth: usize,
    /// Overlap stages that live on distinct shards.
    pub interleave: bool,
    /// Number of times the whole pipeline program runs.
    pub repeat_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StochasticRounding {
    /// Use the module default.
    #[default]
    NotSet,
    ForceOn,
    ForceOff,
}

impl StochasticRounding {
    pub fn is_not_set(&self) -> bool {
        matches!(self, Self::NotSet)
    }

    /// Effective rounding mode given the module default.
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Self::NotSet => default,
            Self::ForceOn => true,
            Self::ForceOff => false,
        }
    }
}

/// Host feed attached to an infeed or outfeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub feed_id: String,
    #[serde(default = "one")]
    pub replication_factor: usize,
    #[serde(default = "one")]
    pub io_batch_size: usize,
}

impl FeedConfig {
    pub fn new(feed_id: impl Into<String>) -> Self {
        Self { feed_id: feed_id.into(), replication_factor: 1, io_batch_size: 1 }
    }
}

fn one() -> usize {
    1
}
