//! Pipeline stage discovery.

use std::collections::{BTreeMap, BTreeSet};

use snafu::ensure;

use crate::config::CallKind;
use crate::error::*;
use crate::instruction::InstId;
use crate::module::{ComputationId, Module};

/// Stage calls of a pipeline computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStages {
    /// Forward stages by stage id.
    pub forward: Vec<InstId>,
    /// Backward stages by stage id.
    pub backward: Vec<InstId>,
    /// Recomputation calls keyed by the forward stage id they recompute.
    pub recomputation: BTreeMap<usize, InstId>,
}

impl PipelineStages {
    pub fn find(module: &Module, computation: ComputationId) -> Result<Self> {
        let comp = module.computation(computation);
        let malformed = |reason: String| MalformedPipelineSnafu { computation: comp.name.clone(), reason }.build();

        let mut forward = BTreeMap::new();
        let mut backward = BTreeMap::new();
        let mut recomputation = BTreeMap::new();
        for inst in module.schedule(computation) {
            let slot = match inst.call_kind()? {
                Some(CallKind::Stage { stage_id }) => forward.insert(stage_id, inst.id),
                Some(CallKind::Backward { stage_id }) => backward.insert(stage_id, inst.id),
                Some(CallKind::Recomputation { stage_id }) => recomputation.insert(stage_id, inst.id),
                _ => continue,
            };
            if slot.is_some() {
                return Err(malformed(format!("stage id of {} is used twice", inst.name)));
            }
        }

        ensure!(!forward.is_empty(), MalformedPipelineSnafu { computation: comp.name.clone(), reason: "no stages" });
        let contiguous = |stages: &BTreeMap<usize, InstId>| stages.keys().copied().eq(0..stages.len());
        if !contiguous(&forward) || !contiguous(&backward) {
            return Err(malformed("stage ids are not contiguous from zero".into()));
        }
        if backward.len() > forward.len() {
            return Err(malformed(format!("{} backward stages for {} forward stages", backward.len(), forward.len())));
        }
        if let Some(&stage_id) = recomputation.keys().find(|&&id| id >= forward.len()) {
            return Err(malformed(format!("recomputation of missing stage {stage_id}")));
        }

        Ok(Self {
            forward: forward.into_values().collect(),
            backward: backward.into_values().collect(),
            recomputation,
        })
    }

    /// Forward stages followed by the backward stages in reverse, i.e. in execution order.
    pub fn ordered(&self) -> Vec<InstId> {
        self.forward.iter().chain(self.backward.iter().rev()).copied().collect()
    }

    pub fn stage_count(&self) -> usize {
        self.forward.len() + self.backward.len()
    }

    /// Forward stage ids that have a recomputation.
    pub fn with_recomputation(&self) -> BTreeSet<usize> {
        self.recomputation.keys().copied().collect()
    }

    /// Shard of every stage in execution order; unsharded stages run on shard 0.
    pub fn device_mapping(&self, module: &Module) -> Vec<u32> {
        self.ordered().into_iter().map(|id| module.instruction(id).sharding.unwrap_or(0)).collect()
    }
}
