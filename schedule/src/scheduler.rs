//! Rotation scheduler.
//!
//! Assembles the per-stage fragments of a pipeline into one program:
//!
//! ```text
//! ramp_up ; repeat(depth / overlap - 1, steady_state) ; ramp_down(depth % overlap)
//! ```
//!
//! where `overlap` is the number of rotation offsets. Without interleaving every
//! stage gets its own offset and the steady state is one timestep repeated `overlap`
//! times; with interleaving only non-conflicting rotations overlap and the steady
//! state is one full period.

use snafu::ensure;
use tracing::debug;

use crate::category::{Fragment, PipelineFragments, StageCategory};
use crate::error::*;
use crate::matrix::ScheduleMatrix;
use crate::offsets::stage_offsets;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineScheduler {
    offsets: Vec<usize>,
    stage_count: usize,
    interleave: bool,
}

impl PipelineScheduler {
    /// Scheduler for stages placed on `device_mapping` shards, in execution order.
    pub fn new(device_mapping: &[u32], interleave: bool) -> Result<Self> {
        ensure!(!device_mapping.is_empty(), EmptyPipelineSnafu);
        let offsets = stage_offsets(device_mapping, interleave);
        debug!(?device_mapping, interleave, ?offsets, "pipeline offsets");
        Ok(Self { offsets, stage_count: device_mapping.len(), interleave })
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of micro-batches in flight at once.
    pub fn overlap_length(&self) -> usize {
        self.offsets.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    pub fn interleave(&self) -> bool {
        self.interleave
    }

    /// Reject depths that do not fill whole overlap periods.
    pub fn check_depth(&self, depth: usize) -> Result<()> {
        let overlap = self.overlap_length();
        ensure!(depth % overlap == 0, PipelineDepthNotMultipleSnafu { depth, overlap });
        ensure!(depth >= overlap, PipelineDepthTooSmallSnafu { depth, overlap });
        Ok(())
    }

    fn check_fragments<T: Fragment>(&self, fragments: &PipelineFragments<T>) -> Result<()> {
        ensure!(
            fragments.stage_count() == self.stage_count,
            FragmentCountMismatchSnafu {
                category: StageCategory::Compute,
                expected: self.stage_count,
                actual: fragments.stage_count(),
            }
        );
        Ok(())
    }

    fn assemble<T: Fragment>(matrices: Vec<ScheduleMatrix<T>>, width: Option<usize>) -> T {
        let mut stacked = ScheduleMatrix::stack(matrices);
        if let Some(width) = width {
            stacked.truncate_columns(width);
        }
        T::sequence(stacked.flatten())
    }

    pub fn ramp_up<T: Fragment>(&self, fragments: &PipelineFragments<T>) -> T {
        let empty = T::default();
        let matrices = fragments
            .iter()
            .map(|(category, input)| {
                if StageCategory::RAMP_UP_BLANKED.contains(category) {
                    ScheduleMatrix::ramp_up(&self.offsets, input, &empty)
                } else {
                    ScheduleMatrix::construct(&self.offsets, input, self.interleave)
                }
            })
            .collect();
        Self::assemble(matrices, None)
    }

    pub fn repeat_block<T: Fragment>(&self, fragments: &PipelineFragments<T>) -> T {
        let matrices = fragments
            .iter()
            .map(|(_, input)| ScheduleMatrix::construct(&self.offsets, input, self.interleave))
            .collect();
        if self.interleave {
            Self::assemble(matrices, None)
        } else {
            T::repeat(self.overlap_length(), Self::assemble(matrices, Some(1)))
        }
    }

    pub fn ramp_down<T: Fragment>(&self, fragments: &PipelineFragments<T>, additional_iterations: usize) -> T {
        let empty = T::default();
        let matrices = fragments
            .iter()
            .map(|(category, input)| {
                if StageCategory::RAMP_DOWN_BLANKED.contains(category) {
                    ScheduleMatrix::ramp_down(&self.offsets, input, &empty, additional_iterations)
                } else {
                    ScheduleMatrix::construct(&self.offsets, input, self.interleave)
                }
            })
            .collect();
        Self::assemble(matrices, None)
    }

    /// Full program pushing `depth` micro-batches through the pipeline.
    #[tracing::instrument(skip_all, fields(depth = depth))]
    pub fn program<T: Fragment>(&self, fragments: &PipelineFragments<T>, depth: usize) -> Result<T> {
        self.check_fragments(fragments)?;
        self.check_depth(depth)?;
        let overlap = self.overlap_length();

        let mut parts = vec![self.ramp_up(fragments)];
        let repeats = depth / overlap - 1;
        if repeats > 0 {
            parts.push(T::repeat(repeats, self.repeat_block(fragments)));
        }
        parts.push(self.ramp_down(fragments, depth % overlap));
        debug!(overlap, repeats, "pipeline program assembled");
        Ok(T::sequence(parts))
    }
}
