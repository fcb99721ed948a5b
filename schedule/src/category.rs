//! Fragment categories and per-stage fragment tables.

use enumset::{EnumSet, EnumSetType, enum_set};
use snafu::ensure;
use strata_device::{Program, Sequence};
use strum::{EnumCount, VariantArray};

use crate::error::*;

/// Kind of work a stage fragment does. Within a timestep fragments always run in
/// declaration order.
#[derive(Debug, Hash, PartialOrd, Ord, EnumSetType)]
#[derive(strum::Display, strum::EnumCount, strum::EnumIter, strum::VariantArray)]
#[strum(serialize_all = "snake_case")]
#[enumset(repr = "u8")]
pub enum StageCategory {
    Infeed,
    Compute,
    Fifo,
    Recomputation,
    Copy,
    InterShardCopy,
    Outfeed,
}

impl StageCategory {
    /// Categories blanked out before a lane starts.
    pub const RAMP_UP_BLANKED: EnumSet<Self> = enum_set!(
        StageCategory::Infeed
            | StageCategory::Compute
            | StageCategory::Fifo
            | StageCategory::Recomputation
            | StageCategory::Outfeed
    );

    /// Categories blanked out after a lane drains.
    pub const RAMP_DOWN_BLANKED: EnumSet<Self> =
        enum_set!(StageCategory::Infeed | StageCategory::Compute | StageCategory::Outfeed);
}

/// Program fragment the scheduler can arrange.
pub trait Fragment: Clone + Default {
    /// Run `parts` one after another.
    fn sequence(parts: Vec<Self>) -> Self;

    /// Run `body` `count` times.
    fn repeat(count: usize, body: Self) -> Self;
}

impl Fragment for Sequence {
    fn sequence(parts: Vec<Self>) -> Self {
        let mut sequence = Sequence::new();
        parts.into_iter().for_each(|part| sequence.append(part));
        sequence
    }

    fn repeat(count: usize, body: Self) -> Self {
        Sequence::from(Program::repeat(count, body))
    }
}

/// One fragment per stage for every [`StageCategory`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFragments<T> {
    stage_count: usize,
    fragments: Vec<Vec<T>>,
}

impl<T: Fragment> PipelineFragments<T> {
    /// Empty fragments for `stage_count` stages.
    pub fn new(stage_count: usize) -> Self {
        Self { stage_count, fragments: vec![vec![T::default(); stage_count]; StageCategory::COUNT] }
    }

    /// Build from explicit per-category lists; missing categories stay empty.
    pub fn from_parts(stage_count: usize, parts: impl IntoIterator<Item = (StageCategory, Vec<T>)>) -> Result<Self> {
        let mut result = Self::new(stage_count);
        for (category, fragments) in parts {
            ensure!(
                fragments.len() == stage_count,
                FragmentCountMismatchSnafu { category, expected: stage_count, actual: fragments.len() }
            );
            result.fragments[category as usize] = fragments;
        }
        Ok(result)
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    pub fn category(&self, category: StageCategory) -> &[T] {
        &self.fragments[category as usize]
    }

    pub fn get(&self, category: StageCategory, stage: usize) -> &T {
        &self.fragments[category as usize][stage]
    }

    pub fn get_mut(&mut self, category: StageCategory, stage: usize) -> &mut T {
        &mut self.fragments[category as usize][stage]
    }

    /// Categories in execution order with their fragments.
    pub fn iter(&self) -> impl Iterator<Item = (StageCategory, &[T])> {
        StageCategory::VARIANTS.iter().map(|&category| (category, self.category(category)))
    }
}
