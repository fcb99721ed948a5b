//! Pipeline scheduling for the strata backend.
//!
//! A pipeline computation is a chain of stage calls placed on shards. This crate
//! decides which stage every instruction of the pipeline belongs to and turns the
//! per-stage program fragments into one overlapped program.
//!
//! # Module Organization
//!
//! - [`stage_assignment`] - Instruction to stage assignment
//! - [`offsets`] - Rotation offsets, circular union search
//! - [`matrix`] - Rotated schedule matrices and their linearization
//! - [`category`] - Fragment categories, the [`Fragment`] trait and per-stage tables
//! - [`scheduler`] - Ramp-up, steady state and ramp-down assembly
//! - [`error`] - Error types and result handling

pub mod category;
pub mod error;
pub mod matrix;
pub mod offsets;
pub mod scheduler;
pub mod stage_assignment;


pub use category::{Fragment, PipelineFragments, StageCategory};
pub use error::{Error, Result};
pub use matrix::ScheduleMatrix;
pub use offsets::{all_union, circular_union, rotations_conflict, stage_offsets};
pub use scheduler::PipelineScheduler;
pub use stage_assignment::StageAssignment;
