//! Compiled executable.
//!
//! An executable carries exactly three programs. Their positions are fixed: the
//! runtime loads resources with [`ProgramKind::HostToDevice`], runs
//! [`ProgramKind::Main`] once per step and reads resources back with
//! [`ProgramKind::DeviceToHost`].

use std::ops::Index;

use strata_codegen::FeedInfo;
use strata_device::{Function, Program, Stream, StreamDirection};
use strata_ir::analysis::InputOutputAliasingMap;

use crate::report::TensorMapReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ProgramKind {
    HostToDevice,
    Main,
    DeviceToHost,
}

impl ProgramKind {
    pub const fn index(self) -> usize {
        match self {
            Self::HostToDevice => 0,
            Self::Main => 1,
            Self::DeviceToHost => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Executable {
    pub(crate) programs: [Program; 3],
    pub(crate) functions: Vec<Function>,
    pub(crate) streams: Vec<Stream>,
    pub(crate) tensor_map: TensorMapReport,
    pub(crate) aliasing: InputOutputAliasingMap,
    pub(crate) infeeds: Vec<FeedInfo>,
    pub(crate) outfeeds: Vec<FeedInfo>,
}

impl Executable {
    /// Programs in execution order: host-to-device, main, device-to-host.
    pub fn programs(&self) -> &[Program; 3] {
        &self.programs
    }

    pub fn program(&self, kind: ProgramKind) -> &Program {
        &self.programs[kind.index()]
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn streams_in(&self, direction: StreamDirection) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(move |stream| stream.direction == direction)
    }

    pub fn tensor_map(&self) -> &TensorMapReport {
        &self.tensor_map
    }

    pub fn aliasing(&self) -> &InputOutputAliasingMap {
        &self.aliasing
    }

    pub fn infeeds(&self) -> &[FeedInfo] {
        &self.infeeds
    }

    pub fn outfeeds(&self) -> &[FeedInfo] {
        &self.outfeeds
    }
}

impl Index<ProgramKind> for Executable {
    type Output = Program;

    fn index(&self, kind: ProgramKind) -> &Program {
        self.program(kind)
    }
}
