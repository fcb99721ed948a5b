//! Device programs.
//!
//! A [`Program`] is a tree of control-flow nodes over tensors of one graph. Programs
//! are built append-only through [`Sequence`] and never mutated once assembled.

use std::fmt;

use serde::Serialize;

use crate::tensor::TensorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FunctionId(u32);

impl FunctionId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(u32);

impl StreamId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamDirection {
    HostToDevice,
    DeviceToHost,
}

/// Named host stream registered with the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub direction: StreamDirection,
}

/// One compute step: a named kernel reading `inputs` and writing `outputs` on `shard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputeStep {
    pub name: String,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub shard: u32,
}

/// Program registered once and invoked by [`Program::Call`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub body: Program,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    #[default]
    Noop,
    Sequence(Vec<Program>),
    Copy {
        source: TensorId,
        destination: TensorId,
    },
    StreamToDevice {
        stream: StreamId,
        tensor: TensorId,
    },
    StreamFromDevice {
        stream: StreamId,
        tensor: TensorId,
    },
    Execute(ComputeStep),
    Repeat {
        count: usize,
        body: Box<Program>,
    },
    Call(FunctionId),
    SetStochasticRounding(bool),
}

impl Program {
    pub fn copy(source: TensorId, destination: TensorId) -> Self {
        Self::Copy { source, destination }
    }

    /// `body` repeated `count` times; empty when there is nothing to repeat.
    pub fn repeat(count: usize, body: impl Into<Program>) -> Self {
        let body = body.into();
        if count == 0 || body.is_empty() {
            return Self::Noop;
        }
        Self::Repeat { count, body: Box::new(body) }
    }

    /// Whether running the program has no effect.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Noop => true,
            Self::Sequence(programs) => programs.iter().all(Program::is_empty),
            Self::Repeat { count, body } => *count == 0 || body.is_empty(),
            _ => false,
        }
    }

    /// Visit every node in pre-order. Function bodies are not entered.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Program)) {
        visit(self);
        match self {
            Self::Sequence(programs) => programs.iter().for_each(|p| p.walk(visit)),
            Self::Repeat { body, .. } => body.walk(visit),
            _ => {}
        }
    }

    /// `(source, destination)` of every copy, in program order.
    pub fn copies(&self) -> Vec<(TensorId, TensorId)> {
        let mut copies = Vec::new();
        self.walk(&mut |p| {
            if let Self::Copy { source, destination } = p {
                copies.push((*source, *destination));
            }
        });
        copies
    }

    pub fn copy_count(&self) -> usize {
        self.copies().len()
    }

    /// Names of the compute steps, in program order.
    pub fn compute_steps(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |p| {
            if let Self::Execute(step) = p {
                names.push(step.name.as_str());
            }
        });
        names
    }

    /// Called functions, in program order.
    pub fn calls(&self) -> Vec<FunctionId> {
        let mut calls = Vec::new();
        self.walk(&mut |p| {
            if let Self::Call(function) = p {
                calls.push(*function);
            }
        });
        calls
    }
}

/// Append-only program builder.
///
/// Empty programs are dropped on insertion so that a sequence is empty iff it does
/// nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence(Vec<Program>);

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, program: impl Into<Program>) {
        let program = program.into();
        if !program.is_empty() {
            self.0.push(program);
        }
    }

    pub fn append(&mut self, other: Sequence) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn programs(&self) -> &[Program] {
        &self.0
    }

    pub fn into_program(self) -> Program {
        self.into()
    }
}

impl From<Sequence> for Program {
    fn from(sequence: Sequence) -> Self {
        match sequence.0.len() {
            0 => Program::Noop,
            _ => Program::Sequence(sequence.0),
        }
    }
}

impl From<Program> for Sequence {
    fn from(program: Program) -> Self {
        let mut sequence = Sequence::new();
        sequence.add(program);
        sequence
    }
}

impl FromIterator<Program> for Sequence {
    fn from_iter<I: IntoIterator<Item = Program>>(iter: I) -> Self {
        let mut sequence = Sequence::new();
        iter.into_iter().for_each(|p| sequence.add(p));
        sequence
    }
}

impl Extend<Program> for Sequence {
    fn extend<I: IntoIterator<Item = Program>>(&mut self, iter: I) {
        iter.into_iter().for_each(|p| self.add(p));
    }
}
