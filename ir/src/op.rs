//! Instruction opcodes.
//!
//! [`Op`] carries the attributes of each opcode; [`OpKind`] is its fieldless tag and
//! is what lowering tables are keyed by.

use smallvec::SmallVec;

use crate::ComputationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumCount, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum OpKind {
    Parameter,
    Constant,
    Unary,
    Binary,
    Compare,
    Select,
    Convert,
    BitcastConvert,
    Broadcast,
    Reshape,
    Transpose,
    Dot,
    DynamicUpdateSlice,
    Iota,
    Tuple,
    GetTupleElement,
    Copy,
    Call,
    CustomCall,
    Fifo,
    InterShardCopy,
    Infeed,
    Outfeed,
    AfterAll,
    AddDependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Tanh,
    Sqrt,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompareDirection {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Computation input `number`.
    Parameter { number: usize },

    /// Dense literal in row-major order.
    Constant { values: Vec<f64> },

    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare(CompareDirection),

    /// `select(pred, on_true, on_false)`.
    Select,

    /// Element type conversion.
    Convert,

    /// Reinterpretation of the element bits as another type of the same width.
    BitcastConvert,

    /// Broadcast of the operand into the output shape; `dimensions` maps operand
    /// dimensions to output dimensions.
    Broadcast { dimensions: SmallVec<[usize; 4]> },

    Reshape,

    Transpose { permutation: SmallVec<[usize; 4]> },

    /// Matrix product without batch dimensions.
    Dot { lhs_contracting: SmallVec<[usize; 2]>, rhs_contracting: SmallVec<[usize; 2]> },

    /// `dynamic_update_slice(operand, update, indices...)` writing into `operand`.
    DynamicUpdateSlice,

    Iota { dimension: usize },

    Tuple,

    GetTupleElement { index: usize },

    Copy,

    /// Call of another computation; the role of the call is taken from its backend config.
    Call { computation: ComputationId },

    /// Call of a registered custom operation. Operands listed in `inplace_operands`
    /// are updated in place.
    CustomCall { target: String, inplace_operands: SmallVec<[usize; 2]> },

    /// Buffer holding a value for `depth` pipeline iterations.
    Fifo { depth: usize },

    /// Copy of every operand onto the shard of this instruction.
    InterShardCopy,

    /// Read from a host feed; the output is `(data, token)`.
    Infeed,

    /// Write operand 0 to a host feed; operand 1 is the ordering token.
    Outfeed,

    /// Join of ordering tokens.
    AfterAll,

    /// Forward operand 0 once operand 1 (a token) is available.
    AddDependency,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Parameter { .. } => OpKind::Parameter,
            Self::Constant { .. } => OpKind::Constant,
            Self::Unary(_) => OpKind::Unary,
            Self::Binary(_) => OpKind::Binary,
            Self::Compare(_) => OpKind::Compare,
            Self::Select => OpKind::Select,
            Self::Convert => OpKind::Convert,
            Self::BitcastConvert => OpKind::BitcastConvert,
            Self::Broadcast { .. } => OpKind::Broadcast,
            Self::Reshape => OpKind::Reshape,
            Self::Transpose { .. } => OpKind::Transpose,
            Self::Dot { .. } => OpKind::Dot,
            Self::DynamicUpdateSlice => OpKind::DynamicUpdateSlice,
            Self::Iota { .. } => OpKind::Iota,
            Self::Tuple => OpKind::Tuple,
            Self::GetTupleElement { .. } => OpKind::GetTupleElement,
            Self::Copy => OpKind::Copy,
            Self::Call { .. } => OpKind::Call,
            Self::CustomCall { .. } => OpKind::CustomCall,
            Self::Fifo { .. } => OpKind::Fifo,
            Self::InterShardCopy => OpKind::InterShardCopy,
            Self::Infeed => OpKind::Infeed,
            Self::Outfeed => OpKind::Outfeed,
            Self::AfterAll => OpKind::AfterAll,
            Self::AddDependency => OpKind::AddDependency,
        }
    }

    /// Callee of a `Call`.
    pub fn called_computation(&self) -> Option<ComputationId> {
        match self {
            Self::Call { computation } => Some(*computation),
            _ => None,
        }
    }
}
