//! Element types of device tensors.
//!
//! [`PrimitiveType`] is the element type carried by every array shape in the IR and
//! every tensor handle allocated on the device. Sets of types are expressed with
//! [`enumset::EnumSet`].


use enumset::EnumSet;

/// Primitive element type of an array.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[derive(enumset::EnumSetType)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[enumset(repr = "u32")]
pub enum PrimitiveType {
    Pred = 0,

    S8 = 1,
    U8 = 2,
    S16 = 3,
    U16 = 4,
    S32 = 5,
    U32 = 6,
    S64 = 7,
    U64 = 8,

    F16 = 9,
    BF16 = 10,
    F32 = 11,
    F64 = 12,
}

impl PrimitiveType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Pred | Self::S8 | Self::U8 => 1,
            Self::S16 | Self::U16 | Self::F16 | Self::BF16 => 2,
            Self::S32 | Self::U32 | Self::F32 => 4,
            Self::S64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub const fn is_pred(&self) -> bool {
        matches!(self, Self::Pred)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Types for which the device supports stochastic rounding.
    pub fn stochastic_rounding_types() -> EnumSet<Self> {
        Self::F16 | Self::BF16 | Self::F32
    }

    /// Whether a value of this type is affected by stochastic rounding.
    pub fn rounds_stochastically(&self) -> bool {
        Self::stochastic_rounding_types().contains(*self)
    }

    /// Size in bytes of a dense array of `elements` values.
    pub const fn size_of(&self, elements: usize) -> usize {
        self.bytes() * elements
    }
}
