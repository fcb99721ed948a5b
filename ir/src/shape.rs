//! Array, tuple and token shapes.
//!
//! Tuple-shaped values are lowered to a flat list of array leaves ("slots"). Tokens
//! carry ordering only and occupy no slot.

use std::fmt;
use std::ops::Range;

use smallvec::SmallVec;
use strata_dtype::PrimitiveType;

pub type Dims = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Array { element_type: PrimitiveType, dims: Dims },
    Tuple(Vec<Shape>),
    Token,
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dims: &[usize]) -> Self {
        Self::Array { element_type, dims: SmallVec::from_slice(dims) }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::array(element_type, &[])
    }

    pub fn tuple(elements: impl IntoIterator<Item = Shape>) -> Self {
        Self::Tuple(elements.into_iter().collect())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token)
    }

    pub fn element_type(&self) -> Option<PrimitiveType> {
        match self {
            Self::Array { element_type, .. } => Some(*element_type),
            _ => None,
        }
    }

    /// Dimensions of an array shape; empty for tuples and tokens.
    pub fn dims(&self) -> &[usize] {
        match self {
            Self::Array { dims, .. } => dims,
            _ => &[],
        }
    }

    /// Number of elements over all array leaves.
    pub fn element_count(&self) -> usize {
        match self {
            Self::Array { dims, .. } => dims.iter().product(),
            Self::Tuple(elements) => elements.iter().map(Shape::element_count).sum(),
            Self::Token => 0,
        }
    }

    pub fn tuple_element(&self, index: usize) -> Option<&Shape> {
        match self {
            Self::Tuple(elements) => elements.get(index),
            _ => None,
        }
    }

    pub fn tuple_len(&self) -> usize {
        match self {
            Self::Tuple(elements) => elements.len(),
            _ => 0,
        }
    }

    /// Number of flat slots this shape occupies.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Array { .. } => 1,
            Self::Tuple(elements) => elements.iter().map(Shape::leaf_count).sum(),
            Self::Token => 0,
        }
    }

    /// Array leaves in slot order.
    pub fn leaves(&self) -> Vec<&Shape> {
        let mut leaves = Vec::with_capacity(self.leaf_count());
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Shape>) {
        match self {
            Self::Array { .. } => out.push(self),
            Self::Tuple(elements) => elements.iter().for_each(|e| e.collect_leaves(out)),
            Self::Token => {}
        }
    }

    /// Flat slot range covered by tuple element `index`.
    pub fn tuple_slot_range(&self, index: usize) -> Option<Range<usize>> {
        let Self::Tuple(elements) = self else { return None };
        let element = elements.get(index)?;
        let start: usize = elements[..index].iter().map(Shape::leaf_count).sum();
        Some(start..start + element.leaf_count())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { element_type, dims } => {
                write!(f, "{element_type}[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Self::Token => write!(f, "token[]"),
        }
    }
}
