//! Tensor handles and tile mappings.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use smallvec::SmallVec;
use strata_dtype::PrimitiveType;

/// Index of a tensor in the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TensorId(u32);

impl TensorId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TensorKind {
    /// Writable device storage.
    Variable,
    /// Literal data baked into the program.
    Constant,
    /// Reinterpretation of another tensor's storage.
    View,
}

/// Reference to a tensor owned by a [`TensorBackend`](crate::TensorBackend).
///
/// Handles compare equal iff they name the same tensor. `storage` is the tensor
/// that owns the memory; it differs from `id` only for views.
#[derive(Debug, Clone)]
pub struct TensorHandle {
    pub id: TensorId,
    pub storage: TensorId,
    pub element_type: PrimitiveType,
    pub dims: SmallVec<[usize; 4]>,
    pub kind: TensorKind,
    /// Writing through this handle cannot be observed through any other live alias.
    pub parallel_writeable: bool,
    pub shard: u32,
    pub name: String,
}

impl TensorHandle {
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_constant(&self) -> bool {
        self.kind == TensorKind::Constant
    }

    pub fn is_view(&self) -> bool {
        self.kind == TensorKind::View
    }

    /// Whether both handles have the same element type and dimensions.
    pub fn same_shape(&self, other: &TensorHandle) -> bool {
        self.element_type == other.element_type && self.dims == other.dims
    }
}

impl PartialEq for TensorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TensorHandle {}

impl Hash for TensorHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}{:?})", self.name, self.element_type, self.dims.as_slice())
    }
}

/// Contiguous run of elements `[begin, end)` placed on `tile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileInterval {
    pub tile: usize,
    pub begin: usize,
    pub end: usize,
}

impl TileInterval {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Placement of a tensor's elements on tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TileMapping(Vec<TileInterval>);

impl TileMapping {
    pub fn new(intervals: Vec<TileInterval>) -> Self {
        Self(intervals.into_iter().filter(|interval| !interval.is_empty()).collect())
    }

    /// Split `elements` into equal chunks over `tiles` consecutive tiles from `first_tile`.
    pub fn linear(elements: usize, first_tile: usize, tiles: usize) -> Self {
        let chunk = elements.div_ceil(tiles.max(1)).max(1);
        let intervals = (0..tiles)
            .map(|t| TileInterval {
                tile: first_tile + t,
                begin: (t * chunk).min(elements),
                end: ((t + 1) * chunk).min(elements),
            })
            .collect();
        Self::new(intervals)
    }

    /// Everything on a single tile.
    pub fn single(elements: usize, tile: usize) -> Self {
        Self::new(vec![TileInterval { tile, begin: 0, end: elements }])
    }

    pub fn intervals(&self) -> &[TileInterval] {
        &self.0
    }

    /// Distinct tiles holding at least one element, in increasing order.
    pub fn tiles(&self) -> Vec<usize> {
        let mut tiles: Vec<usize> = self.0.iter().map(|interval| interval.tile).collect();
        tiles.sort_unstable();
        tiles.dedup();
        tiles
    }

    pub fn tile_count(&self) -> usize {
        self.tiles().len()
    }

    /// `(tile, elements)` for every used tile, in increasing tile order.
    pub fn elements_per_tile(&self) -> Vec<(usize, usize)> {
        self.tiles()
            .into_iter()
            .map(|tile| (tile, self.0.iter().filter(|i| i.tile == tile).map(TileInterval::len).sum()))
            .collect()
    }

    pub fn element_count(&self) -> usize {
        self.0.iter().map(TileInterval::len).sum()
    }
}
