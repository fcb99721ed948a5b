//! Tensor mapping report.
//!
//! Lists, for every bound output slot of every lowered computation, the tensor it
//! lives in and how that tensor is spread over tiles.

use std::collections::BTreeMap;

use serde::Serialize;
use snafu::ResultExt;
use strata_codegen::CompilationContext;

use crate::error::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorMapping {
    pub instruction: String,
    pub slot: usize,
    pub tensor: String,
    /// Number of distinct tiles holding elements.
    pub tiles: usize,
    /// `(tile, elements)` in increasing tile order.
    pub elements_per_tile: Vec<(usize, usize)>,
    pub total_elements: usize,
    pub constant: bool,
}

/// Mappings grouped by computation name, each group in instruction then slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TensorMapReport {
    computations: BTreeMap<String, Vec<TensorMapping>>,
}

impl TensorMapReport {
    pub fn new(cx: &CompilationContext<'_>) -> Result<Self> {
        let mut computations = BTreeMap::new();
        for (name, map) in &cx.tensor_maps {
            let mappings = map
                .iter()
                .map(|(id, slot, tensor)| {
                    let instruction = &cx.module.instruction(id).name;
                    let mapping = cx.graph.tile_mapping(tensor).context(TileMappingSnafu { instruction, slot })?;
                    Ok(TensorMapping {
                        instruction: instruction.clone(),
                        slot,
                        tensor: tensor.name.clone(),
                        tiles: mapping.tile_count(),
                        elements_per_tile: mapping.elements_per_tile(),
                        total_elements: mapping.element_count(),
                        constant: tensor.is_constant(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            computations.insert(name.clone(), mappings);
        }
        Ok(Self { computations })
    }

    pub fn computation(&self, name: &str) -> Option<&[TensorMapping]> {
        self.computations.get(name).map(Vec::as_slice)
    }

    pub fn computations(&self) -> impl Iterator<Item = (&str, &[TensorMapping])> {
        self.computations.iter().map(|(name, mappings)| (name.as_str(), mappings.as_slice()))
    }

    /// Mapping of output `slot` of `instruction` in `computation`.
    pub fn find(&self, computation: &str, instruction: &str, slot: usize) -> Option<&TensorMapping> {
        self.computation(computation)?.iter().find(|m| m.instruction == instruction && m.slot == slot)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context(ReportSnafu)
    }
}
