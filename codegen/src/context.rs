//! State shared by every visitor of one compilation.

use std::collections::{BTreeMap, BTreeSet};

use strata_device::{FunctionId, TensorBackend, TensorHandle};
use strata_ir::analysis::{
    AllocationTarget, InputOutputAliasingMap, TensorSource, find_allocation_targets, find_inplace_instructions,
};
use strata_ir::{ComputationId, FeedConfig, InstId, Module, Shape};
use tracing::debug;

use crate::custom_ops::CustomOpRegistry;
use crate::error::*;
use crate::options::CompilerOptions;
use crate::tensor_map::TensorMap;

/// Results of the static analyses run before lowering.
#[derive(Debug, Clone)]
pub struct Annotations {
    /// Inplace-type instructions that may actually run in place.
    pub inplace: BTreeSet<InstId>,
    pub allocation_targets: BTreeMap<TensorSource, AllocationTarget>,
    pub aliasing: InputOutputAliasingMap,
}

impl Annotations {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            inplace: find_inplace_instructions(module),
            allocation_targets: find_allocation_targets(module),
            aliasing: InputOutputAliasingMap::new(module)?,
        })
    }
}

/// Host feed created while lowering an infeed or outfeed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedInfo {
    pub instruction: String,
    pub config: FeedConfig,
    /// Array leaves transferred per iteration.
    pub shapes: Vec<Shape>,
}

/// A computation lowered into a device function.
#[derive(Debug, Clone)]
pub struct CachedFunction {
    pub function: FunctionId,
    /// Tensors the function reads its parameters from, per parameter.
    pub inputs: Vec<Vec<TensorHandle>>,
    /// Whether each input leaf is read at all.
    pub used: Vec<Vec<bool>>,
    pub outputs: Vec<TensorHandle>,
}

pub struct CompilationContext<'m> {
    pub module: &'m Module,
    pub graph: Box<dyn TensorBackend>,
    pub annotations: Annotations,
    pub options: CompilerOptions,
    pub custom_ops: CustomOpRegistry,
    /// Binding tables of finished computations, by computation name.
    pub tensor_maps: BTreeMap<String, TensorMap>,
    pub(crate) functions: BTreeMap<ComputationId, CachedFunction>,
    pub infeeds: Vec<FeedInfo>,
    pub outfeeds: Vec<FeedInfo>,
}

impl<'m> CompilationContext<'m> {
    #[tracing::instrument(skip_all, fields(module = module.name()))]
    pub fn new(module: &'m Module, graph: Box<dyn TensorBackend>, options: CompilerOptions) -> Result<Self> {
        let annotations = Annotations::new(module)?;
        debug!(
            inplace = annotations.inplace.len(),
            allocation_targets = annotations.allocation_targets.len(),
            "annotations ready"
        );
        Ok(Self {
            module,
            graph,
            annotations,
            options,
            custom_ops: CustomOpRegistry::default(),
            tensor_maps: BTreeMap::new(),
            functions: BTreeMap::new(),
            infeeds: Vec::new(),
            outfeeds: Vec::new(),
        })
    }

    pub fn with_custom_ops(mut self, custom_ops: CustomOpRegistry) -> Self {
        self.custom_ops = custom_ops;
        self
    }

    pub fn is_inplace(&self, id: InstId) -> bool {
        self.annotations.inplace.contains(&id)
    }

    /// Device function `computation` was lowered into, if it was called as a function.
    pub fn function(&self, computation: ComputationId) -> Option<&CachedFunction> {
        self.functions.get(&computation)
    }
}
