//! In-memory tile graph.
//!
//! [`VirtualGraph`] implements [`TensorBackend`] without a device: it keeps the
//! tensors, their tile mappings, streams and functions, so lowered programs can be
//! inspected and their placement reported.

use bon::bon;
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use strata_dtype::PrimitiveType;
use tracing::trace;

use crate::backend::{Layout, TensorBackend};
use crate::error::*;
use crate::program::{ComputeStep, Function, FunctionId, Program, Stream, StreamDirection, StreamId};
use crate::tensor::{TensorHandle, TensorId, TensorKind, TileInterval, TileMapping};

#[derive(Debug, Clone)]
pub struct VirtualGraph {
    shards: u32,
    tiles_per_shard: usize,
    current_shard: u32,
    tensors: Vec<TensorHandle>,
    /// Mapping of every storage-owning tensor; views resolve through `storage`.
    mappings: Vec<Option<TileMapping>>,
    streams: Vec<Stream>,
    functions: Vec<Function>,
}

#[bon]
impl VirtualGraph {
    #[builder]
    pub fn builder(#[builder(default = 1)] shards: u32, #[builder(default = 4)] tiles_per_shard: usize) -> Self {
        Self {
            shards: shards.max(1),
            tiles_per_shard: tiles_per_shard.max(1),
            current_shard: 0,
            tensors: Vec::new(),
            mappings: Vec::new(),
            streams: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl Default for VirtualGraph {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VirtualGraph {
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    fn first_tile(&self, shard: u32) -> usize {
        shard as usize * self.tiles_per_shard
    }

    fn linear_mapping(&self, elements: usize, shard: u32) -> TileMapping {
        TileMapping::linear(elements, self.first_tile(shard), self.tiles_per_shard)
    }

    /// Row blocks for the left operand, column blocks for the right one.
    fn matmul_mapping(&self, dims: &[usize], operand: usize) -> TileMapping {
        let [rows, cols] = dims else { return self.linear_mapping(dims.iter().product(), self.current_shard) };
        let (rows, cols) = (*rows, *cols);
        if operand == 0 {
            return self.linear_mapping(rows * cols, self.current_shard);
        }
        let first = self.first_tile(self.current_shard);
        let chunk = cols.div_ceil(self.tiles_per_shard).max(1);
        let mut intervals = Vec::new();
        for t in 0..self.tiles_per_shard {
            let (c0, c1) = ((t * chunk).min(cols), ((t + 1) * chunk).min(cols));
            for r in 0..rows {
                intervals.push(TileInterval { tile: first + t, begin: r * cols + c0, end: r * cols + c1 });
            }
        }
        TileMapping::new(intervals)
    }

    fn check(&self, tensor: &TensorHandle) -> Result<()> {
        ensure!(
            self.tensors.get(tensor.id.index()).is_some_and(|t| t.name == tensor.name),
            UnknownTensorSnafu { id: tensor.id }
        );
        Ok(())
    }

    fn push(&mut self, mut handle: TensorHandle, mapping: Option<TileMapping>) -> TensorHandle {
        let id = TensorId::new(self.tensors.len() as u32);
        handle.id = id;
        if mapping.is_some() {
            handle.storage = id;
        }
        trace!(tensor = %handle, kind = %handle.kind, shard = handle.shard, "add tensor");
        self.tensors.push(handle.clone());
        self.mappings.push(mapping);
        handle
    }

    fn view(
        &mut self,
        source: &TensorHandle,
        element_type: PrimitiveType,
        dims: &[usize],
        suffix: &str,
    ) -> TensorHandle {
        let handle = TensorHandle {
            id: source.id,
            storage: source.storage,
            element_type,
            dims: SmallVec::from_slice(dims),
            kind: TensorKind::View,
            parallel_writeable: false,
            shard: source.shard,
            name: format!("{}/{suffix}", source.name),
        };
        self.push(handle, None)
    }
}

impl TensorBackend for VirtualGraph {
    fn shard_count(&self) -> u32 {
        self.shards
    }

    fn tiles_per_shard(&self) -> usize {
        self.tiles_per_shard
    }

    fn current_shard(&self) -> u32 {
        self.current_shard
    }

    fn select_shard(&mut self, shard: u32) -> Result<()> {
        ensure!(shard < self.shards, InvalidShardSnafu { shard, shards: self.shards });
        self.current_shard = shard;
        Ok(())
    }

    fn add_variable(
        &mut self,
        element_type: PrimitiveType,
        dims: &[usize],
        name: &str,
        layout: Layout,
    ) -> Result<TensorHandle> {
        let elements: usize = dims.iter().product();
        let mapping = match layout {
            Layout::Linear => self.linear_mapping(elements, self.current_shard),
            Layout::MatMulOperand { operand } => self.matmul_mapping(dims, operand),
            Layout::Like(other) => {
                let other = self.tensors.get(other.index()).context(UnknownTensorSnafu { id: other })?;
                ensure!(
                    other.element_count() == elements,
                    ShapeMismatchSnafu { tensor: name, expected: other.dims.to_vec(), actual: dims.to_vec() }
                );
                self.tile_mapping(other)?
            }
        };
        let handle = TensorHandle {
            id: TensorId::new(0),
            storage: TensorId::new(0),
            element_type,
            dims: SmallVec::from_slice(dims),
            kind: TensorKind::Variable,
            parallel_writeable: true,
            shard: self.current_shard,
            name: name.to_string(),
        };
        Ok(self.push(handle, Some(mapping)))
    }

    fn add_constant(
        &mut self,
        element_type: PrimitiveType,
        dims: &[usize],
        values: &[f64],
        name: &str,
    ) -> Result<TensorHandle> {
        let elements: usize = dims.iter().product();
        ensure!(
            values.len() == 1 || values.len() == elements,
            ConstantSizeSnafu { name, expected: elements, actual: values.len() }
        );
        let handle = TensorHandle {
            id: TensorId::new(0),
            storage: TensorId::new(0),
            element_type,
            dims: SmallVec::from_slice(dims),
            kind: TensorKind::Constant,
            parallel_writeable: false,
            shard: self.current_shard,
            name: name.to_string(),
        };
        let mapping = TileMapping::single(elements, self.first_tile(self.current_shard));
        Ok(self.push(handle, Some(mapping)))
    }

    fn clone_tensor(&mut self, source: &TensorHandle, name: &str) -> Result<TensorHandle> {
        self.check(source)?;
        let mapping = if source.kind == TensorKind::Variable && source.shard == self.current_shard {
            self.tile_mapping(source)?
        } else {
            self.linear_mapping(source.element_count(), self.current_shard)
        };
        let handle = TensorHandle {
            id: TensorId::new(0),
            storage: TensorId::new(0),
            element_type: source.element_type,
            dims: source.dims.clone(),
            kind: TensorKind::Variable,
            parallel_writeable: true,
            shard: self.current_shard,
            name: name.to_string(),
        };
        Ok(self.push(handle, Some(mapping)))
    }

    fn copy(&self, source: &TensorHandle, destination: &TensorHandle) -> Result<Program> {
        self.check(source)?;
        self.check(destination)?;
        ensure!(
            source.element_type == destination.element_type,
            ElementTypeMismatchSnafu {
                tensor: destination.name.clone(),
                expected: destination.element_type,
                actual: source.element_type,
            }
        );
        ensure!(
            source.dims == destination.dims,
            ShapeMismatchSnafu {
                tensor: destination.name.clone(),
                expected: destination.dims.to_vec(),
                actual: source.dims.to_vec(),
            }
        );
        Ok(Program::copy(source.id, destination.id))
    }

    fn compute(&mut self, name: &str, inputs: &[TensorHandle], outputs: &[TensorHandle]) -> Program {
        Program::Execute(ComputeStep {
            name: name.to_string(),
            inputs: inputs.iter().map(|t| t.id).collect(),
            outputs: outputs.iter().map(|t| t.id).collect(),
            shard: self.current_shard,
        })
    }

    fn reshape(&mut self, source: &TensorHandle, dims: &[usize]) -> Result<TensorHandle> {
        self.check(source)?;
        ensure!(
            dims.iter().product::<usize>() == source.element_count(),
            InvalidViewSnafu {
                tensor: source.name.clone(),
                reason: format!("cannot reshape {:?} to {dims:?}", source.dims.as_slice()),
            }
        );
        Ok(self.view(source, source.element_type, dims, "reshape"))
    }

    fn transpose(&mut self, source: &TensorHandle, permutation: &[usize]) -> Result<TensorHandle> {
        self.check(source)?;
        let mut sorted = permutation.to_vec();
        sorted.sort_unstable();
        ensure!(
            sorted.iter().copied().eq(0..source.dims.len()),
            InvalidViewSnafu {
                tensor: source.name.clone(),
                reason: format!("{permutation:?} is not a permutation of {} dimensions", source.dims.len()),
            }
        );
        let dims: Vec<usize> = permutation.iter().map(|&p| source.dims[p]).collect();
        Ok(self.view(source, source.element_type, &dims, "transpose"))
    }

    fn broadcast(&mut self, source: &TensorHandle, dims: &[usize], dimensions: &[usize]) -> Result<TensorHandle> {
        self.check(source)?;
        let compatible = dimensions.len() == source.dims.len()
            && dimensions.iter().zip(&source.dims).all(|(&d, &s)| d < dims.len() && (s == 1 || dims[d] == s));
        ensure!(
            compatible,
            InvalidViewSnafu {
                tensor: source.name.clone(),
                reason: format!(
                    "cannot broadcast {:?} to {dims:?} along {dimensions:?}",
                    source.dims.as_slice()
                ),
            }
        );
        Ok(self.view(source, source.element_type, dims, "broadcast"))
    }

    fn reinterpret(&mut self, source: &TensorHandle, element_type: PrimitiveType) -> Result<TensorHandle> {
        self.check(source)?;
        ensure!(
            source.element_type.bytes() == element_type.bytes(),
            InvalidViewSnafu {
                tensor: source.name.clone(),
                reason: format!("cannot reinterpret {} as {element_type}", source.element_type),
            }
        );
        let dims = source.dims.clone();
        Ok(self.view(source, element_type, &dims, "reinterpret"))
    }

    fn add_host_to_device_stream(&mut self, name: &str) -> StreamId {
        let id = StreamId::new(self.streams.len() as u32);
        self.streams.push(Stream { id, name: name.to_string(), direction: StreamDirection::HostToDevice });
        id
    }

    fn add_device_to_host_stream(&mut self, name: &str) -> StreamId {
        let id = StreamId::new(self.streams.len() as u32);
        self.streams.push(Stream { id, name: name.to_string(), direction: StreamDirection::DeviceToHost });
        id
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn tile_mapping(&self, tensor: &TensorHandle) -> Result<TileMapping> {
        self.check(tensor)?;
        self.mappings
            .get(tensor.storage.index())
            .and_then(Option::clone)
            .context(UnknownTensorSnafu { id: tensor.storage })
    }

    fn set_linear_mapping(&mut self, tensor: &TensorHandle) -> Result<()> {
        self.check(tensor)?;
        let storage = &self.tensors[tensor.storage.index()];
        let mapping = self.linear_mapping(storage.element_count(), storage.shard);
        self.mappings[tensor.storage.index()] = Some(mapping);
        Ok(())
    }

    fn add_function(&mut self, name: &str, body: Program) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        trace!(function = name, %id, "add function");
        self.functions.push(Function { id, name: name.to_string(), body });
        id
    }

    fn functions(&self) -> &[Function] {
        &self.functions
    }

    fn tensor(&self, id: TensorId) -> Option<&TensorHandle> {
        self.tensors.get(id.index())
    }
}
