//! Entry computation.
//!
//! Entry parameters are allocated on the device and filled from host streams;
//! outputs are streamed back. Streamed tensors move with every execution of the
//! main program, resource variables only through the separate host-to-device and
//! device-to-host programs. A resource the computation updates is written back into
//! its input tensor; a read-only resource is cloned before anything can write it.

use snafu::ResultExt;
use strata_device::{Program, Sequence, TensorHandle};
use strata_ir::Instruction;
use strata_ir::analysis::{InputKind, OutputKind};
use tracing::{debug, trace};

use super::{Boundary, VisitorState, allocate_input, can_defer};
use crate::context::CompilationContext;
use crate::error::*;

#[derive(Debug, Clone, Default)]
pub struct Entry {
    host_to_device: Sequence,
    device_to_host: Sequence,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_to_device(&self) -> &Sequence {
        &self.host_to_device
    }

    pub fn device_to_host(&self) -> &Sequence {
        &self.device_to_host
    }

    /// `(host_to_device, device_to_host)`.
    pub fn into_programs(self) -> (Sequence, Sequence) {
        (self.host_to_device, self.device_to_host)
    }

    fn prepare_input(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        parameter: &Instruction,
        slot: usize,
        tensor: TensorHandle,
    ) -> Result<TensorHandle> {
        let Some(info) = cx.annotations.aliasing.input(parameter.id, slot).cloned() else {
            panic!("entry input {}.{slot} is missing from the aliasing map", parameter.name);
        };

        if !cx.options.synthetic_data {
            let stream = cx.graph.add_host_to_device_stream(&info.name);
            let program = Program::StreamToDevice { stream, tensor: tensor.id };
            match info.kind {
                InputKind::Streamed => state.sequence.add(program),
                _ => self.host_to_device.add(program),
            }
        }

        if info.kind != InputKind::ResourceNotModified {
            return Ok(tensor);
        }
        trace!(input = %info.name, "clone read-only resource");
        let clone = cx
            .graph
            .clone_tensor(&tensor, &format!("{}.resource_not_modified_clone", info.name))
            .context(DeviceSnafu { instruction: &parameter.name })?;
        state.sequence.add(cx.graph.copy(&tensor, &clone).context(DeviceSnafu { instruction: &parameter.name })?);
        Ok(clone)
    }
}

impl Boundary for Entry {
    fn parameter(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<()> {
        for (slot, leaf) in inst.shape.leaves().into_iter().enumerate() {
            if can_defer(cx, (inst.id, slot)) {
                state.defer((inst.id, slot));
                continue;
            }
            let tensor = allocate_input(cx, &state.tensor_map, inst, slot, leaf)?;
            let tensor = self.prepare_input(cx, state, inst, slot, tensor)?;
            state.tensor_map.bind(inst, slot, tensor)?;
        }
        Ok(())
    }

    fn deferred_input(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        parameter: &Instruction,
        slot: usize,
        tensor: TensorHandle,
    ) -> Result<TensorHandle> {
        self.prepare_input(cx, state, parameter, slot, tensor)
    }

    fn finish(&mut self, cx: &mut CompilationContext<'_>, state: &mut VisitorState, root: &Instruction) -> Result<()> {
        let module = cx.module;
        let outputs = state.tensor_map.lookup_all(root)?;
        let infos = cx.annotations.aliasing.outputs().to_vec();
        assert_eq!(outputs.len(), infos.len(), "entry outputs of {}", root.name);

        for (tensor, info) in outputs.iter().zip(&infos) {
            if let OutputKind::ResourceModified { input } = info.kind {
                let input = &cx.annotations.aliasing.inputs()[input];
                let resource = state.tensor_map.lookup_one(module.instruction(input.parameter), input.slot)?;
                if resource != *tensor {
                    trace!(output = %info.name, resource = %resource, "write back resource");
                    let copy = cx.graph.copy(tensor, &resource).context(DeviceSnafu { instruction: &root.name })?;
                    state.sequence.add(copy);
                }
            }
            if cx.options.synthetic_data {
                continue;
            }
            let stream = cx.graph.add_device_to_host_stream(&info.name);
            let program = Program::StreamFromDevice { stream, tensor: tensor.id };
            match info.kind {
                OutputKind::Streamed => state.sequence.add(program),
                OutputKind::ResourceModified { .. } => self.device_to_host.add(program),
            }
        }

        debug!(
            outputs = outputs.len(),
            host_to_device = self.host_to_device.len(),
            device_to_host = self.device_to_host.len(),
            "entry streams ready"
        );
        state.outputs = outputs;
        Ok(())
    }
}
