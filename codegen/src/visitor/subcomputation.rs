//! Called computations.
//!
//! Parameters of a called computation either alias the caller's tensors or get
//! fresh storage the caller copies its arguments into. Fresh storage is skipped
//! for inputs the body never reads.

use std::collections::BTreeSet;

use snafu::ResultExt;
use strata_device::TensorHandle;
use strata_ir::{Instruction, Module, Op, OpKind};
use tracing::trace;

use super::{Boundary, VisitorState, allocate_input, can_defer};
use crate::context::CompilationContext;
use crate::error::*;

/// Where a called computation takes its parameter tensors from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// Fresh storage for every parameter.
    Fresh,
    /// The caller's tensors.
    Inplace,
    /// Fresh storage for the listed parameter numbers, the caller's tensors otherwise.
    FreshParameters(BTreeSet<usize>),
}

impl InputMode {
    fn is_fresh(&self, number: usize) -> bool {
        match self {
            Self::Fresh => true,
            Self::Inplace => false,
            Self::FreshParameters(numbers) => numbers.contains(&number),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubComputation {
    arguments: Vec<Vec<TensorHandle>>,
    mode: InputMode,
    inputs: Vec<Vec<Option<TensorHandle>>>,
}

impl SubComputation {
    pub fn new(arguments: Vec<Vec<TensorHandle>>, mode: InputMode) -> Self {
        let inputs = arguments.iter().map(|leaves| vec![None; leaves.len()]).collect();
        Self { arguments, mode, inputs }
    }

    /// Parameters bound to fresh tensors; used for function calls.
    pub fn fresh(arguments: Vec<Vec<TensorHandle>>) -> Self {
        Self::new(arguments, InputMode::Fresh)
    }

    /// Parameters bound to the caller's tensors; used for inline calls.
    pub fn inplace(arguments: Vec<Vec<TensorHandle>>) -> Self {
        Self::new(arguments, InputMode::Inplace)
    }

    pub fn arguments(&self) -> &[Vec<TensorHandle>] {
        &self.arguments
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    /// Tensors the body reads each input leaf from, with whether the body reads it
    /// at all. Unread leaves report the caller's tensor.
    pub fn visitor_inputs(&self) -> (Vec<Vec<TensorHandle>>, Vec<Vec<bool>>) {
        self.arguments
            .iter()
            .zip(&self.inputs)
            .map(|(arguments, inputs)| {
                arguments
                    .iter()
                    .zip(inputs)
                    .map(|(argument, input)| match input {
                        Some(input) => (input.clone(), true),
                        None => (argument.clone(), false),
                    })
                    .unzip::<_, _, Vec<_>, Vec<_>>()
            })
            .unzip()
    }

    fn record(&mut self, number: usize, slot: usize, tensor: &TensorHandle) {
        self.inputs[number][slot] = Some(tensor.clone());
    }
}

fn parameter_number(inst: &Instruction) -> usize {
    match inst.op {
        Op::Parameter { number } => number,
        _ => panic!("{} is not a parameter", inst.name),
    }
}

/// Whether leaf `slot` of `parameter` is never read: the parameter has no users, or
/// it is a flat tuple only read through get-tuple-elements of other elements.
pub fn input_is_unused(module: &Module, parameter: &Instruction, slot: usize) -> bool {
    if module.is_root(parameter.id) {
        return false;
    }
    let users = module.users(parameter.id);
    if users.is_empty() {
        return true;
    }
    let shape = &parameter.shape;
    if !shape.is_tuple() || shape.leaf_count() != shape.tuple_len() {
        return false;
    }
    users.iter().all(|&user| {
        let user = module.instruction(user);
        user.kind() == OpKind::GetTupleElement && !matches!(user.op, Op::GetTupleElement { index } if index == slot)
    })
}

impl Boundary for SubComputation {
    fn parameter(
        &mut self,
        cx: &mut CompilationContext<'_>,
        state: &mut VisitorState,
        inst: &Instruction,
    ) -> Result<()> {
        let module = cx.module;
        let number = parameter_number(inst);
        let Some(arguments) = self.arguments.get(number).cloned() else {
            panic!("{} has no argument for parameter {number}", inst.name);
        };
        assert_eq!(arguments.len(), inst.leaf_count(), "argument leaves of {}", inst.name);

        if !self.mode.is_fresh(number) {
            for (slot, argument) in arguments.iter().enumerate() {
                self.record(number, slot, argument);
            }
            return state.bind_outputs(inst, arguments);
        }

        let leaves = inst.shape.leaves();
        for (slot, argument) in arguments.into_iter().enumerate() {
            if input_is_unused(module, inst, slot) {
                trace!(parameter = %inst.name, slot, "unused input");
                state.tensor_map.bind(inst, slot, argument)?;
                continue;
            }
            if can_defer(cx, (inst.id, slot)) {
                state.defer((inst.id, slot));
                continue;
            }
            let tensor = if argument.is_constant() {
                allocate_input(cx, &state.tensor_map, inst, slot, leaves[slot])?
            } else {
                cx.graph
                    .clone_tensor(&argument, &format!("{}.{slot}", inst.name))
                    .context(DeviceSnafu { instruction: &inst.name })?
            };
            self.record(number, slot, &tensor);
            state.tensor_map.bind(inst, slot, tensor)?;
        }
        Ok(())
    }

    fn deferred_input(
        &mut self,
        _cx: &mut CompilationContext<'_>,
        _state: &mut VisitorState,
        parameter: &Instruction,
        slot: usize,
        tensor: TensorHandle,
    ) -> Result<TensorHandle> {
        self.record(parameter_number(parameter), slot, &tensor);
        Ok(tensor)
    }
}
