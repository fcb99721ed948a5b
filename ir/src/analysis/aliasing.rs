//! Entry input/output aliasing.
//!
//! Entry inputs and outputs are described per flat leaf. The trailing
//! `resource_input_count` input leaves are resource variables that live on the device
//! across executions; the trailing `resource_update_count` output leaves write back to
//! the first resource inputs, in order. Everything else is streamed on every run.

use snafu::ensure;

use crate::error::*;
use crate::instruction::InstId;
use crate::module::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Streamed,
    ResourceModified { output: usize },
    ResourceNotModified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Streamed,
    ResourceModified { input: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub name: String,
    pub parameter: InstId,
    pub slot: usize,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub name: String,
    pub kind: OutputKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputOutputAliasingMap {
    inputs: Vec<InputInfo>,
    outputs: Vec<OutputInfo>,
}

impl InputOutputAliasingMap {
    pub fn new(module: &Module) -> Result<Self> {
        let config = module.config();
        let entry = module.entry();

        let leaves: Vec<(InstId, usize)> = entry
            .parameters
            .iter()
            .flat_map(|&p| (0..module.instruction(p).leaf_count()).map(move |slot| (p, slot)))
            .collect();
        let output_count = module.instruction(entry.root).leaf_count();

        ensure!(
            config.resource_input_count <= leaves.len(),
            MalformedModuleSnafu {
                reason: format!(
                    "{} resource inputs declared but the entry has {} input leaves",
                    config.resource_input_count,
                    leaves.len()
                ),
            }
        );
        ensure!(
            config.resource_update_count <= config.resource_input_count && config.resource_update_count <= output_count,
            MalformedModuleSnafu {
                reason: format!(
                    "{} resource updates declared for {} resource inputs and {} outputs",
                    config.resource_update_count, config.resource_input_count, output_count
                ),
            }
        );

        let first_resource = leaves.len() - config.resource_input_count;
        let first_update = output_count - config.resource_update_count;

        let inputs = leaves
            .iter()
            .enumerate()
            .map(|(index, &(parameter, slot))| {
                let kind = match index.checked_sub(first_resource) {
                    None => InputKind::Streamed,
                    Some(r) if r < config.resource_update_count => {
                        InputKind::ResourceModified { output: first_update + r }
                    }
                    Some(_) => InputKind::ResourceNotModified,
                };
                let name = format!("{}.{slot}", module.instruction(parameter).name);
                InputInfo { name, parameter, slot, kind }
            })
            .collect();

        let outputs = (0..output_count)
            .map(|index| {
                let kind = match index.checked_sub(first_update) {
                    None => OutputKind::Streamed,
                    Some(r) => OutputKind::ResourceModified { input: first_resource + r },
                };
                OutputInfo { name: format!("{}.{index}", module.instruction(entry.root).name), kind }
            })
            .collect();

        Ok(Self { inputs, outputs })
    }

    pub fn inputs(&self) -> &[InputInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    /// Flat input index of `(parameter, slot)`.
    pub fn input_index(&self, parameter: InstId, slot: usize) -> Option<usize> {
        self.inputs.iter().position(|info| info.parameter == parameter && info.slot == slot)
    }

    pub fn input(&self, parameter: InstId, slot: usize) -> Option<&InputInfo> {
        self.input_index(parameter, slot).map(|index| &self.inputs[index])
    }
}
