//! Module construction.
//!
//! ```ignore
//! let mut builder = ModuleBuilder::new("m");
//! let mut main = builder.computation("main");
//! let x = main.parameter(0, Shape::array(PrimitiveType::F32, &[4]));
//! let y = main.binary(BinaryOp::Add, x, x);
//! let main = main.finish(y);
//! let module = builder.build(main)?;
//! ```
//!
//! Instructions are appended in schedule order, so a computation's schedule is the
//! order its instructions were added in. Callees must be finished before they are
//! called.

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use strata_dtype::PrimitiveType;

use crate::config::BackendConfig;
use crate::error::*;
use crate::instruction::{InstId, Instruction};
use crate::module::{Computation, ComputationId, Module, ModuleConfig};
use crate::op::{BinaryOp, CompareDirection, Op, UnaryOp};
use crate::shape::Shape;

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    name: String,
    instructions: Vec<Instruction>,
    computations: Vec<Option<Computation>>,
    pending_names: Vec<String>,
    config: ModuleConfig,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    /// Open a new computation. It must be finished before another one is opened.
    pub fn computation(&mut self, name: impl Into<String>) -> ComputationBuilder<'_> {
        let id = ComputationId::new(self.computations.len() as u32);
        let name = name.into();
        self.computations.push(None);
        self.pending_names.push(name.clone());
        ComputationBuilder { module: self, id, name, schedule: Vec::new(), parameters: Vec::new() }
    }

    fn finished(&self, id: ComputationId) -> Option<&Computation> {
        self.computations.get(id.index()).and_then(Option::as_ref)
    }

    /// Validate the arena and compute the user lists.
    pub fn build(self, entry: ComputationId) -> Result<Module> {
        let mut computations = Vec::with_capacity(self.computations.len());
        for (index, computation) in self.computations.into_iter().enumerate() {
            let computation = computation.with_context(|| MalformedModuleSnafu {
                reason: format!("computation {} was never finished", self.pending_names[index]),
            })?;
            computations.push(computation);
        }
        ensure!(
            entry.index() < computations.len(),
            MalformedModuleSnafu { reason: format!("entry {entry} does not exist") }
        );

        let mut users: Vec<SmallVec<[InstId; 4]>> = vec![SmallVec::new(); self.instructions.len()];
        let mut positions = vec![usize::MAX; self.instructions.len()];
        for computation in &computations {
            for (number, &id) in computation.parameters.iter().enumerate() {
                ensure!(
                    matches!(self.instructions[id.index()].op, Op::Parameter { number: n } if n == number),
                    MalformedModuleSnafu {
                        reason: format!("parameter numbers of {} are not contiguous", computation.name)
                    }
                );
            }
            for (position, &id) in computation.instructions.iter().enumerate() {
                positions[id.index()] = position;
                let inst = &self.instructions[id.index()];
                for &operand in &inst.operands {
                    let operand_inst = &self.instructions[operand.index()];
                    ensure!(
                        operand_inst.parent == inst.parent,
                        MalformedModuleSnafu {
                            reason: format!("{} uses {} from another computation", inst.name, operand_inst.name)
                        }
                    );
                    if !users[operand.index()].contains(&id) {
                        users[operand.index()].push(id);
                    }
                }
            }
        }

        Ok(Module {
            name: self.name,
            instructions: self.instructions,
            users,
            positions,
            computations,
            entry,
            config: self.config,
        })
    }
}

pub struct ComputationBuilder<'a> {
    module: &'a mut ModuleBuilder,
    id: ComputationId,
    name: String,
    schedule: Vec<InstId>,
    parameters: Vec<Option<InstId>>,
}

impl ComputationBuilder<'_> {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    pub fn shape(&self, id: InstId) -> &Shape {
        &self.module.instructions[id.index()].shape
    }

    /// Append an instruction with an explicit shape.
    pub fn add(&mut self, op: Op, operands: &[InstId], shape: Shape) -> InstId {
        let id = InstId::new(self.module.instructions.len() as u32);
        let name = format!("{}.{}", op.kind(), id.index());
        self.module.instructions.push(Instruction {
            id,
            name,
            op,
            operands: SmallVec::from_slice(operands),
            shape,
            parent: self.id,
            sharding: None,
            backend_config: BackendConfig::default(),
        });
        self.schedule.push(id);
        id
    }

    pub fn set_name(&mut self, id: InstId, name: impl Into<String>) -> &mut Self {
        self.module.instructions[id.index()].name = name.into();
        self
    }

    pub fn set_sharding(&mut self, id: InstId, shard: u32) -> &mut Self {
        self.module.instructions[id.index()].sharding = Some(shard);
        self
    }

    pub fn set_backend_config(&mut self, id: InstId, config: BackendConfig) -> &mut Self {
        self.module.instructions[id.index()].backend_config = config;
        self
    }

    /// Attach a JSON-serialized backend config.
    pub fn set_backend_config_json(&mut self, id: InstId, json: &str) -> Result<&mut Self> {
        let inst = &mut self.module.instructions[id.index()];
        inst.backend_config = BackendConfig::from_json(&inst.name, json)?;
        Ok(self)
    }

    pub fn parameter(&mut self, number: usize, shape: Shape) -> InstId {
        let id = self.add(Op::Parameter { number }, &[], shape);
        if self.parameters.len() <= number {
            self.parameters.resize(number + 1, None);
        }
        self.parameters[number] = Some(id);
        id
    }

    pub fn constant(&mut self, values: Vec<f64>, shape: Shape) -> InstId {
        self.add(Op::Constant { values }, &[], shape)
    }

    pub fn scalar_constant(&mut self, element_type: PrimitiveType, value: f64) -> InstId {
        self.constant(vec![value], Shape::scalar(element_type))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: InstId) -> InstId {
        let shape = self.shape(operand).clone();
        self.add(Op::Unary(op), &[operand], shape)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: InstId, rhs: InstId) -> InstId {
        let shape = self.shape(lhs).clone();
        self.add(Op::Binary(op), &[lhs, rhs], shape)
    }

    pub fn compare(&mut self, direction: CompareDirection, lhs: InstId, rhs: InstId) -> InstId {
        let shape = Shape::array(PrimitiveType::Pred, self.shape(lhs).dims());
        self.add(Op::Compare(direction), &[lhs, rhs], shape)
    }

    pub fn select(&mut self, pred: InstId, on_true: InstId, on_false: InstId) -> InstId {
        let shape = self.shape(on_true).clone();
        self.add(Op::Select, &[pred, on_true, on_false], shape)
    }

    pub fn convert(&mut self, operand: InstId, element_type: PrimitiveType) -> InstId {
        let shape = Shape::array(element_type, self.shape(operand).dims());
        self.add(Op::Convert, &[operand], shape)
    }

    pub fn bitcast_convert(&mut self, operand: InstId, element_type: PrimitiveType) -> InstId {
        let shape = Shape::array(element_type, self.shape(operand).dims());
        self.add(Op::BitcastConvert, &[operand], shape)
    }

    pub fn broadcast(&mut self, operand: InstId, shape: Shape, dimensions: &[usize]) -> InstId {
        self.add(Op::Broadcast { dimensions: SmallVec::from_slice(dimensions) }, &[operand], shape)
    }

    pub fn reshape(&mut self, operand: InstId, dims: &[usize]) -> Result<InstId> {
        let source = self.shape(operand);
        let element_type = source.element_type().with_context(|| InvalidShapeSnafu {
            instruction: format!("reshape of {operand}"),
            reason: "operand is not an array",
        })?;
        let shape = Shape::array(element_type, dims);
        ensure!(
            shape.element_count() == source.element_count(),
            InvalidShapeSnafu {
                instruction: format!("reshape of {operand}"),
                reason: format!("{source} cannot be reshaped to {shape}"),
            }
        );
        Ok(self.add(Op::Reshape, &[operand], shape))
    }

    pub fn transpose(&mut self, operand: InstId, permutation: &[usize]) -> Result<InstId> {
        let source = self.shape(operand);
        let element_type = source.element_type().with_context(|| InvalidShapeSnafu {
            instruction: format!("transpose of {operand}"),
            reason: "operand is not an array",
        })?;
        let dims = source.dims();
        let mut seen = vec![false; dims.len()];
        for &p in permutation {
            ensure!(
                p < dims.len() && !std::mem::replace(&mut seen[p], true),
                InvalidShapeSnafu {
                    instruction: format!("transpose of {operand}"),
                    reason: format!("{permutation:?} is not a permutation of {} dimensions", dims.len()),
                }
            );
        }
        let permuted: Vec<usize> = permutation.iter().map(|&p| dims[p]).collect();
        let shape = Shape::array(element_type, &permuted);
        Ok(self.add(Op::Transpose { permutation: SmallVec::from_slice(permutation) }, &[operand], shape))
    }

    /// Matrix product contracting `lhs_contracting` against `rhs_contracting`.
    pub fn dot(
        &mut self,
        lhs: InstId,
        rhs: InstId,
        lhs_contracting: &[usize],
        rhs_contracting: &[usize],
    ) -> Result<InstId> {
        let (lhs_shape, rhs_shape) = (self.shape(lhs), self.shape(rhs));
        let element_type = lhs_shape.element_type().with_context(|| InvalidShapeSnafu {
            instruction: format!("dot of {lhs}"),
            reason: "lhs is not an array",
        })?;
        ensure!(
            lhs_contracting.len() == rhs_contracting.len()
                && lhs_contracting.iter().zip(rhs_contracting).all(|(&l, &r)| {
                    l < lhs_shape.dims().len()
                        && r < rhs_shape.dims().len()
                        && lhs_shape.dims()[l] == rhs_shape.dims()[r]
                }),
            InvalidShapeSnafu {
                instruction: format!("dot of {lhs} and {rhs}"),
                reason: format!("contracting dimensions of {lhs_shape} and {rhs_shape} do not match"),
            }
        );
        let dims: Vec<usize> = lhs_shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !lhs_contracting.contains(i))
            .chain(rhs_shape.dims().iter().enumerate().filter(|(i, _)| !rhs_contracting.contains(i)))
            .map(|(_, &d)| d)
            .collect();
        let op = Op::Dot {
            lhs_contracting: SmallVec::from_slice(lhs_contracting),
            rhs_contracting: SmallVec::from_slice(rhs_contracting),
        };
        Ok(self.add(op, &[lhs, rhs], Shape::array(element_type, &dims)))
    }

    pub fn dynamic_update_slice(&mut self, operand: InstId, update: InstId, indices: &[InstId]) -> InstId {
        let shape = self.shape(operand).clone();
        let mut operands = vec![operand, update];
        operands.extend_from_slice(indices);
        self.add(Op::DynamicUpdateSlice, &operands, shape)
    }

    pub fn iota(&mut self, shape: Shape, dimension: usize) -> InstId {
        self.add(Op::Iota { dimension }, &[], shape)
    }

    pub fn tuple(&mut self, elements: &[InstId]) -> InstId {
        let shape = Shape::tuple(elements.iter().map(|&e| self.shape(e).clone()));
        self.add(Op::Tuple, elements, shape)
    }

    pub fn get_tuple_element(&mut self, operand: InstId, index: usize) -> Result<InstId> {
        let shape = self.shape(operand).tuple_element(index).cloned().with_context(|| InvalidShapeSnafu {
            instruction: format!("get-tuple-element {index} of {operand}"),
            reason: format!("{} has no element {index}", self.shape(operand)),
        })?;
        Ok(self.add(Op::GetTupleElement { index }, &[operand], shape))
    }

    pub fn copy(&mut self, operand: InstId) -> InstId {
        let shape = self.shape(operand).clone();
        self.add(Op::Copy, &[operand], shape)
    }

    /// Call a finished computation; the output shape is the callee root's shape.
    pub fn call(&mut self, computation: ComputationId, operands: &[InstId]) -> Result<InstId> {
        let callee = self.module.finished(computation).with_context(|| MalformedModuleSnafu {
            reason: format!("{computation} is called from {} before it is finished", self.name),
        })?;
        ensure!(
            callee.parameters.len() == operands.len(),
            MalformedModuleSnafu {
                reason: format!(
                    "{} takes {} parameters but is called with {} operands",
                    callee.name,
                    callee.parameters.len(),
                    operands.len()
                ),
            }
        );
        let shape = self.module.instructions[callee.root.index()].shape.clone();
        Ok(self.add(Op::Call { computation }, operands, shape))
    }

    pub fn custom_call(
        &mut self,
        target: impl Into<String>,
        operands: &[InstId],
        shape: Shape,
        inplace_operands: &[usize],
    ) -> InstId {
        let op = Op::CustomCall { target: target.into(), inplace_operands: SmallVec::from_slice(inplace_operands) };
        self.add(op, operands, shape)
    }

    pub fn fifo(&mut self, operand: InstId, depth: usize) -> InstId {
        let shape = self.shape(operand).clone();
        self.add(Op::Fifo { depth }, &[operand], shape)
    }

    pub fn inter_shard_copy(&mut self, operands: &[InstId]) -> InstId {
        let shape = Shape::tuple(operands.iter().map(|&o| self.shape(o).clone()));
        self.add(Op::InterShardCopy, operands, shape)
    }

    pub fn after_all(&mut self, tokens: &[InstId]) -> InstId {
        self.add(Op::AfterAll, tokens, Shape::Token)
    }

    pub fn infeed(&mut self, token: InstId, data: Shape) -> InstId {
        self.add(Op::Infeed, &[token], Shape::tuple([data, Shape::Token]))
    }

    pub fn outfeed(&mut self, data: InstId, token: InstId) -> InstId {
        self.add(Op::Outfeed, &[data, token], Shape::Token)
    }

    pub fn add_dependency(&mut self, operand: InstId, token: InstId) -> InstId {
        let shape = self.shape(operand).clone();
        self.add(Op::AddDependency, &[operand, token], shape)
    }

    pub fn finish(self, root: InstId) -> ComputationId {
        let parameters = self.parameters.into_iter().flatten().collect();
        self.module.computations[self.id.index()] =
            Some(Computation { id: self.id, name: self.name, instructions: self.schedule, parameters, root });
        self.id
    }
}
