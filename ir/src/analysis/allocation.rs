//! Allocation targets.
//!
//! A parameter leaf that reaches a layout-sensitive consumer only through
//! get-tuple-element instructions is better allocated with the consumer's preferred
//! layout than with the default linear one. This pass records, for each such leaf, the
//! consumer, the operand position it feeds and the forwarding path in between.

use std::collections::BTreeMap;

use crate::instruction::InstId;
use crate::module::Module;
use crate::op::{Op, OpKind};

/// A flat output slot of an instruction.
pub type TensorSource = (InstId, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLayout {
    /// Operand of a matrix product.
    MatMulOperand,
    /// Same mapping as `other`, a sibling operand of the consumer.
    LikeOperand { other: InstId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTarget {
    pub consumer: InstId,
    pub operand: usize,
    pub layout: TargetLayout,
    /// Get-tuple-element instructions between the source and the consumer, in order.
    pub path: Vec<InstId>,
}

#[tracing::instrument(skip_all, fields(module = module.name()))]
pub fn find_allocation_targets(module: &Module) -> BTreeMap<TensorSource, AllocationTarget> {
    let mut targets = BTreeMap::new();
    for computation in module.computations() {
        for &parameter in &computation.parameters {
            for slot in 0..module.instruction(parameter).leaf_count() {
                let mut path = Vec::new();
                if let Some(target) = search(module, parameter, slot, &mut path) {
                    tracing::trace!(
                        parameter = %module.instruction(parameter).name,
                        slot,
                        consumer = %module.instruction(target.consumer).name,
                        "allocation target"
                    );
                    targets.insert((parameter, slot), target);
                }
            }
        }
    }
    targets
}

fn search(module: &Module, current: InstId, slot: usize, path: &mut Vec<InstId>) -> Option<AllocationTarget> {
    let current_inst = module.instruction(current);
    for &user in module.users(current) {
        let user_inst = module.instruction(user);
        match &user_inst.op {
            Op::GetTupleElement { index } => {
                let Some(range) = current_inst.shape.tuple_slot_range(*index) else { continue };
                if !range.contains(&slot) {
                    continue;
                }
                path.push(user);
                if let Some(target) = search(module, user, slot - range.start, path) {
                    return Some(target);
                }
                path.pop();
            }
            Op::Dot { .. } if current_inst.shape.is_array() => {
                let operand = user_inst.operands.iter().position(|&o| o == current)?;
                return Some(AllocationTarget {
                    consumer: user,
                    operand,
                    layout: TargetLayout::MatMulOperand,
                    path: path.clone(),
                });
            }
            Op::Binary(_) if current_inst.shape.is_array() => {
                let operand = user_inst.operands.iter().position(|&o| o == current)?;
                let other = user_inst.operands[1 - operand];
                if other != current && module.instruction(other).kind() == OpKind::Dot {
                    return Some(AllocationTarget {
                        consumer: user,
                        operand,
                        layout: TargetLayout::LikeOperand { other },
                        path: path.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    None
}
