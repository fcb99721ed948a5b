use strata_device::Sequence;
use strata_ir::test::fixtures::{dense_module, matrix};
use strata_ir::{Instruction, Module, ModuleBuilder, OpKind, PrimitiveType, Shape, UnaryOp};
use test_case::test_case;

use super::{bind_parameters, context};
use crate::*;

/// `dynamic-update-slice(x, u, [i, i])`, optionally with `x` read afterwards.
fn update_module(read_after: bool) -> Module {
    let mut builder = ModuleBuilder::new("update");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, matrix());
    let i = c.parameter(2, Shape::scalar(PrimitiveType::S32));
    let update = c.dynamic_update_slice(x, u, &[i, i]);
    let mut outputs = vec![update];
    if read_after {
        outputs.push(c.unary(UnaryOp::Neg, x));
    }
    let root = c.tuple(&outputs);
    let entry = c.finish(root);
    builder.build(entry).unwrap()
}

fn find(module: &Module, kind: OpKind) -> &Instruction {
    module.schedule(module.entry_id()).find(|inst| inst.kind() == kind).unwrap()
}

#[test_case(false, 0 ; "operand is dead afterwards")]
#[test_case(true, 1 ; "operand is read afterwards")]
fn test_update_operand(read_after: bool, copies: usize) {
    let module = update_module(read_after);
    let mut cx = context(&module, CompilerOptions::default());
    let map = bind_parameters(&mut cx);
    let update = find(&module, OpKind::DynamicUpdateSlice);
    let x = map.lookup_one(module.operand(update.id, 0), 0).unwrap();

    assert_eq!(is_writable(&cx, &map, update).unwrap(), !read_after);

    let mut seq = Sequence::new();
    let tensors = materialize_inplace_operands(&mut cx, &map, update, &mut seq).unwrap();
    assert_eq!(tensors.len(), 1);
    assert_eq!(tensors[0].len(), 1);
    let program = seq.into_program();
    assert_eq!(program.copy_count(), copies);
    if read_after {
        assert_ne!(tensors[0][0], x);
        assert_eq!(program.copies(), vec![(x.id, tensors[0][0].id)]);
    } else {
        assert_eq!(tensors[0][0], x);
    }
}

#[test]
fn test_constant_operand_is_copied() {
    let mut builder = ModuleBuilder::new("constant_update");
    let mut c = builder.computation("entry");
    let u = c.parameter(0, matrix());
    let i = c.parameter(1, Shape::scalar(PrimitiveType::S32));
    let zeros = c.constant(vec![0.0], matrix());
    let update = c.dynamic_update_slice(zeros, u, &[i, i]);
    let root = c.tuple(&[update]);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    let mut cx = context(&module, CompilerOptions::default());
    let mut map = bind_parameters(&mut cx);
    let constant = find(&module, OpKind::Constant);
    let tensor = cx.graph.add_constant(PrimitiveType::F32, &[4, 4], &[0.0], "zeros").unwrap();
    map.bind(constant, 0, tensor.clone()).unwrap();

    let update = find(&module, OpKind::DynamicUpdateSlice);
    assert!(cx.is_inplace(update.id));
    assert!(!is_writable(&cx, &map, update).unwrap());

    let mut seq = Sequence::new();
    let tensors = materialize_inplace_operands(&mut cx, &map, update, &mut seq).unwrap();
    assert!(tensors[0][0].parallel_writeable);
    assert_eq!(seq.into_program().copies(), vec![(tensor.id, tensors[0][0].id)]);
}

#[test]
fn test_get_tuple_element_takes_its_slots() {
    let mut builder = ModuleBuilder::new("tuples");
    let mut c = builder.computation("entry");
    let p = c.parameter(0, Shape::tuple([matrix(), Shape::tuple([matrix(), matrix()])]));
    let nested = c.get_tuple_element(p, 1).unwrap();
    let root = c.tuple(&[nested]);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    let mut cx = context(&module, CompilerOptions::default());
    let map = bind_parameters(&mut cx);
    let parameter = module.instruction(module.entry().parameters[0]);
    let element = find(&module, OpKind::GetTupleElement);

    let mut seq = Sequence::new();
    let tensors = materialize_inplace_operands(&mut cx, &map, element, &mut seq).unwrap();
    assert_eq!(tensors, vec![map.lookup_range(parameter, 1..3).unwrap()]);
    assert!(seq.is_empty());
}

#[test]
#[should_panic(expected = "not an inplace operation")]
fn test_non_inplace_instruction_panics() {
    let module = dense_module();
    let mut cx = context(&module, CompilerOptions::default());
    let map = bind_parameters(&mut cx);
    let dot = find(&module, OpKind::Dot);
    let _ = materialize_inplace_operands(&mut cx, &map, dot, &mut Sequence::new());
}
