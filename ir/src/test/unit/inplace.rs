use test_case::test_case;

use crate::analysis::*;
use crate::test::fixtures::{PipelineSpec, matrix, pipeline_module};
use crate::*;

fn index() -> Shape {
    Shape::scalar(PrimitiveType::S32)
}

/// `dus = dynamic_update_slice(x, u, i)`, optionally followed by a read of `x`.
fn update_module(read_after: bool) -> (Module, InstId) {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, Shape::array(PrimitiveType::F32, &[1, 4]));
    let i = c.parameter(2, index());
    let dus = c.dynamic_update_slice(x, u, &[i, i]);
    let root = if read_after { c.binary(BinaryOp::Add, x, dus) } else { dus };
    let entry = c.finish(root);
    (builder.build(entry).unwrap(), dus)
}

#[test]
fn test_update_without_later_reader_runs_inplace() {
    let (module, dus) = update_module(false);
    assert!(find_inplace_instructions(&module).contains(&dus));
}

#[test]
fn test_update_with_later_reader_is_not_inplace() {
    let (module, dus) = update_module(true);
    assert!(is_inplace_type(&module, module.instruction(dus)));
    assert!(!find_inplace_instructions(&module).contains(&dus));
}

#[test]
fn test_reader_through_forwarding_keeps_value_live() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, Shape::array(PrimitiveType::F32, &[1, 4]));
    let i = c.parameter(2, index());
    let t = c.tuple(&[x]);
    let alias = c.get_tuple_element(t, 0).unwrap();
    let dus = c.dynamic_update_slice(alias, u, &[i, i]);
    let root = c.binary(BinaryOp::Add, x, dus);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    let inplace = find_inplace_instructions(&module);
    assert!(!inplace.contains(&dus));
    assert!(inplace.contains(&alias));
    assert!(inplace.contains(&t));
}

#[derive(Debug, Clone, Copy)]
enum View {
    Reshape,
    Transpose,
    Broadcast,
}

/// `v = view(x)`, then `dus = dynamic_update_slice(x, u, i)`, then `neg(v)`.
#[test_case(View::Reshape ; "reshape")]
#[test_case(View::Transpose ; "transpose")]
#[test_case(View::Broadcast ; "broadcast")]
fn test_reader_through_view_keeps_value_live(view: View) {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, Shape::array(PrimitiveType::F32, &[1, 4]));
    let i = c.parameter(2, index());
    let v = match view {
        View::Reshape => c.reshape(x, &[16]).unwrap(),
        View::Transpose => c.transpose(x, &[1, 0]).unwrap(),
        View::Broadcast => c.broadcast(x, Shape::array(PrimitiveType::F32, &[2, 4, 4]), &[1, 2]),
    };
    let dus = c.dynamic_update_slice(x, u, &[i, i]);
    let n = c.unary(UnaryOp::Neg, v);
    let root = c.tuple(&[dus, n]);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    assert!(module.schedule_position(n) > module.schedule_position(dus));
    assert!(is_view(module.instruction(v)));
    assert!(!find_inplace_instructions(&module).contains(&dus));
}

#[test]
fn test_view_read_before_update_allows_inplace() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, Shape::array(PrimitiveType::F32, &[1, 4]));
    let i = c.parameter(2, index());
    let v = c.transpose(x, &[1, 0]).unwrap();
    let n = c.unary(UnaryOp::Neg, v);
    let dus = c.dynamic_update_slice(x, u, &[i, i]);
    let root = c.tuple(&[n, dus]);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    assert!(find_inplace_instructions(&module).contains(&dus));
}

/// The update writes through a view of `x` while `x` is read afterwards.
#[test]
fn test_update_of_view_keeps_viewed_value_live() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let u = c.parameter(1, Shape::array(PrimitiveType::F32, &[1, 4]));
    let i = c.parameter(2, index());
    let v = c.transpose(x, &[1, 0]).unwrap();
    let dus = c.dynamic_update_slice(v, u, &[i, i]);
    let root = c.binary(BinaryOp::Add, x, dus);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    assert!(!find_inplace_instructions(&module).contains(&dus));
}

#[test]
fn test_stage_call_excludes_parameter_operands() {
    let module = pipeline_module(&PipelineSpec::forward(&[0, 1]));
    let stage1 = module.find_instruction("stage_1_call").unwrap();
    let stage0 = module.find_instruction("stage_0_call").unwrap();
    // Stage 1 reads a copied activation and a weight parameter.
    assert_eq!(inplace_operand_indices(&module, stage1).unwrap().as_slice(), &[0]);
    assert!(inplace_operand_indices(&module, stage0).unwrap().is_empty());
}

#[test]
fn test_function_call_is_not_inplace() {
    let mut builder = ModuleBuilder::new("m");
    let callee = {
        let mut c = builder.computation("callee");
        let x = c.parameter(0, matrix());
        c.finish(x)
    };
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let call = c.call(callee, &[x]).unwrap();
    let entry = c.finish(call);
    let module = builder.build(entry).unwrap();
    assert!(!is_inplace_type(&module, module.instruction(call)));
}

#[test]
fn test_custom_call_inplace_operands() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let s = c.parameter(1, Shape::scalar(PrimitiveType::F32));
    let scaled = c.custom_call("scaled_inplace", &[x, s], matrix(), &[0]);
    let plain = c.custom_call("opaque", &[x], matrix(), &[]);
    let root = c.tuple(&[scaled, plain]);
    let entry = c.finish(root);
    let module = builder.build(entry).unwrap();

    assert_eq!(inplace_operand_indices(&module, module.instruction(scaled)).unwrap().as_slice(), &[0]);
    assert!(!is_inplace_type(&module, module.instruction(plain)));
    // `x` is still read by `plain` afterwards.
    assert!(!find_inplace_instructions(&module).contains(&scaled));
}
