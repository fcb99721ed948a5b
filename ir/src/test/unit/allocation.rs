use crate::analysis::*;
use crate::test::fixtures::{dense_module, matrix};
use crate::*;

#[test]
fn test_dot_operands_are_targets() {
    let module = dense_module();
    let entry = module.entry();
    let (x, w) = (entry.parameters[0], entry.parameters[1]);
    let targets = find_allocation_targets(&module);

    assert_eq!(targets.len(), 2);
    assert_eq!(targets[&(x, 0)].operand, 0);
    assert_eq!(targets[&(w, 0)].operand, 1);
    assert_eq!(targets[&(x, 0)].layout, TargetLayout::MatMulOperand);
    assert!(targets[&(x, 0)].path.is_empty());
}

#[test]
fn test_target_through_tuple_element() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let pair = c.parameter(0, Shape::tuple([matrix(), matrix()]));
    let a = c.get_tuple_element(pair, 0).unwrap();
    let b = c.get_tuple_element(pair, 1).unwrap();
    let n = c.unary(UnaryOp::Neg, a);
    let dot = c.dot(n, b, &[1], &[0]).unwrap();
    let entry = c.finish(dot);
    let module = builder.build(entry).unwrap();

    let targets = find_allocation_targets(&module);
    assert!(!targets.contains_key(&(pair, 0)));
    let target = &targets[&(pair, 1)];
    assert_eq!(target.consumer, dot);
    assert_eq!(target.operand, 1);
    assert_eq!(target.path, vec![b]);
}

#[test]
fn test_bias_follows_dot_layout() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let w = c.parameter(1, matrix());
    let bias = c.parameter(2, matrix());
    let dot = c.dot(x, w, &[1], &[0]).unwrap();
    let sum = c.binary(BinaryOp::Add, dot, bias);
    let entry = c.finish(sum);
    let module = builder.build(entry).unwrap();

    let target = &find_allocation_targets(&module)[&(bias, 0)];
    assert_eq!(target.consumer, sum);
    assert_eq!(target.operand, 1);
    assert_eq!(target.layout, TargetLayout::LikeOperand { other: dot });
}

#[test]
fn test_elementwise_only_has_no_target() {
    let mut builder = ModuleBuilder::new("m");
    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let y = c.parameter(1, matrix());
    let sum = c.binary(BinaryOp::Add, x, y);
    let entry = c.finish(sum);
    let module = builder.build(entry).unwrap();
    assert!(find_allocation_targets(&module).is_empty());
}
