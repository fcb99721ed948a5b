use proptest::prelude::*;
use strata_device::{Layout, TensorBackend, TensorHandle, VirtualGraph};
use strata_ir::test::fixtures::matrix;
use strata_ir::{Module, ModuleBuilder, PrimitiveType, Shape};

use crate::error::Error;
use crate::*;

fn tuple_module() -> Module {
    let mut builder = ModuleBuilder::new("tuples");
    let mut c = builder.computation("entry");
    let p = c.parameter(0, Shape::tuple([matrix(), matrix(), matrix()]));
    let element = c.get_tuple_element(p, 1).unwrap();
    let root = c.tuple(&[element]);
    let entry = c.finish(root);
    builder.build(entry).unwrap()
}

fn tensors(count: usize) -> Vec<TensorHandle> {
    let mut graph = VirtualGraph::default();
    (0..count)
        .map(|i| graph.add_variable(PrimitiveType::F32, &[2], &format!("t{i}"), Layout::Linear).unwrap())
        .collect()
}

#[test]
fn test_bind_twice_fails() {
    let module = tuple_module();
    let parameter = module.instruction(module.entry().parameters[0]);
    let [a, b] = tensors(2).try_into().unwrap();

    let mut map = TensorMap::new();
    map.bind(parameter, 0, a.clone()).unwrap();
    let err = map.bind(parameter, 0, b).unwrap_err();
    assert!(matches!(err, Error::AlreadyBound { slot: 0, .. }), "{err}");
    assert_eq!(map.lookup_one(parameter, 0).unwrap(), a);
    assert_eq!(map.len(), 1);
}

#[test]
fn test_lookup_unbound_slot() {
    let module = tuple_module();
    let parameter = module.instruction(module.entry().parameters[0]);
    let mut map = TensorMap::new();
    map.bind(parameter, 0, tensors(1).remove(0)).unwrap();

    let err = map.lookup_one(parameter, 2).unwrap_err();
    assert!(matches!(err, Error::NotBound { slot: 2, .. }), "{err}");
    assert!(map.lookup_all(parameter).is_err());
}

#[test]
fn test_tuple_element_range() {
    let module = tuple_module();
    let parameter = module.instruction(module.entry().parameters[0]);
    let all = tensors(3);
    let mut map = TensorMap::new();
    map.bind_all(parameter, all.clone()).unwrap();

    let slots = parameter.shape.tuple_slot_range(1).unwrap();
    assert_eq!(map.lookup_range(parameter, slots).unwrap(), vec![all[1].clone()]);
    assert!(map.contains(parameter.id, 2));
    assert!(!map.contains(parameter.id, 3));
}

proptest! {
    #[test]
    fn test_lookup_all_is_slot_ordered(order in Just(vec![0usize, 1, 2]).prop_shuffle()) {
        let module = tuple_module();
        let parameter = module.instruction(module.entry().parameters[0]);
        let all = tensors(3);
        let mut map = TensorMap::new();
        for &slot in &order {
            map.bind(parameter, slot, all[slot].clone()).unwrap();
        }
        prop_assert_eq!(map.lookup_all(parameter).unwrap(), all);
        let slots: Vec<usize> = map.iter().map(|(_, slot, _)| slot).collect();
        prop_assert_eq!(slots, vec![0, 1, 2]);
    }
}
