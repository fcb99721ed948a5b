use proptest::prelude::*;
use test_case::test_case;

use crate::{PrimitiveType, Shape};

fn nested() -> Shape {
    let f32 = |dims: &[usize]| Shape::array(PrimitiveType::F32, dims);
    Shape::tuple([f32(&[2]), Shape::tuple([f32(&[3]), Shape::Token, f32(&[4, 4])]), Shape::Token, f32(&[])])
}

#[test]
fn test_leaf_count_skips_tokens() {
    assert_eq!(nested().leaf_count(), 4);
    assert_eq!(Shape::Token.leaf_count(), 0);
    assert_eq!(Shape::scalar(PrimitiveType::S32).leaf_count(), 1);
}

#[test_case(0, Some(0..1) ; "leading array")]
#[test_case(1, Some(1..3) ; "nested tuple")]
#[test_case(2, Some(3..3) ; "token")]
#[test_case(3, Some(3..4) ; "trailing scalar")]
#[test_case(4, None ; "out of range")]
fn test_tuple_slot_range(index: usize, expected: Option<std::ops::Range<usize>>) {
    assert_eq!(nested().tuple_slot_range(index), expected);
}

#[test]
fn test_leaves_in_slot_order() {
    let shape = nested();
    let dims: Vec<&[usize]> = shape.leaves().into_iter().map(Shape::dims).collect();
    assert_eq!(dims, vec![&[2][..], &[3][..], &[4, 4][..], &[][..]]);
    assert_eq!(shape.element_count(), 2 + 3 + 16 + 1);
}

#[test]
fn test_display() {
    let shape = Shape::tuple([Shape::array(PrimitiveType::BF16, &[2, 8]), Shape::Token]);
    assert_eq!(shape.to_string(), "(bf16[2,8], token[])");
}

fn element() -> impl Strategy<Value = Shape> {
    let array = (any::<PrimitiveType>(), prop::collection::vec(1usize..5, 0..3))
        .prop_map(|(ty, dims)| Shape::array(ty, &dims));
    prop_oneof![4 => array, 1 => Just(Shape::Token)]
}

proptest! {
    #[test]
    fn slot_ranges_tile_the_leaves(elements in prop::collection::vec(element(), 0..6)) {
        let shape = Shape::tuple(elements.clone());
        let mut next = 0;
        for (index, element) in elements.iter().enumerate() {
            let range = shape.tuple_slot_range(index).unwrap();
            prop_assert_eq!(range.start, next);
            prop_assert_eq!(range.len(), element.leaf_count());
            next = range.end;
        }
        prop_assert_eq!(next, shape.leaf_count());
        prop_assert!(shape.tuple_slot_range(elements.len()).is_none());
    }
}
