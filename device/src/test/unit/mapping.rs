use proptest::prelude::*;
use test_case::test_case;

use crate::*;

#[test_case(16, 4, &[4, 4, 4, 4] ; "even split")]
#[test_case(10, 4, &[3, 3, 3, 1] ; "ragged tail")]
#[test_case(2, 4, &[1, 1] ; "fewer elements than tiles")]
#[test_case(0, 4, &[] ; "empty tensor")]
fn test_linear_chunks(elements: usize, tiles: usize, expected: &[usize]) {
    let mapping = TileMapping::linear(elements, 0, tiles);
    let counts: Vec<usize> = mapping.elements_per_tile().into_iter().map(|(_, n)| n).collect();
    assert_eq!(counts, expected);
}

#[test]
fn test_single_tile() {
    let mapping = TileMapping::single(7, 12);
    assert_eq!(mapping.tiles(), vec![12]);
    assert_eq!(mapping.element_count(), 7);
}

proptest! {
    #[test]
    fn linear_mapping_covers_every_element(elements in 0usize..500, tiles in 1usize..16, first in 0usize..64) {
        let mapping = TileMapping::linear(elements, first, tiles);
        prop_assert_eq!(mapping.element_count(), elements);
        prop_assert!(mapping.tile_count() <= tiles);
        let mut next = 0;
        for interval in mapping.intervals() {
            prop_assert_eq!(interval.begin, next);
            prop_assert!(interval.tile >= first && interval.tile < first + tiles);
            next = interval.end;
        }
    }
}
