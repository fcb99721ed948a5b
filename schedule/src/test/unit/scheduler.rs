use proptest::prelude::*;
use strata_device::{Program, Sequence, TensorId};
use strum::{EnumCount, IntoEnumIterator, VariantArray};
use test_case::test_case;

use crate::*;

/// Execution trace: every fragment records its `(category, stage)` when it runs.
#[derive(Debug, Clone, Default, PartialEq)]
struct Trace(Vec<(StageCategory, usize)>);

impl Fragment for Trace {
    fn sequence(parts: Vec<Self>) -> Self {
        Trace(parts.into_iter().flat_map(|p| p.0).collect())
    }

    fn repeat(count: usize, body: Self) -> Self {
        Trace(std::iter::repeat_n(body.0, count).flatten().collect())
    }
}

fn tagged(stage_count: usize) -> PipelineFragments<Trace> {
    let parts = StageCategory::iter().map(|c| (c, (0..stage_count).map(|s| Trace(vec![(c, s)])).collect()));
    PipelineFragments::from_parts(stage_count, parts).unwrap()
}

fn only(stage_count: usize, category: StageCategory) -> PipelineFragments<Trace> {
    let fragments = (0..stage_count).map(|s| Trace(vec![(category, s)])).collect();
    PipelineFragments::from_parts(stage_count, [(category, fragments)]).unwrap()
}

fn stages_of(trace: &Trace) -> Vec<usize> {
    trace.0.iter().map(|&(_, s)| s).collect()
}

#[test]
fn test_sequential_compute_order() {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], false).unwrap();
    let program = scheduler.program(&only(3, StageCategory::Compute), 6).unwrap();
    assert_eq!(
        stages_of(&program),
        vec![0, 1, 0, 2, 1, 0, /* steady */ 2, 1, 0, 2, 1, 0, 2, 1, 0, /* drain */ 2, 1, 2]
    );
}

#[test]
fn test_interleaved_overlap_of_disjoint_shards() {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], true).unwrap();
    assert_eq!(scheduler.offsets(), &[0, 1, 2]);
    assert_eq!(scheduler.overlap_length(), 3);
}

#[test_case(9, true ; "multiple of overlap")]
#[test_case(3, true ; "exactly one period")]
#[test_case(4, false ; "not a multiple")]
#[test_case(0, false ; "empty")]
fn test_depth_check(depth: usize, ok: bool) {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], true).unwrap();
    assert_eq!(scheduler.check_depth(depth).is_ok(), ok);
}

#[test]
fn test_depth_errors_in_order() {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], false).unwrap();
    assert!(matches!(
        scheduler.program(&tagged(3), 4),
        Err(Error::PipelineDepthNotMultiple { depth: 4, overlap: 3 })
    ));
    assert!(matches!(scheduler.program(&tagged(3), 0), Err(Error::PipelineDepthTooSmall { depth: 0, overlap: 3 })));
    let message = scheduler.check_depth(4).unwrap_err().to_string();
    assert!(message.contains("must be a multiple of 3"), "{message}");
}

#[test]
fn test_empty_pipeline() {
    assert!(matches!(PipelineScheduler::new(&[], true), Err(Error::EmptyPipeline)));
}

#[test]
fn test_fragment_count_mismatch() {
    let result = PipelineFragments::from_parts(3, [(StageCategory::Fifo, vec![Trace::default(); 2])]);
    assert!(matches!(
        result,
        Err(Error::FragmentCountMismatch { category: StageCategory::Fifo, expected: 3, actual: 2 })
    ));

    let scheduler = PipelineScheduler::new(&[0, 1], false).unwrap();
    assert!(scheduler.program(&tagged(3), 2).is_err());
}

fn assert_categories_ordered(chunk: &[(StageCategory, usize)]) {
    assert!(chunk.windows(2).all(|w| w[0].0 <= w[1].0), "categories out of order: {chunk:?}");
}

#[test]
fn test_sequential_steady_state_category_order() {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], false).unwrap();
    let block = scheduler.repeat_block(&tagged(3));
    let timestep = StageCategory::COUNT * 3;
    assert_eq!(block.0.len(), timestep * 3);
    block.0.chunks(timestep).for_each(assert_categories_ordered);
}

#[test]
fn test_interleaved_steady_state_category_order() {
    let scheduler = PipelineScheduler::new(&[0, 1, 0, 1], true).unwrap();
    let block = scheduler.repeat_block(&tagged(4));
    let timestep = StageCategory::COUNT * scheduler.overlap_length();
    assert_eq!(block.0.len(), timestep * 4);
    for chunk in block.0.chunks(timestep) {
        assert_categories_ordered(chunk);
        let first: Vec<_> = StageCategory::VARIANTS.iter().map(|c| chunk.iter().position(|e| e.0 == *c)).collect();
        assert!(first.iter().all(Option::is_some));
    }
}

#[test]
fn test_copies_are_not_blanked_in_ramp_up() {
    let scheduler = PipelineScheduler::new(&[0, 1, 2], false).unwrap();
    let copies = scheduler.ramp_up(&only(3, StageCategory::Copy));
    let computes = scheduler.ramp_up(&only(3, StageCategory::Compute));
    assert_eq!(copies.0.len(), 9);
    assert_eq!(computes.0.len(), 6);
}

#[test]
fn test_sequence_fragments_wrap_steady_state_in_repeat() {
    let stage_count = 2;
    let fragments = (0..stage_count)
        .map(|s| Sequence::from(Program::copy(TensorId::new(s as u32), TensorId::new(10 + s as u32))))
        .collect();
    let fragments = PipelineFragments::from_parts(stage_count, [(StageCategory::Compute, fragments)]).unwrap();
    let scheduler = PipelineScheduler::new(&[0, 1], false).unwrap();

    let program = scheduler.program(&fragments, 4).unwrap().into_program();
    let mut repeats = Vec::new();
    program.walk(&mut |p| {
        if let Program::Repeat { count, .. } = p {
            repeats.push(*count);
        }
    });
    // One repeat around the steady state, one inside it over the overlap.
    assert_eq!(repeats, vec![1, 2]);
    // Ramp-up issues three copies, the steady-state body two and ramp-down one.
    assert_eq!(program.copy_count(), 3 + 2 + 1);
}

proptest! {
    #[test]
    fn every_stage_runs_depth_times(
        mapping in prop::collection::vec(0u32..3, 1..7),
        interleave in any::<bool>(),
        periods in 1usize..4,
    ) {
        let scheduler = PipelineScheduler::new(&mapping, interleave).unwrap();
        let depth = scheduler.overlap_length() * periods;
        let program = scheduler.program(&tagged(mapping.len()), depth).unwrap();
        for category in [StageCategory::Infeed, StageCategory::Compute, StageCategory::Outfeed] {
            for stage in 0..mapping.len() {
                let runs = program.0.iter().filter(|&&e| e == (category, stage)).count();
                prop_assert_eq!(runs, depth, "{} of stage {}", category, stage);
            }
        }
    }
}
