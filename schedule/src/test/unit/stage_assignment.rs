use strata_ir::analysis::PipelineStages;
use strata_ir::test::fixtures::{PipelineSpec, forward_stage, matrix, pipeline_module};
use strata_ir::{
    BackendConfig, CallConfig, ComputationBuilder, ComputationId, InstId, Module, ModuleBuilder, OpKind, UnaryOp,
};
use test_case::test_case;

use crate::*;

fn assign(module: &Module) -> StageAssignment {
    let pipeline = module.find_computation("pipeline").unwrap().id;
    let stages = PipelineStages::find(module, pipeline).unwrap();
    StageAssignment::compute(module, pipeline, &stages)
}

fn stage_of(module: &Module, assignment: &StageAssignment, name: &str) -> usize {
    let id = module.find_instruction(name).unwrap().id;
    assignment.stage(id).unwrap()
}

fn stages_of_kind(module: &Module, assignment: &StageAssignment, kind: OpKind) -> Vec<usize> {
    let pipeline = module.find_computation("pipeline").unwrap().id;
    module
        .schedule(pipeline)
        .filter(|inst| inst.kind() == kind)
        .map(|inst| assignment.stage(inst.id).unwrap())
        .collect()
}

#[test_case(PipelineSpec::forward(&[0, 1, 2]) ; "forward")]
#[test_case(PipelineSpec { feeds: true, ..PipelineSpec::forward(&[0, 1, 2]) } ; "forward with feeds")]
#[test_case(PipelineSpec { feeds: true, backward: true, ..PipelineSpec::forward(&[0, 1]) } ; "backward")]
fn test_every_instruction_is_placed(spec: PipelineSpec) {
    let module = pipeline_module(&spec);
    let assignment = assign(&module);
    let pipeline = module.find_computation("pipeline").unwrap();
    assert_eq!(assignment.len(), pipeline.instruction_count());
    assert!(assignment.iter().all(|(_, stage)| stage < assignment.stage_count()));
}

#[test]
fn test_forward_stages() {
    let module = pipeline_module(&PipelineSpec::forward(&[0, 1, 2]));
    let assignment = assign(&module);
    assert_eq!(assignment.stage_count(), 3);
    for k in 0..3 {
        assert_eq!(stage_of(&module, &assignment, &format!("stage_{k}_call")), k);
    }
    // Copies run on the producing stage.
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::InterShardCopy), vec![0, 1]);
    // The activation parameter is first read by stage 0, weight k by stage k.
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Parameter), vec![0, 0, 1, 2]);
    let root = module.find_computation("pipeline").unwrap().root;
    assert_eq!(assignment.stage(root), Some(2));
}

#[test]
fn test_feeds_follow_their_stage() {
    let module = pipeline_module(&PipelineSpec { feeds: true, ..PipelineSpec::forward(&[0, 1, 2]) });
    let assignment = assign(&module);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Infeed), vec![0]);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Outfeed), vec![2]);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Copy), vec![2]);
    // One token per feed.
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::AfterAll), vec![0, 2]);
}

#[test]
fn test_backward_stages() {
    let module = pipeline_module(&PipelineSpec { feeds: true, backward: true, ..PipelineSpec::forward(&[0, 1]) });
    let assignment = assign(&module);
    assert_eq!(assignment.stage_count(), 4);

    assert_eq!(stage_of(&module, &assignment, "stage_0_call"), 0);
    assert_eq!(stage_of(&module, &assignment, "stage_1_call"), 1);
    assert_eq!(stage_of(&module, &assignment, "stage_1_bwd_call"), 2);
    assert_eq!(stage_of(&module, &assignment, "stage_0_bwd_call"), 3);
    assert_eq!(stage_of(&module, &assignment, "stage_0_recomputation"), 0);

    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Fifo), vec![0]);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Infeed), vec![0]);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::InterShardCopy), vec![0, 2]);

    let root = module.find_computation("pipeline").unwrap().root;
    assert_eq!(assignment.stage(root), Some(3));
    let last = assignment.instructions_in(3);
    assert!(last.contains(&root));
    assert!(last.contains(&module.find_instruction("stage_0_bwd_call").unwrap().id));
}

/// `pipeline(x, w)` calling `stages` forward stages; `extra` adds instructions after the
/// pipeline parameters and may replace the activation fed to the stages.
fn pipeline_with(
    stages: usize,
    extra: impl FnOnce(&mut ComputationBuilder<'_>, InstId) -> InstId,
) -> Module {
    let mut builder = ModuleBuilder::new("malformed");
    let computations: Vec<ComputationId> =
        (0..stages).map(|k| forward_stage(&mut builder, &format!("stage_{k}"))).collect();
    let mut c = builder.computation("pipeline");
    let x = c.parameter(0, matrix());
    let w = c.parameter(1, matrix());
    let input = extra(&mut c, x);
    for (k, &computation) in computations.iter().enumerate() {
        let call = c.call(computation, &[input, w]).unwrap();
        c.set_backend_config(call, BackendConfig::with_call(CallConfig::PipelineStage { stage_id: Some(k) }));
    }
    let root = c.tuple(&[x, w]);
    let pipeline = c.finish(root);
    builder.build(pipeline).unwrap()
}

#[test]
#[should_panic(expected = "must have a single user")]
fn test_fifo_with_two_users() {
    let module = pipeline_with(1, |c, x| {
        let fifo = c.fifo(x, 1);
        c.unary(UnaryOp::Neg, fifo);
        c.unary(UnaryOp::Abs, fifo);
        x
    });
    assign(&module);
}

#[test]
#[should_panic(expected = "could not assign all")]
fn test_unused_source_is_left_unplaced() {
    let module = pipeline_with(1, |c, x| {
        c.after_all(&[]);
        x
    });
    assign(&module);
}

#[test]
#[should_panic(expected = "must feed exactly one forward pipeline stage, feeds 0")]
fn test_infeed_without_forward_stage() {
    let module = pipeline_with(1, |c, x| {
        let token = c.after_all(&[]);
        let infeed = c.infeed(token, matrix());
        let data = c.get_tuple_element(infeed, 0).unwrap();
        c.unary(UnaryOp::Neg, data);
        x
    });
    assign(&module);
}

#[test]
#[should_panic(expected = "must feed exactly one forward pipeline stage, feeds 2")]
fn test_infeed_feeding_two_stages() {
    let module = pipeline_with(2, |c, _| {
        let token = c.after_all(&[]);
        let infeed = c.infeed(token, matrix());
        c.get_tuple_element(infeed, 0).unwrap()
    });
    assign(&module);
}

#[test]
fn test_operand_free_instruction_takes_user_stage() {
    let module = pipeline_with(2, |c, _| c.constant(vec![0.5; 16], matrix()));
    let assignment = assign(&module);
    assert_eq!(stages_of_kind(&module, &assignment, OpKind::Constant), vec![0]);
}
