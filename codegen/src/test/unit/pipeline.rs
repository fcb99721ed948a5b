use strata_ir::test::fixtures::{PipelineSpec, forward_stage, matrix, pipeline_module};
use strata_ir::{BackendConfig, CallConfig, FeedConfig, Module, ModuleBuilder, ModuleConfig, OpKind, UnaryOp};
use test_case::test_case;

use super::context;
use crate::error::Error;
use crate::visitor::entry::Entry;
use crate::*;

fn options(shards: u32) -> CompilerOptions {
    CompilerOptions::builder().shards(shards).synthetic_data(true).build()
}

fn lower(module: &Module, shards: u32) -> Result<(CompilationContext<'_>, Visitor<Entry>)> {
    let mut cx = context(module, options(shards));
    let mut visitor = Visitor::new(module.entry_id(), 0, Entry::new());
    visitor.accept(&mut cx)?;
    Ok((cx, visitor))
}

#[test_case(PipelineSpec::forward(&[0, 1, 2]) ; "forward")]
#[test_case(PipelineSpec { interleave: true, ..PipelineSpec::forward(&[0, 1, 0, 1]) } ; "interleaved")]
#[test_case(PipelineSpec { feeds: true, ..PipelineSpec::forward(&[0, 1, 2]) } ; "with feeds")]
#[test_case(PipelineSpec { repeat_count: Some(3), ..PipelineSpec::forward(&[0, 1]) } ; "repeated")]
fn test_pipeline_outputs_alias_parameters(spec: PipelineSpec) {
    let module = pipeline_module(&spec);
    let (cx, visitor) = lower(&module, 3).unwrap();

    let entry = module.entry();
    let inputs: Vec<_> = entry
        .parameters
        .iter()
        .map(|&p| visitor.tensor_map().lookup_one(module.instruction(p), 0).unwrap())
        .collect();
    assert_eq!(visitor.outputs(), inputs.as_slice());

    let main = visitor.sequence().clone().into_program();
    assert!(main.compute_steps().contains(&"dot"));
    assert!(main.calls().is_empty());
    for k in 0..spec.shards.len() {
        assert!(cx.tensor_maps.contains_key(&format!("stage_{k}")));
    }
}

#[test]
fn test_feeds_are_recorded() {
    let spec = PipelineSpec { feeds: true, ..PipelineSpec::forward(&[0, 1, 2]) };
    let module = pipeline_module(&spec);
    let (cx, _) = lower(&module, 3).unwrap();
    assert_eq!(cx.infeeds.len(), 1);
    assert_eq!(cx.infeeds[0].config.feed_id, "inputs");
    assert_eq!(cx.infeeds[0].shapes, vec![matrix()]);
    assert_eq!(cx.outfeeds.len(), 1);
    assert_eq!(cx.outfeeds[0].config.feed_id, "outputs");
}

#[test]
fn test_invalid_depth() {
    let spec = PipelineSpec { pipeline_depth: 4, ..PipelineSpec::forward(&[0, 1, 2]) };
    let module = pipeline_module(&spec);
    let err = lower(&module, 3).err().unwrap();
    assert!(matches!(err, Error::Schedule { .. }), "{err}");
    assert!(err.to_string().contains("multiple of 3"), "{err}");
}

#[test]
fn test_recomputed_stage_becomes_function() {
    let spec = PipelineSpec { feeds: true, backward: true, ..PipelineSpec::forward(&[0, 1]) };
    let module = pipeline_module(&spec);
    let (cx, visitor) = lower(&module, 2).unwrap();

    assert_eq!(cx.graph.functions().len(), 1);
    assert_eq!(cx.graph.functions()[0].name, "stage_0_call");
    let function = cx.graph.functions()[0].id;
    let main = visitor.sequence().clone().into_program();
    // Forward stage and recomputation both call the function.
    assert!(main.calls().iter().all(|&called| called == function));
    assert!(main.calls().len() >= 2);
    assert!(main.compute_steps().contains(&"fifo"));
}

/// Single-stage pipeline whose root returns the stage output in place of the weight.
fn updating_pipeline() -> Module {
    let mut builder = ModuleBuilder::new("update");
    let stage = forward_stage(&mut builder, "stage_0");

    let pipeline = {
        let mut c = builder.computation("pipeline");
        let x = c.parameter(0, matrix());
        let w = c.parameter(1, matrix());
        let call = c.call(stage, &[x, w]).unwrap();
        c.set_backend_config(call, BackendConfig::with_call(CallConfig::PipelineStage { stage_id: Some(0) }));
        let y = c.get_tuple_element(call, 0).unwrap();
        let root = c.tuple(&[x, y]);
        c.finish(root)
    };

    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let w = c.parameter(1, matrix());
    let call = c.call(pipeline, &[x, w]).unwrap();
    let config = CallConfig::Pipeline { pipeline_depth: Some(2), interleave: false, repeat_count: None };
    c.set_backend_config(call, BackendConfig::with_call(config));
    let outputs: Vec<_> = (0..2).map(|i| c.get_tuple_element(call, i).unwrap()).collect();
    let root = c.tuple(&outputs);
    let entry = c.finish(root);
    builder.build(entry).unwrap()
}

#[test]
fn test_result_is_copied_back_into_parameter() {
    let module = updating_pipeline();
    let (cx, visitor) = lower(&module, 1).unwrap();
    let w = module.instruction(module.entry().parameters[1]);
    let w = visitor.tensor_map().lookup_one(w, 0).unwrap();

    let main = visitor.sequence().clone().into_program();
    assert!(main.copies().iter().any(|&(_, destination)| destination == w.id));
    assert_eq!(visitor.outputs()[1], w);

    let pipeline_map = &cx.tensor_maps["pipeline"];
    let root = module.find_computation("pipeline").unwrap().root;
    assert!(pipeline_map.contains(root, 1));
}

/// Single-stage pipeline whose stage output goes through a call before replacing the weight.
fn calling_pipeline(config: Option<CallConfig>) -> Module {
    let mut builder = ModuleBuilder::new("calling");
    let stage = forward_stage(&mut builder, "stage_0");
    let helper = {
        let mut c = builder.computation("helper");
        let y = c.parameter(0, matrix());
        let root = c.unary(UnaryOp::Exp, y);
        c.finish(root)
    };

    let pipeline = {
        let mut c = builder.computation("pipeline");
        let x = c.parameter(0, matrix());
        let w = c.parameter(1, matrix());
        let call = c.call(stage, &[x, w]).unwrap();
        c.set_backend_config(call, BackendConfig::with_call(CallConfig::PipelineStage { stage_id: Some(0) }));
        let y = c.get_tuple_element(call, 0).unwrap();
        let z = c.call(helper, &[y]).unwrap();
        if let Some(config) = config {
            c.set_backend_config(z, BackendConfig::with_call(config));
        }
        c.set_name(z, "helper_call");
        let root = c.tuple(&[x, z]);
        c.finish(root)
    };

    let mut c = builder.computation("entry");
    let x = c.parameter(0, matrix());
    let w = c.parameter(1, matrix());
    let call = c.call(pipeline, &[x, w]).unwrap();
    let config = CallConfig::Pipeline { pipeline_depth: Some(2), interleave: false, repeat_count: None };
    c.set_backend_config(call, BackendConfig::with_call(config));
    let outputs: Vec<_> = (0..2).map(|i| c.get_tuple_element(call, i).unwrap()).collect();
    let root = c.tuple(&outputs);
    let entry = c.finish(root);
    builder.build(entry).unwrap()
}

#[test_case(None, 1 ; "function")]
#[test_case(Some(CallConfig::Inline), 0 ; "inline")]
fn test_calls_run_in_their_stage(config: Option<CallConfig>, functions: usize) {
    let module = calling_pipeline(config);
    let (cx, visitor) = lower(&module, 1).unwrap();

    assert_eq!(cx.graph.functions().len(), functions);
    let main = visitor.sequence().clone().into_program();
    let body = match cx.graph.functions().first() {
        Some(function) => {
            assert_eq!(function.name, "helper");
            assert!(main.calls().contains(&function.id));
            &function.body
        }
        None => &main,
    };
    assert!(body.compute_steps().contains(&"exp"), "{:?}", body.compute_steps());
    let helper_call = module.find_instruction("helper_call").unwrap();
    assert!(cx.tensor_maps["pipeline"].contains(helper_call.id, 0));
}

/// `entry() = infeed()` outside of any pipeline.
fn infeed_module(replication_factor: usize) -> Module {
    let config = ModuleConfig::builder().replication_factor(replication_factor).build();
    let mut builder = ModuleBuilder::new("feeds").with_config(config);
    let mut c = builder.computation("entry");
    let token = c.after_all(&[]);
    let infeed = c.infeed(token, matrix());
    c.set_backend_config(infeed, BackendConfig::with_feed(FeedConfig::new("data")));
    let data = c.get_tuple_element(infeed, 0).unwrap();
    let root = c.tuple(&[data]);
    let entry = c.finish(root);
    builder.build(entry).unwrap()
}

fn find_infeed(module: &Module) -> &strata_ir::Instruction {
    module.schedule(module.entry_id()).find(|inst| inst.kind() == OpKind::Infeed).unwrap()
}

#[test]
fn test_infeed_outside_pipeline() {
    let module = infeed_module(1);
    let err = lower(&module, 1).err().unwrap();
    assert!(matches!(err, Error::InfeedOutsideLoop { .. }), "{err}");
}

#[test]
fn test_infeed_checks() {
    let module = infeed_module(2);
    let mut cx = context(&module, CompilerOptions::default());
    let err = crate::ops::feed::lower_infeed(&mut cx, find_infeed(&module)).unwrap_err();
    assert!(matches!(err, Error::ReplicationMismatch { module: 2, feed: 1, .. }), "{err}");

    let module = infeed_module(1);
    let mut cx = context(&module, CompilerOptions::default());
    let infeed = find_infeed(&module);
    let lowered = crate::ops::feed::lower_infeed(&mut cx, infeed).unwrap();
    assert_eq!(lowered.outputs.len(), 1);
    assert_eq!(lowered.sequence.len(), 1);
    assert_eq!(cx.graph.streams()[0].name, "data.0");

    let err = crate::ops::feed::lower_infeed(&mut cx, infeed).unwrap_err();
    assert!(matches!(err, Error::MultipleInfeeds { .. }), "{err}");
    assert_eq!(cx.infeeds.len(), 1);
}
