//! Compile entry point.

use strata_codegen::visitor::entry::Entry;
use strata_codegen::{CompilationContext, CompilerOptions, CustomOpRegistry, Visitor};
use strata_device::{Program, Sequence, VirtualGraph};
use strata_ir::Module;
use tracing::debug;

use crate::error::*;
use crate::executable::Executable;
use crate::report::TensorMapReport;

/// Compile `module` with the default custom operations.
pub fn compile(module: &Module, options: CompilerOptions) -> Result<Executable> {
    compile_with(module, options, CustomOpRegistry::default())
}

/// Compile `module` for a [`VirtualGraph`] shaped by `options`.
#[tracing::instrument(skip_all, fields(module = module.name()))]
pub fn compile_with(module: &Module, options: CompilerOptions, custom_ops: CustomOpRegistry) -> Result<Executable> {
    let graph = VirtualGraph::builder().shards(options.shards).tiles_per_shard(options.tiles_per_shard).build();
    let stochastic_rounding = options.stochastic_rounding;
    let mut cx = CompilationContext::new(module, Box::new(graph), options)?.with_custom_ops(custom_ops);

    let mut visitor = Visitor::new(module.entry_id(), 0, Entry::new());
    visitor.accept(&mut cx)?;
    let (state, entry) = visitor.into_parts();
    let (host_to_device, device_to_host) = entry.into_programs();

    let mut main = Sequence::new();
    main.add(Program::SetStochasticRounding(stochastic_rounding));
    main.append(state.sequence);

    let tensor_map = TensorMapReport::new(&cx)?;
    let executable = Executable {
        programs: [host_to_device.into_program(), main.into_program(), device_to_host.into_program()],
        functions: cx.graph.functions().to_vec(),
        streams: cx.graph.streams().to_vec(),
        tensor_map,
        aliasing: cx.annotations.aliasing,
        infeeds: cx.infeeds,
        outfeeds: cx.outfeeds,
    };
    debug!(
        functions = executable.functions.len(),
        streams = executable.streams.len(),
        infeeds = executable.infeeds.len(),
        outfeeds = executable.outfeeds.len(),
        "executable assembled"
    );
    Ok(executable)
}
