pub mod inplace;
pub mod pipeline;
pub mod tensor_map;

use strata_device::{Layout, VirtualGraph};
use strata_ir::Module;

use crate::*;

pub fn context(module: &Module, options: CompilerOptions) -> CompilationContext<'_> {
    let graph = VirtualGraph::builder().shards(options.shards).tiles_per_shard(options.tiles_per_shard).build();
    CompilationContext::new(module, Box::new(graph), options).unwrap()
}

/// Fresh linear variables for every entry parameter leaf.
pub fn bind_parameters(cx: &mut CompilationContext<'_>) -> TensorMap {
    let module = cx.module;
    let mut map = TensorMap::new();
    for &parameter in &module.entry().parameters {
        let inst = module.instruction(parameter);
        for (slot, leaf) in inst.shape.leaves().into_iter().enumerate() {
            let name = format!("{}.{slot}", inst.name);
            let tensor =
                cx.graph.add_variable(leaf.element_type().unwrap(), leaf.dims(), &name, Layout::Linear).unwrap();
            map.bind(inst, slot, tensor).unwrap();
        }
    }
    map
}
