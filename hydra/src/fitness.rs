//! Pass A — Fitness: classify every function as `Functional` or `Unknown`.
//!
//! Call-graph fixed-point classification grounded on the same shape as
//! `compile::ipo::worklist`'s SCC fixed-point iteration, specialized to a
//! two-element lattice (`Functional` > `Unknown` is wrong; here the only
//! legal move is `Functional -> Unknown`, never back).

use hydra_ir::{CallGraph, FuncId, Module};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunType {
    Functional,
    Unknown,
}

/// Classification for every function Fitness has seen. Functions absent
/// from the map (never observed by `compute`) are treated as `Unknown` by
/// every query below — "missing analysis result" per the error taxonomy.
#[derive(Debug, Default)]
pub struct FitnessResult {
    types: HashMap<FuncId, FunType>,
}

impl FitnessResult {
    pub fn type_of(&self, f: FuncId) -> FunType {
        self.types.get(&f).copied().unwrap_or(FunType::Unknown)
    }

    pub fn is_functional(&self, f: FuncId) -> bool {
        self.type_of(f) == FunType::Functional
    }
}

/// Run Fitness to a fixed point over `module`'s call graph.
pub fn compute_fitness(module: &Module, call_graph: &CallGraph) -> FitnessResult {
    let mut types = HashMap::new();

    // Seed: a function is eligible only if it has no pointer args, no
    // global references, and isn't variadic. Body-less (external) functions
    // are Unknown outright — there is nothing to prove safe about them.
    for func in module.functions() {
        let seed = if !func.has_body {
            FunType::Unknown
        } else if func.has_pointer_arg() || func.is_variadic || references_any_global(module, func.id) {
            FunType::Unknown
        } else {
            FunType::Functional
        };
        types.insert(func.id, seed);
    }

    // Propagate: demote any still-Functional function that calls an
    // Unknown (or body-less/external) callee, until a full pass is a no-op.
    loop {
        let mut changed = false;
        for func in module.functions() {
            if types[&func.id] != FunType::Functional {
                continue;
            }
            let calls_unknown = call_graph.callees(func.id).any(|callee| {
                types.get(&callee).copied().unwrap_or(FunType::Unknown) == FunType::Unknown
            });
            if calls_unknown {
                types.insert(func.id, FunType::Unknown);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    FitnessResult { types }
}

fn references_any_global(module: &Module, func: FuncId) -> bool {
    let f = module.func(func);
    f.blocks.iter().any(|&b| {
        module
            .block_insts(b)
            .iter()
            .any(|&i| module.inst(i).opcode.references_global())
    })
}
