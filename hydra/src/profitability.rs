//! Pass B — Profitability: per-function cost aggregation honouring calls and
//! statically-known loop trip counts.
//!
//! Traverses the call graph in SCC post-order (leaves first, grounded on
//! `hydra_ir::callgraph::CallGraph::sccs_leaves_first`, itself grounded on
//! `compile::ipo::recursion::detect_sccs`), so every callee's `total_cost`
//! is already final by the time its caller needs it — except for
//! mutually-recursive callees in the caller's own SCC, which get the
//! one-level-unrolling fix-up for same-SCC (mutually recursive) callees.

use hydra_ir::{CallGraph, FuncId, LoopForest, Module};
use std::collections::HashMap;

use crate::fitness::{FitnessResult, FunType};

#[derive(Debug, Clone, Default)]
pub struct FunStats {
    pub num_instructions: u32,
    pub num_emitting_insts: u32,
    pub num_mem_accesses: u32,
    pub num_function_calls: HashMap<FuncId, u32>,
    pub total_cost: u32,
    pub spawnable: bool,
}

#[derive(Debug, Default)]
pub struct ProfitabilityResult {
    stats: HashMap<FuncId, FunStats>,
}

impl ProfitabilityResult {
    /// Missing stats (a body-less callee, or a function Profitability never
    /// saw) are zero cost rather than a null-deref: a missing analysis
    /// result is a conservative default, not a bug.
    pub fn stats(&self, f: FuncId) -> FunStats {
        self.stats.get(&f).cloned().unwrap_or_default()
    }

    pub fn total_cost(&self, f: FuncId) -> u32 {
        self.stats.get(&f).map(|s| s.total_cost).unwrap_or(0)
    }

    /// Decider's single write-back point: accepting a call site lowers the
    /// enclosing function's total cost by the serial/parallel delta.
    pub fn reduce_total_cost(&mut self, f: FuncId, delta: u32) {
        if let Some(s) = self.stats.get_mut(&f) {
            s.total_cost = s.total_cost.saturating_sub(delta);
        }
    }

    pub fn contains(&self, f: FuncId) -> bool {
        self.stats.contains_key(&f)
    }
}

pub fn compute_profitability(
    module: &Module,
    fitness: &FitnessResult,
    call_graph: &CallGraph,
    loops: &HashMap<FuncId, LoopForest>,
) -> ProfitabilityResult {
    let mut result = ProfitabilityResult::default();
    let sccs = call_graph.sccs_leaves_first(module);

    for scc in sccs {
        let scc_set: std::collections::HashSet<FuncId> = scc.iter().copied().collect();
        let mut base_costs = HashMap::new();

        for &f in &scc {
            let func = module.func(f);
            if !func.has_body {
                let mut stats = FunStats::default();
                stats.spawnable = fitness.type_of(f) == FunType::Functional;
                result.stats.insert(f, stats.clone());
                base_costs.insert(f, stats.total_cost);
                continue;
            }

            let empty_forest = LoopForest::default();
            let forest = loops.get(&f).unwrap_or(&empty_forest);
            let mut stats = FunStats::default();

            for &block in &func.blocks {
                let trip = forest.trip_count_for_block(block).filter(|&t| t > 0);
                let mut total = 0u32;
                let mut emitting = 0u32;
                let mut mem = 0u32;
                let mut calls: HashMap<FuncId, u32> = HashMap::new();

                for &inst_id in module.block_insts(block) {
                    let inst = module.inst(inst_id);
                    total = total.saturating_add(1);
                    if inst.opcode.is_emitting() {
                        emitting = emitting.saturating_add(1);
                    }
                    if inst.opcode.is_memory_access() {
                        mem = mem.saturating_add(1);
                    }
                    if let hydra_ir::Opcode::Call { callee, .. } = &inst.opcode {
                        *calls.entry(*callee).or_insert(0) = calls[callee].saturating_add(1);
                    }
                }

                if let Some(trip) = trip {
                    total = total.saturating_mul(trip);
                    emitting = emitting.saturating_mul(trip);
                    mem = mem.saturating_mul(trip);
                    for v in calls.values_mut() {
                        *v = v.saturating_mul(trip);
                    }
                }

                stats.num_instructions = stats.num_instructions.saturating_add(total);
                stats.num_emitting_insts = stats.num_emitting_insts.saturating_add(emitting);
                stats.num_mem_accesses = stats.num_mem_accesses.saturating_add(mem);
                for (callee, count) in calls {
                    *stats.num_function_calls.entry(callee).or_insert(0) =
                        stats.num_function_calls.get(&callee).copied().unwrap_or(0).saturating_add(count);
                }
            }

            // total_cost excludes same-SCC callees at this stage; they
            // contribute 0 until the recursion fix-up below.
            let mut total_cost = stats.num_emitting_insts;
            for (&callee, &mult) in &stats.num_function_calls {
                if scc_set.contains(&callee) {
                    continue;
                }
                let callee_cost = result.total_cost(callee);
                total_cost = total_cost.saturating_add(callee_cost.saturating_mul(mult));
            }
            stats.total_cost = total_cost;
            stats.spawnable = fitness.type_of(f) == FunType::Functional;

            base_costs.insert(f, stats.total_cost);
            result.stats.insert(f, stats);
        }

        // Recursion fix-up: one additional unrolling of each same-SCC edge,
        // using the pre-fix-up costs computed above for every member at
        // once (not iteratively).
        for &f in &scc {
            let Some(stats) = result.stats.get(&f) else { continue };
            let extra: u32 = stats
                .num_function_calls
                .iter()
                .filter(|(callee, _)| scc_set.contains(callee))
                .map(|(callee, &mult)| base_costs.get(callee).copied().unwrap_or(0).saturating_mul(mult))
                .fold(0u32, u32::saturating_add);
            if let Some(stats) = result.stats.get_mut(&f) {
                stats.total_cost = stats.total_cost.saturating_add(extra);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::compute_fitness;
    use hydra_ir::{IrType, Module, Opcode, Value};

    fn leaf_function(m: &mut Module, name: &str, num_emitting: u32) -> FuncId {
        let f = m.declare_function(name, vec![], Some(IrType::I64), false, true);
        let b = m.new_block(f, "entry");
        for _ in 0..num_emitting.saturating_sub(1) {
            m.push_inst(
                b,
                Opcode::BinOp {
                    op: hydra_ir::BinOpKind::Add,
                    lhs: Value::ConstInt(1),
                    rhs: Value::ConstInt(1),
                },
                Some(IrType::I64),
            );
        }
        m.terminate_block(b, Opcode::Return(Some(Value::ConstInt(0))));
        f
    }

    #[test]
    fn leaf_cost_is_its_own_emitting_count() {
        let mut m = Module::new("p");
        let f = leaf_function(&mut m, "f", 5);
        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());
        // 4 binops + 1 terminator = 5 emitting instructions.
        assert_eq!(prof.total_cost(f), 5);
    }

    #[test]
    fn caller_cost_includes_callee_cost_times_multiplicity() {
        let mut m = Module::new("p");
        let callee = leaf_function(&mut m, "callee", 3);
        let caller = m.declare_function("caller", vec![], Some(IrType::I64), false, true);
        let b = m.new_block(caller, "entry");
        for _ in 0..2 {
            m.push_inst(
                b,
                Opcode::Call {
                    callee,
                    args: Default::default(),
                },
                Some(IrType::I64),
            );
        }
        m.terminate_block(b, Opcode::Return(Some(Value::ConstInt(0))));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());

        // callee: 2 binops + term = 3. caller: 2 calls + term = 3 emitting,
        // plus 2 * callee_cost(3) = 6 -> 9.
        assert_eq!(prof.total_cost(callee), 3);
        assert_eq!(prof.total_cost(caller), 9);
    }

    #[test]
    fn mutual_recursion_gets_one_level_of_unrolling() {
        let mut m = Module::new("rec");
        let f = m.declare_function("f", vec![], Some(IrType::I64), false, true);
        let g = m.declare_function("g", vec![], Some(IrType::I64), false, true);

        let bf = m.new_block(f, "entry");
        m.push_inst(
            bf,
            Opcode::Call {
                callee: g,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        m.terminate_block(bf, Opcode::Return(Some(Value::ConstInt(0))));

        let bg = m.new_block(g, "entry");
        m.push_inst(
            bg,
            Opcode::Call {
                callee: f,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        m.terminate_block(bg, Opcode::Return(Some(Value::ConstInt(0))));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());

        // base cost for both f and g (1 call + 1 term = 2 emitting, same-SCC
        // callee contributes 0) is 2; fix-up adds the other's base cost (2)
        // once: 2 + 2 = 4.
        assert_eq!(prof.total_cost(f), 4);
        assert_eq!(prof.total_cost(g), 4);
    }
}
