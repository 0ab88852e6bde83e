//! Pass D — Decider: accept or reject each `(call, joins)` pair by comparing
//! serial against parallel execution cost.
//!
//! `SpawnToJoinCost` runs a small Dijkstra over a synthesized weighted graph
//! of IR instructions between the call and its join set, then the configured
//! [`Aggregator`] collapses the per-join distances into one number.

use hydra_ir::{BlockId, InstId, Module, Opcode};
use std::collections::{BinaryHeap, HashMap};

use crate::config::{HydraConfig, ThreadModel};
use crate::joinpoints::CallSiteRecord;
use crate::profitability::ProfitabilityResult;

#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub serial_cost: u32,
    pub parallel_cost: u32,
    pub accepted: bool,
}

impl Decision {
    pub fn saved_cost(&self) -> u32 {
        self.serial_cost.saturating_sub(self.parallel_cost)
    }
}

#[derive(Debug, Default)]
pub struct DeciderResult {
    decisions: HashMap<InstId, Decision>,
}

impl DeciderResult {
    pub fn decision(&self, call: InstId) -> Option<Decision> {
        self.decisions.get(&call).copied()
    }

    pub fn accepted_calls(&self) -> impl Iterator<Item = InstId> + '_ {
        self.decisions.iter().filter(|(_, d)| d.accepted).map(|(&c, _)| c)
    }
}

/// Run Decider over every call site JoinPoints produced, in the order
/// JoinPoints handed them — leaves-first, reverse program order within a
/// function — so an accepted leaf's cost saving lands in `profitability`
/// before its callers are evaluated.
pub fn decide(
    module: &Module,
    records: &[CallSiteRecord],
    profitability: &mut ProfitabilityResult,
    config: &HydraConfig,
) -> DeciderResult {
    let mut result = DeciderResult::default();

    for record in records {
        let Opcode::Call { callee, .. } = &module.inst(record.call).opcode else {
            continue;
        };
        let callee_cost = profitability.total_cost(*callee);
        let caller_cost = spawn_to_join_cost(module, record, profitability, config.thread_model, config.aggregator);

        let serial_cost = callee_cost.saturating_add(caller_cost);
        let parallel_cost = config
            .thread_model
            .spawn_cost()
            .saturating_add(callee_cost.max(caller_cost))
            .saturating_add(config.thread_model.sync_cost());

        let accepted = serial_cost > parallel_cost;
        let decision = Decision {
            serial_cost,
            parallel_cost,
            accepted,
        };

        if accepted {
            profitability.reduce_total_cost(record.caller, decision.saved_cost());
        }

        result.decisions.insert(record.call, decision);
    }

    result
}

fn spawn_to_join_cost(
    module: &Module,
    record: &CallSiteRecord,
    profitability: &ProfitabilityResult,
    thread_model: ThreadModel,
    aggregator: crate::config::Aggregator,
) -> u32 {
    let spawn_block = module.inst(record.call).block;

    // Trivial case: the sole join is the instruction immediately following
    // the call in its own block (no other instructions live between them
    // once the spawn block collapses, e.g. single-join-same-block).
    if record.joins.len() == 1 {
        let join = *record.joins.iter().next().unwrap();
        if module.inst(join).block == spawn_block {
            let insts = module.block_insts(spawn_block);
            let call_pos = insts.iter().position(|&i| i == record.call).unwrap();
            let join_pos = insts.iter().position(|&i| i == join);
            if join_pos == Some(call_pos + 1) {
                return instruction_interval_cost(module, profitability, &[]);
            }
            if let Some(join_pos) = join_pos {
                if join_pos > call_pos {
                    return instruction_interval_cost(module, profitability, &insts[call_pos + 1..join_pos]);
                }
            }
        }
    }

    let (graph, call_vertex) = build_weighted_graph(module, record, profitability, thread_model);
    let distances = dijkstra(&graph, call_vertex);

    let join_distances: Vec<u32> = record
        .joins
        .iter()
        .map(|j| distances.get(j).copied().unwrap_or(u32::MAX))
        .collect();
    aggregator.aggregate(&join_distances)
}

fn instruction_interval_cost(module: &Module, profitability: &ProfitabilityResult, insts: &[InstId]) -> u32 {
    insts.iter().fold(0u32, |acc, &i| {
        let inst = module.inst(i);
        let weight = match &inst.opcode {
            Opcode::Call { callee, .. } => 1u32.saturating_add(profitability.total_cost(*callee)),
            _ => 1,
        };
        acc.saturating_add(weight)
    })
}

/// Vertices: the call itself, each reachable block's first instruction and
/// terminator, and every join instruction (folded into whichever block
/// vertex they coincide with).
fn build_weighted_graph(
    module: &Module,
    record: &CallSiteRecord,
    profitability: &ProfitabilityResult,
    _thread_model: ThreadModel,
) -> (HashMap<InstId, Vec<(InstId, u32)>>, InstId) {
    let spawn_block = module.inst(record.call).block;
    let mut graph: HashMap<InstId, Vec<(InstId, u32)>> = HashMap::new();

    let spawn_term = module.block(spawn_block).terminator();
    let spawn_insts = module.block_insts(spawn_block);
    let call_pos = spawn_insts.iter().position(|&i| i == record.call).unwrap();
    graph.entry(record.call).or_default().push((
        spawn_term,
        instruction_interval_cost(module, profitability, &spawn_insts[call_pos + 1..]),
    ));

    let mut reachable: Vec<BlockId> = Vec::new();
    let mut seen = std::collections::HashSet::from([spawn_block]);
    let mut queue: std::collections::VecDeque<BlockId> = module.successors(spawn_block).into_iter().collect();
    while let Some(b) = queue.pop_front() {
        if !seen.insert(b) {
            continue;
        }
        reachable.push(b);
        for s in module.successors(b) {
            if !seen.contains(&s) {
                queue.push_back(s);
            }
        }
    }

    for &b in &reachable {
        let insts = module.block_insts(b);
        let Some(&first) = insts.first() else { continue };
        let term = module.block(b).terminator();

        // Does a join land inside this block? If so the weighted edge from
        // first-inst runs to the join, not past it to the terminator.
        let join_here = record
            .joins
            .iter()
            .copied()
            .find(|j| module.inst(*j).block == b);

        if let Some(join) = join_here {
            let join_pos = insts.iter().position(|&i| i == join).unwrap();
            graph
                .entry(first)
                .or_default()
                .push((join, instruction_interval_cost(module, profitability, &insts[..join_pos])));
        } else {
            graph
                .entry(first)
                .or_default()
                .push((term, instruction_interval_cost(module, profitability, &insts[..insts.len().saturating_sub(1)])));
        }

        for pred in predecessors_of(module, &reachable, spawn_block, b) {
            let pred_term = if pred == spawn_block {
                spawn_term
            } else {
                module.block(pred).terminator()
            };
            graph.entry(pred_term).or_default().push((first, 0));
        }
    }

    (graph, record.call)
}

fn predecessors_of(module: &Module, reachable: &[BlockId], spawn_block: BlockId, target: BlockId) -> Vec<BlockId> {
    let mut preds = Vec::new();
    if module.successors(spawn_block).contains(&target) {
        preds.push(spawn_block);
    }
    for &b in reachable {
        if module.successors(b).contains(&target) {
            preds.push(b);
        }
    }
    preds
}

fn dijkstra(graph: &HashMap<InstId, Vec<(InstId, u32)>>, source: InstId) -> HashMap<InstId, u32> {
    #[derive(Eq, PartialEq)]
    struct Entry(u32, InstId);
    impl Ord for Entry {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            other.0.cmp(&self.0)
        }
    }
    impl PartialOrd for Entry {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut dist = HashMap::new();
    dist.insert(source, 0u32);
    let mut heap = BinaryHeap::new();
    heap.push(Entry(0, source));

    while let Some(Entry(d, u)) = heap.pop() {
        if d > *dist.get(&u).unwrap_or(&u32::MAX) {
            continue;
        }
        if let Some(edges) = graph.get(&u) {
            for &(v, w) in edges {
                let nd = d.saturating_add(w);
                if nd < *dist.get(&v).unwrap_or(&u32::MAX) {
                    dist.insert(v, nd);
                    heap.push(Entry(nd, v));
                }
            }
        }
    }

    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Aggregator, ThreadModel};
    use crate::fitness::compute_fitness;
    use crate::joinpoints::compute_join_points;
    use crate::profitability::compute_profitability;
    use hydra_ir::{CallGraph, IrType, LoopForest, Module, Opcode, Value};
    use std::collections::HashMap;

    fn leaf_with_emitting(m: &mut Module, name: &str, emitting: u32) -> hydra_ir::FuncId {
        let f = m.declare_function(name, vec![], Some(IrType::I64), false, true);
        let b = m.new_block(f, "entry");
        for _ in 0..emitting.saturating_sub(1) {
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

    /// Scenario P-1: main calls fSpawn(10000), gLeave(10), hSpawn(10000),
    /// iLeave(10000), jLeave(10) in order, each call's result unused (void
    /// join at the terminator). With SPAWN_COST=100 (light-thread default)
    /// the expensive calls with slack remaining in the caller should be
    /// accepted; the last call in program order has no remaining caller
    /// cost to outweigh spawn overhead.
    #[test]
    fn scenario_p1_accepts_fspawn_and_hspawn() {
        let mut m = Module::new("p1");
        let f_spawn = leaf_with_emitting(&mut m, "f_spawn", 10000);
        let g_leave = leaf_with_emitting(&mut m, "g_leave", 10);
        let h_spawn = leaf_with_emitting(&mut m, "h_spawn", 10000);
        let i_leave = leaf_with_emitting(&mut m, "i_leave", 10000);
        let j_leave = leaf_with_emitting(&mut m, "j_leave", 10);

        let main = m.declare_function("main", vec![], None, false, true);
        let b = m.new_block(main, "entry");
        let mut calls = Vec::new();
        for callee in [f_spawn, g_leave, h_spawn, i_leave, j_leave] {
            let c = m.push_inst(
                b,
                Opcode::Call {
                    callee,
                    args: Default::default(),
                },
                Some(IrType::I64),
            );
            calls.push(c);
        }
        m.terminate_block(b, Opcode::Return(None));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let mut prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let config = crate::config::HydraConfig {
            thread_model: ThreadModel::Light,
            aggregator: Aggregator::Mean,
        };
        let decider = decide(&m, &records, &mut prof, &config);

        assert!(decider.decision(calls[0]).unwrap().accepted, "f_spawn should be accepted");
        assert!(decider.decision(calls[2]).unwrap().accepted, "h_spawn should be accepted");
        assert!(!decider.decision(calls[4]).unwrap().accepted, "j_leave is last and cheap: no remaining caller cost to justify spawn overhead");
    }

    #[test]
    fn kernel_build_uses_instructions_to_terminator() {
        let mut m = Module::new("kernel");
        let callee = leaf_with_emitting(&mut m, "callee", 1);
        let main = m.declare_function("main", vec![], None, false, true);
        let b = m.new_block(main, "entry");
        let call = m.push_inst(
            b,
            Opcode::Call {
                callee,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        m.terminate_block(b, Opcode::Return(None));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let mut prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Kernel);
        let config = crate::config::HydraConfig {
            thread_model: ThreadModel::Kernel,
            aggregator: Aggregator::Mean,
        };
        let decider = decide(&m, &records, &mut prof, &config);
        // caller_cost: zero instructions between call and its own terminator
        // (call is immediately followed by the return). callee cost 1.
        let d = decider.decision(call).unwrap();
        assert_eq!(d.serial_cost, 1);
        assert_eq!(d.parallel_cost, ThreadModel::Kernel.spawn_cost() + 1);
        assert!(!d.accepted);
    }

    /// A function that calls `first` then `second` in sequence, both
    /// results unused — the shape `scenario_p1_accepts_fspawn_and_hspawn`
    /// already exercises for a flat call list, reused here one level at a
    /// time to build a call tree.
    fn pair_caller(
        m: &mut Module,
        name: &str,
        first: hydra_ir::FuncId,
        second: hydra_ir::FuncId,
    ) -> (hydra_ir::FuncId, InstId, InstId) {
        let f = m.declare_function(name, vec![], None, false, true);
        let b = m.new_block(f, "entry");
        let c1 = m.push_inst(
            b,
            Opcode::Call {
                callee: first,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        let c2 = m.push_inst(
            b,
            Opcode::Call {
                callee: second,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        m.terminate_block(b, Opcode::Return(None));
        (f, c1, c2)
    }

    /// Scenario J-2: a perfect binary call tree
    /// `main -> {f,g} -> {ff,fg,gf,gg} -> do_work`, every leaf calling a
    /// shared 10000-emitting-instruction `do_work`. JoinPoints/Decider must
    /// process the tree leaves-first so that each inner node's acceptance
    /// decision sees its callees' *already-reduced* `total_cost`, not the
    /// cost Profitability originally computed for them — otherwise the
    /// first call in every pair would be rejected instead of accepted.
    #[test]
    fn scenario_j2_binary_tree_propagation() {
        let mut m = Module::new("j2");
        let do_work = leaf_with_emitting(&mut m, "do_work", 10000);

        let (ff, ff_c1, ff_c2) = pair_caller(&mut m, "ff", do_work, do_work);
        let (fg, fg_c1, fg_c2) = pair_caller(&mut m, "fg", do_work, do_work);
        let (gf, gf_c1, gf_c2) = pair_caller(&mut m, "gf", do_work, do_work);
        let (gg, gg_c1, gg_c2) = pair_caller(&mut m, "gg", do_work, do_work);

        let (f, f_c1, f_c2) = pair_caller(&mut m, "f", ff, fg);
        let (g, g_c1, g_c2) = pair_caller(&mut m, "g", gf, gg);

        let (_main, main_c1, main_c2) = pair_caller(&mut m, "main", f, g);

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let mut prof = compute_profitability(&m, &fitness, &cg, &HashMap::new());
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let config = crate::config::HydraConfig {
            thread_model: ThreadModel::Light,
            aggregator: Aggregator::Mean,
        };
        let decider = decide(&m, &records, &mut prof, &config);

        let accepted = |c: InstId| decider.decision(c).unwrap().accepted;

        // Innermost layer: the first call of every pair overlaps with the
        // second call's cost while it runs, the second call has nothing
        // left to overlap with.
        for (first, second) in [(ff_c1, ff_c2), (fg_c1, fg_c2), (gf_c1, gf_c2), (gg_c1, gg_c2)] {
            assert!(accepted(first), "first call in a leaf pair overlaps the second call's cost");
            assert!(!accepted(second), "second call in a leaf pair has no remaining work to overlap");
        }

        // Middle layer: f and g's first calls are only profitable because
        // Decider already reduced ff/fg/gf/gg's total_cost below — using
        // the pre-reduction cost would reject them too.
        assert!(accepted(f_c1), "f's call to ff overlaps fg's already-reduced cost");
        assert!(!accepted(f_c2));
        assert!(accepted(g_c1), "g's call to gf overlaps gg's already-reduced cost");
        assert!(!accepted(g_c2));

        // Outer layer: same propagation one level further out.
        assert!(accepted(main_c1), "main's call to f overlaps g's already-reduced cost");
        assert!(!accepted(main_c2));
    }
}
