//! Pass C — JoinPoints: earliest-reader search per call site.
//!
//! For every call whose callee Fitness proved Functional, find the set of
//! instructions that are, along every forward control-flow path, the first
//! to read the call's return value (or, on a path with no reader, that
//! path's terminator). Kernel-thread builds skip the search entirely: every
//! join collapses to the spawn block's own terminator.

use hydra_ir::{BlockId, CallGraph, FuncId, InstId, Module, Opcode, Value};
use std::collections::{HashSet, VecDeque};

use crate::config::ThreadModel;
use crate::fitness::FitnessResult;

pub type JoinSet = HashSet<InstId>;

#[derive(Debug, Clone)]
pub struct CallSiteRecord {
    pub call: InstId,
    pub caller: FuncId,
    pub joins: JoinSet,
}

/// Compute `(call, joins)` for every call site whose callee is Functional.
/// Order: SCC post-order over functions (leaves first), then within each
/// function, reverse program order over its calls — the order Decider
/// relies on to propagate cost reductions outward correctly.
pub fn compute_join_points(
    module: &Module,
    fitness: &FitnessResult,
    call_graph: &CallGraph,
    thread_model: ThreadModel,
) -> Vec<CallSiteRecord> {
    let mut out = Vec::new();
    for scc in call_graph.sccs_leaves_first(module) {
        for func in scc {
            let mut calls = Vec::new();
            for &block in &module.func(func).blocks {
                for &inst_id in module.block_insts(block) {
                    if let Opcode::Call { callee, .. } = &module.inst(inst_id).opcode {
                        if fitness.is_functional(*callee) {
                            calls.push(inst_id);
                        }
                    }
                }
            }
            calls.reverse();
            for call in calls {
                let joins = join_set_for_call(module, call, thread_model);
                out.push(CallSiteRecord {
                    call,
                    caller: func,
                    joins,
                });
            }
        }
    }
    out
}

fn join_set_for_call(module: &Module, call: InstId, thread_model: ThreadModel) -> JoinSet {
    let spawn_block = module.inst(call).block;

    if thread_model.collapses_joins_to_terminator() {
        return JoinSet::from([module.block(spawn_block).terminator()]);
    }

    let insts = module.block_insts(spawn_block);
    let call_pos = insts.iter().position(|&i| i == call).expect("call lives in its own block");

    if let Some(reader) = first_reader(module, &insts[call_pos + 1..], call) {
        return JoinSet::from([reader]);
    }

    if module.successors(spawn_block).is_empty() {
        return JoinSet::from([module.block(spawn_block).terminator()]);
    }

    let mut joins = JoinSet::new();
    let mut explored = HashSet::from([spawn_block]);
    let mut queue: VecDeque<BlockId> = module.successors(spawn_block).into_iter().collect();

    while let Some(b) = queue.pop_front() {
        if !explored.insert(b) {
            continue;
        }
        let insts = module.block_insts(b);
        // Wrapping back to the spawn block only re-exposes the prefix before
        // the call; the suffix was already checked in the trivial case.
        let scan_end = if b == spawn_block { call_pos } else { insts.len() };

        if let Some(reader) = first_reader(module, &insts[..scan_end], call) {
            joins.insert(reader);
            continue;
        }

        let succs = module.successors(b);
        if succs.is_empty() {
            joins.insert(module.block(b).terminator());
        } else {
            for s in succs {
                if !explored.contains(&s) {
                    queue.push_back(s);
                }
            }
        }
    }

    joins
}

fn first_reader(module: &Module, insts: &[InstId], call: InstId) -> Option<InstId> {
    insts
        .iter()
        .copied()
        .find(|&i| module.inst(i).opcode.operands().iter().any(|v| *v == Value::Inst(call)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::compute_fitness;
    use hydra_ir::{IrType, Opcode, Value};

    fn declare_leaf(m: &mut Module, name: &str) -> FuncId {
        let f = m.declare_function(name, vec![], Some(IrType::I64), false, true);
        let b = m.new_block(f, "entry");
        m.terminate_block(b, Opcode::Return(Some(Value::ConstInt(0))));
        f
    }

    /// Scenario J-1: `spawn_me`'s result is consumed in a merge block after a
    /// branch.
    #[test]
    fn scenario_j1_branch_merge() {
        let mut m = Module::new("j1");
        let spawn_me = declare_leaf(&mut m, "spawn_me");
        let main = m.declare_function("main", vec![], None, false, true);

        let entry = m.new_block(main, "entry");
        let call = m.push_inst(
            entry,
            Opcode::Call {
                callee: spawn_me,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        let then_b = m.new_block(main, "then");
        let else_b = m.new_block(main, "else");
        let merge = m.new_block(main, "merge");
        m.terminate_block(
            entry,
            Opcode::Branch {
                cond: Value::ConstBool(true),
                then_block: then_b,
                else_block: else_b,
            },
        );
        m.terminate_block(then_b, Opcode::Jump(merge));
        m.terminate_block(else_b, Opcode::Jump(merge));
        let reader = m.push_inst(
            merge,
            Opcode::BinOp {
                op: hydra_ir::BinOpKind::Add,
                lhs: Value::Inst(call),
                rhs: Value::ConstInt(1),
            },
            Some(IrType::I64),
        );
        m.terminate_block(merge, Opcode::Return(Some(Value::Inst(reader))));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);

        let light = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let record = light.iter().find(|r| r.call == call).unwrap();
        assert_eq!(record.joins, JoinSet::from([reader]));

        let kernel = compute_join_points(&m, &fitness, &cg, ThreadModel::Kernel);
        let record = kernel.iter().find(|r| r.call == call).unwrap();
        assert_eq!(record.joins, JoinSet::from([m.block(entry).terminator()]));
    }

    #[test]
    fn void_call_with_no_reader_joins_at_terminators() {
        let mut m = Module::new("void");
        let side_effecting = m.declare_function("side_effecting", vec![], None, false, true);
        let b0 = m.new_block(side_effecting, "entry");
        m.terminate_block(b0, Opcode::Return(None));

        let main = m.declare_function("main", vec![], None, false, true);
        let entry = m.new_block(main, "entry");
        let call = m.push_inst(
            entry,
            Opcode::Call {
                callee: side_effecting,
                args: Default::default(),
            },
            None,
        );
        let exit = m.new_block(main, "exit");
        m.terminate_block(entry, Opcode::Jump(exit));
        m.terminate_block(exit, Opcode::Return(None));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let record = records.iter().find(|r| r.call == call).unwrap();
        assert_eq!(record.joins, JoinSet::from([m.block(exit).terminator()]));
    }

    #[test]
    fn trivial_same_block_reader() {
        let mut m = Module::new("trivial");
        let leaf = declare_leaf(&mut m, "leaf");
        let main = m.declare_function("main", vec![], Some(IrType::I64), false, true);
        let b = m.new_block(main, "entry");
        let call = m.push_inst(
            b,
            Opcode::Call {
                callee: leaf,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        let reader = m.push_inst(
            b,
            Opcode::BinOp {
                op: hydra_ir::BinOpKind::Add,
                lhs: Value::Inst(call),
                rhs: Value::ConstInt(1),
            },
            Some(IrType::I64),
        );
        m.terminate_block(b, Opcode::Return(Some(Value::Inst(reader))));

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let record = records.iter().find(|r| r.call == call).unwrap();
        assert_eq!(record.joins, JoinSet::from([reader]));
    }

    #[test]
    fn calls_ordered_reverse_program_order_within_function() {
        let mut m = Module::new("order");
        let leaf_a = declare_leaf(&mut m, "leaf_a");
        let leaf_b = declare_leaf(&mut m, "leaf_b");
        let main = m.declare_function("main", vec![], None, false, true);
        let b = m.new_block(main, "entry");
        let first = m.push_inst(
            b,
            Opcode::Call {
                callee: leaf_a,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        let second = m.push_inst(
            b,
            Opcode::Call {
                callee: leaf_b,
                args: Default::default(),
            },
            Some(IrType::I64),
        );
        m.terminate_block(b, Opcode::Return(None));
        let _ = (first, second);

        let cg = CallGraph::build(&m);
        let fitness = compute_fitness(&m, &cg);
        let records = compute_join_points(&m, &fitness, &cg, ThreadModel::Light);
        let positions: Vec<_> = records.iter().map(|r| r.call).collect();
        assert_eq!(positions, vec![second, first]);
    }
}
