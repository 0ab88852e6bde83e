//! Arena-based SSA IR consumed by the Hydra auto-parallelization pass.
//!
//! This crate is the "externally provided" half of Hydra: the IR container,
//! call-graph construction, and loop/trip-count analysis that the core five
//! passes (in the `hydra` crate) treat as inputs rather than as something
//! they build themselves.

pub mod callgraph;
pub mod entities;
pub mod inst;
pub mod loops;
pub mod module;
pub mod types;
pub mod value;

pub use callgraph::CallGraph;
pub use entities::{BlockId, FuncId, GlobalId, InstId};
pub use inst::{BinOpKind, Inst, Opcode};
pub use loops::LoopForest;
pub use module::{BasicBlock, Function, Global, Module};
pub use types::IrType;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    fn build_two_block_function() -> (Module, FuncId) {
        let mut m = Module::new("t");
        let f = m.declare_function("f", vec![], Some(IrType::I64), false, true);
        let entry = m.new_block(f, "entry");
        let exit = m.new_block(f, "exit");
        m.terminate_block(entry, Opcode::Jump(exit));
        m.terminate_block(exit, Opcode::Return(Some(Value::ConstInt(0))));
        (m, f)
    }

    #[test]
    fn block_terminator_is_last_inst() {
        let (m, f) = build_two_block_function();
        let entry = m.func(f).entry.unwrap();
        let term = m.inst(m.block(entry).terminator());
        assert!(matches!(term.opcode, Opcode::Jump(_)));
    }

    #[test]
    fn successors_follow_jump() {
        let (m, f) = build_two_block_function();
        let entry = m.func(f).entry.unwrap();
        let succs = m.successors(entry);
        assert_eq!(succs.len(), 1);
    }

    #[test]
    fn call_graph_records_direct_edges() {
        let mut m = Module::new("t");
        let callee = m.declare_function("callee", vec![], None, false, true);
        let caller = m.declare_function("caller", vec![], None, false, true);
        let b = m.new_block(caller, "entry");
        m.push_inst(
            b,
            Opcode::Call {
                callee,
                args: Default::default(),
            },
            None,
        );
        m.terminate_block(b, Opcode::Return(None));
        let cb = m.new_block(callee, "entry");
        m.terminate_block(cb, Opcode::Return(None));

        let cg = CallGraph::build(&m);
        assert!(cg.callees(caller).any(|c| c == callee));
        assert_eq!(cg.callees(callee).count(), 0);
    }

    #[test]
    fn sccs_order_callees_before_callers() {
        let mut m = Module::new("t");
        let leaf = m.declare_function("leaf", vec![], None, false, true);
        let mid = m.declare_function("mid", vec![], None, false, true);
        for (f, callee) in [(mid, Some(leaf)), (leaf, None)] {
            let b = m.new_block(f, "entry");
            if let Some(callee) = callee {
                m.push_inst(
                    b,
                    Opcode::Call {
                        callee,
                        args: Default::default(),
                    },
                    None,
                );
            }
            m.terminate_block(b, Opcode::Return(None));
        }
        let cg = CallGraph::build(&m);
        let sccs = cg.sccs_leaves_first(&m);
        let leaf_pos = sccs.iter().position(|s| s.contains(&leaf)).unwrap();
        let mid_pos = sccs.iter().position(|s| s.contains(&mid)).unwrap();
        assert!(leaf_pos < mid_pos);
    }
}
