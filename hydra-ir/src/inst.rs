//! Instructions and the category distinctions Hydra's core cares about:
//! calls, memory accesses, non-emitting instructions, and anything whose
//! operand list mentions a global.

use crate::entities::{BlockId, FuncId, InstId};
use crate::types::IrType;
use crate::value::Value;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
}

/// The operation an instruction performs. Variants after the `// --- terminators ---`
/// marker end a basic block; every other variant is a "body" instruction.
#[derive(Debug, Clone)]
pub enum Opcode {
    Call {
        callee: FuncId,
        args: SmallVec<[Value; 4]>,
    },
    Alloca {
        ty: IrType,
    },
    Load {
        ptr: Value,
    },
    Store {
        ptr: Value,
        value: Value,
    },
    AtomicCas {
        ptr: Value,
        expected: Value,
        new: Value,
    },
    AtomicRmw {
        ptr: Value,
        value: Value,
    },
    Bitcast {
        value: Value,
        to: IrType,
    },
    Phi {
        incoming: Vec<(BlockId, Value)>,
    },
    BinOp {
        op: BinOpKind,
        lhs: Value,
        rhs: Value,
    },
    /// Catch-all for emitting instructions whose operands matter for
    /// global-reference and use-scanning but whose exact semantics Hydra
    /// never inspects (e.g. array index, field access).
    Other {
        mnemonic: &'static str,
        operands: SmallVec<[Value; 4]>,
    },
    /// Rewriter output: dispatch `adapter` onto the runtime pool under
    /// `task`, passing up to eight opaque-pointer argument values.
    Spawn {
        task: Value,
        adapter: FuncId,
        args: SmallVec<[Value; 8]>,
    },
    /// Rewriter output: await every spawn made under `task` on this thread.
    Join {
        task: Value,
    },
    // --- terminators ---
    Return(Option<Value>),
    Jump(BlockId),
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: Value,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return(_) | Opcode::Jump(_) | Opcode::Branch { .. } | Opcode::Switch { .. }
        )
    }

    /// Bitcast and phi generate no machine code; everything else does.
    pub fn is_emitting(&self) -> bool {
        !matches!(self, Opcode::Bitcast { .. } | Opcode::Phi { .. })
    }

    pub fn is_memory_access(&self) -> bool {
        matches!(
            self,
            Opcode::Alloca { .. }
                | Opcode::Load { .. }
                | Opcode::Store { .. }
                | Opcode::AtomicCas { .. }
                | Opcode::AtomicRmw { .. }
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Opcode::Call { .. })
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, Opcode::Spawn { .. })
    }

    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Opcode::Jump(b) => SmallVec::from_slice(&[*b]),
            Opcode::Branch {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[*then_block, *else_block]),
            Opcode::Switch { cases, default, .. } => {
                let mut v: SmallVec<[BlockId; 2]> = cases.iter().map(|(_, b)| *b).collect();
                v.push(*default);
                v
            }
            Opcode::Return(_) => SmallVec::new(),
            _ => SmallVec::new(),
        }
    }

    /// Every `Value` operand this instruction reads, in no particular order.
    pub fn operands(&self) -> SmallVec<[Value; 4]> {
        match self {
            Opcode::Call { args, .. } => args.clone(),
            Opcode::Alloca { .. } => SmallVec::new(),
            Opcode::Load { ptr } => SmallVec::from_slice(&[*ptr]),
            Opcode::Store { ptr, value } => SmallVec::from_slice(&[*ptr, *value]),
            Opcode::AtomicCas {
                ptr,
                expected,
                new,
            } => SmallVec::from_slice(&[*ptr, *expected, *new]),
            Opcode::AtomicRmw { ptr, value } => SmallVec::from_slice(&[*ptr, *value]),
            Opcode::Bitcast { value, .. } => SmallVec::from_slice(&[*value]),
            Opcode::Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
            Opcode::BinOp { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            Opcode::Other { operands, .. } => operands.clone(),
            Opcode::Spawn { task, args, .. } => {
                let mut v: SmallVec<[Value; 4]> = SmallVec::from_slice(&[*task]);
                v.extend(args.iter().copied());
                v
            }
            Opcode::Join { task } => SmallVec::from_slice(&[*task]),
            Opcode::Return(v) => v.iter().cloned().collect(),
            Opcode::Jump(_) => SmallVec::new(),
            Opcode::Branch { cond, .. } => SmallVec::from_slice(&[*cond]),
            Opcode::Switch { value, .. } => SmallVec::from_slice(&[*value]),
        }
    }

    pub fn references_global(&self) -> bool {
        self.operands().iter().any(Value::is_global)
    }

    /// Replace every occurrence of `old` among this instruction's operands
    /// with `new`. Used by the Rewriter to plumb a load in for a spawned
    /// call's former SSA value.
    pub fn replace_operand(&mut self, old: InstId, new: Value) {
        let swap = |v: &mut Value| {
            if v.as_inst() == Some(old) {
                *v = new;
            }
        };
        match self {
            Opcode::Call { args, .. } => args.iter_mut().for_each(swap),
            Opcode::Load { ptr } => swap(ptr),
            Opcode::Store { ptr, value } => {
                swap(ptr);
                swap(value);
            }
            Opcode::AtomicCas {
                ptr,
                expected,
                new: new_val,
            } => {
                swap(ptr);
                swap(expected);
                swap(new_val);
            }
            Opcode::AtomicRmw { ptr, value } => {
                swap(ptr);
                swap(value);
            }
            Opcode::Bitcast { value, .. } => swap(value),
            Opcode::Phi { incoming } => incoming.iter_mut().for_each(|(_, v)| swap(v)),
            Opcode::BinOp { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            Opcode::Other { operands, .. } => operands.iter_mut().for_each(swap),
            Opcode::Spawn { task, args, .. } => {
                swap(task);
                args.iter_mut().for_each(swap);
            }
            Opcode::Join { task } => swap(task),
            Opcode::Alloca { .. } => {}
            Opcode::Return(v) => {
                if let Some(v) = v {
                    swap(v);
                }
            }
            Opcode::Branch { cond, .. } => swap(cond),
            Opcode::Switch { value, .. } => swap(value),
            Opcode::Jump(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub id: InstId,
    pub block: BlockId,
    pub opcode: Opcode,
    pub result_ty: Option<IrType>,
}

impl Inst {
    pub fn produces_value(&self) -> bool {
        self.result_ty.is_some()
    }
}
