//! Pass F — Rewriter: turn each accepted `(call, joins)` into a spawn/join
//! pair against the runtime, plumbing return values through a stack slot.

use hydra_ir::{FuncId, InstId, IrType, Module, Opcode, Value};

use crate::config::ThreadModel;
use crate::decider::DeciderResult;
use crate::joinpoints::CallSiteRecord;
use crate::spawnable::{ParamBridge, SpawnableResult};

/// Per-call-site lifecycle. Every call starts at `Candidate`; `rewrite`
/// only ever drives calls that already reached `DecidedAccept` the rest of
/// the way to `Rewritten` — the earlier states are recorded by whichever
/// pass rejected the call, see `build_report` in `pipeline.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    Candidate,
    RejectedUnknown,
    JoinsComputed,
    RejectedUnprofitable,
    DecidedAccept,
    Adapted,
    Rewritten,
}

fn opaque_ptr() -> IrType {
    IrType::ptr_to(IrType::I8)
}

/// Deterministic 32-bit task-id generator. Task ids only need to be
/// distinct enough not to collide within one thread's outstanding spawns,
/// so a seeded xorshift stands in for whatever PRNG the embedder wires up.
#[derive(Debug)]
pub struct TaskIdSource {
    state: u64,
}

impl TaskIdSource {
    pub fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    pub fn next(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }
}

/// Rewrite every call in `decider.accepted_calls()`. `records` must be the
/// same slice JoinPoints produced (joins are looked up by call id) and
/// `spawnable` must already carry an adapter for every accepted callee.
pub fn rewrite(
    module: &mut Module,
    records: &[CallSiteRecord],
    decider: &DeciderResult,
    spawnable: &SpawnableResult,
    thread_model: ThreadModel,
    task_ids: &mut TaskIdSource,
) {
    let accepted: Vec<InstId> = decider.accepted_calls().collect();
    for call in accepted {
        let Some(record) = records.iter().find(|r| r.call == call) else {
            continue;
        };
        rewrite_call(module, record, spawnable, thread_model, task_ids);
    }
}

fn rewrite_call(
    module: &mut Module,
    record: &CallSiteRecord,
    spawnable: &SpawnableResult,
    thread_model: ThreadModel,
    task_ids: &mut TaskIdSource,
) {
    let call = record.call;
    let (callee, call_args, ret_ty) = {
        let inst = module.inst(call);
        let Opcode::Call { callee, args } = &inst.opcode else {
            panic!("rewrite_call invoked on a non-call instruction");
        };
        (*callee, args.clone(), inst.result_ty.clone())
    };

    let adapter = spawnable
        .adapter(callee)
        .expect("MakeSpawnable must run before Rewriter for every accepted callee")
        .clone();

    let task = match thread_model {
        ThreadModel::Kernel => {
            let slot = module.insert_before(call, Opcode::Alloca { ty: IrType::I64 }, Some(IrType::ptr_to(IrType::I64)));
            Value::Inst(slot)
        }
        ThreadModel::Light => Value::ConstInt(task_ids.next() as i64),
    };

    let mut spawn_args: smallvec::SmallVec<[Value; 8]> = smallvec::SmallVec::new();
    for (arg, bridge) in call_args.iter().zip(&adapter.param_bridges) {
        let ptr_value = match bridge {
            ParamBridge::DirectPointer(_) => {
                module.insert_before(call, Opcode::Bitcast { value: *arg, to: opaque_ptr() }, Some(opaque_ptr()))
            }
            ParamBridge::LoadThrough(ty) => {
                let slot = module.insert_before(call, Opcode::Alloca { ty: ty.clone() }, Some(IrType::ptr_to(ty.clone())));
                module.insert_before(call, Opcode::Store { ptr: Value::Inst(slot), value: *arg }, None);
                module.insert_before(call, Opcode::Bitcast { value: Value::Inst(slot), to: opaque_ptr() }, Some(opaque_ptr()))
            }
        };
        spawn_args.push(Value::Inst(ptr_value));
    }

    let return_slot = ret_ty.clone().map(|ty| {
        let slot = module.insert_before(call, Opcode::Alloca { ty: ty.clone() }, Some(IrType::ptr_to(ty.clone())));
        let ptr = module.insert_before(call, Opcode::Bitcast { value: Value::Inst(slot), to: opaque_ptr() }, Some(opaque_ptr()));
        spawn_args.push(Value::Inst(ptr));
        slot
    });

    module.insert_before(
        call,
        Opcode::Spawn {
            task,
            adapter: adapter.target,
            args: spawn_args,
        },
        None,
    );

    for &join in &record.joins {
        let join_inst = module.insert_before(join, Opcode::Join { task }, None);
        if thread_model.collapses_joins_to_terminator() {
            module.insert_before(join, Opcode::Other { mnemonic: "thread_destroy", operands: [task].into_iter().collect() }, None);
        }
        let _ = join_inst;
    }

    if let Some(slot) = return_slot {
        let ret_ty = ret_ty.expect("return_slot implies a return type");
        for consumer in find_consumers(module, call) {
            let load = module.insert_before(consumer, Opcode::Load { ptr: Value::Inst(slot) }, Some(ret_ty.clone()));
            module.inst_mut(consumer).opcode.replace_operand(call, Value::Inst(load));
        }
    }

    module.erase_inst(call);
}

fn find_consumers(module: &Module, target: InstId) -> Vec<InstId> {
    let mut out = Vec::new();
    for func in module.function_ids() {
        for &block in &module.func(func).blocks {
            for &inst_id in module.block_insts(block) {
                if inst_id == target {
                    continue;
                }
                if module.inst(inst_id).opcode.operands().iter().any(|v| *v == Value::Inst(target)) {
                    out.push(inst_id);
                }
            }
        }
    }
    out
}
