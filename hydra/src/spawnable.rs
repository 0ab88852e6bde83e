//! Pass E — MakeSpawnable: synthesize a uniform opaque-pointer adapter for
//! every accepted callee.
//!
//! The runtime's `spawn` takes 0–8 opaque pointers and returns nothing; an
//! adapter `F#` is the thin bridge between that uniform ABI and `F`'s real
//! signature: a uniform trampoline, the same shape any normalize-before-
//! dispatch call-site convention uses.

use hydra_ir::{FuncId, IrType, Module};
use std::collections::HashMap;

/// One parameter slot of an adapter: either the opaque pointer *is* the
/// original pointer argument directly, or it must be loaded through first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamBridge {
    /// Original parameter was already a pointer; reinterpret the opaque
    /// pointer as that type with no load.
    DirectPointer(IrType),
    /// Original parameter was a scalar; the opaque pointer addresses a slot
    /// holding it, so the adapter body loads through it.
    LoadThrough(IrType),
}

#[derive(Debug, Clone)]
pub struct Adapter {
    pub target: FuncId,
    pub name: String,
    pub param_bridges: Vec<ParamBridge>,
    /// `Some(ty)` when `target` returns a value: the trailing opaque pointer
    /// addresses storage of this type that the adapter stores through.
    pub return_slot: Option<IrType>,
}

impl Adapter {
    /// Number of opaque-pointer parameters the adapter itself takes.
    pub fn arity(&self) -> usize {
        self.param_bridges.len() + if self.return_slot.is_some() { 1 } else { 0 }
    }
}

#[derive(Debug, Default)]
pub struct SpawnableResult {
    adapters: HashMap<FuncId, Adapter>,
}

impl SpawnableResult {
    pub fn adapter(&self, f: FuncId) -> Option<&Adapter> {
        self.adapters.get(&f)
    }

    pub fn contains(&self, f: FuncId) -> bool {
        self.adapters.contains_key(&f)
    }
}

/// Synthesize an adapter for every function in `accepted`. Every callee here
/// must already have been proven Functional — MakeSpawnable does not itself
/// check fitness, it trusts Decider's input set.
pub fn make_spawnable(module: &Module, accepted: impl IntoIterator<Item = FuncId>) -> SpawnableResult {
    let mut adapters = HashMap::new();
    for f in accepted {
        if adapters.contains_key(&f) {
            continue;
        }
        let func = module.func(f);
        let param_bridges = func
            .params
            .iter()
            .map(|(_, ty)| {
                if ty.is_pointer() {
                    ParamBridge::DirectPointer(ty.clone())
                } else {
                    ParamBridge::LoadThrough(ty.clone())
                }
            })
            .collect();
        let adapter = Adapter {
            target: f,
            name: format!("{}#", func.name),
            param_bridges,
            return_slot: func.ret_type.clone(),
        };
        adapters.insert(f, adapter);
    }
    SpawnableResult { adapters }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_ir::Module;

    #[test]
    fn adapter_arity_counts_params_plus_return_slot() {
        let mut m = Module::new("adapters");
        let f = m.declare_function(
            "scale",
            vec![
                ("x".into(), IrType::I32),
                ("out".into(), IrType::ptr_to(IrType::I32)),
            ],
            Some(IrType::I64),
            false,
            true,
        );
        let result = make_spawnable(&m, [f]);
        let adapter = result.adapter(f).unwrap();
        assert_eq!(adapter.arity(), 3); // 2 params + 1 return slot
        assert_eq!(adapter.name, "scale#");
        assert!(matches!(adapter.param_bridges[0], ParamBridge::LoadThrough(IrType::I32)));
        assert!(matches!(adapter.param_bridges[1], ParamBridge::DirectPointer(_)));
    }

    #[test]
    fn void_returning_function_has_no_return_slot() {
        let mut m = Module::new("adapters");
        let f = m.declare_function("log_event", vec![("code".into(), IrType::I32)], None, false, true);
        let result = make_spawnable(&m, [f]);
        let adapter = result.adapter(f).unwrap();
        assert_eq!(adapter.arity(), 1);
        assert!(adapter.return_slot.is_none());
    }
}
