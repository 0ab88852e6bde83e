//! The module/function/basic-block/instruction graph Hydra's passes walk.
//!
//! Everything is arena-owned by [`Module`] and addressed by the entity ids
//! in [`crate::entities`]; there is deliberately no pointer graph to trip
//! over when a pass wants to mutate the IR out from under another pass's
//! cached references.

use crate::entities::{BlockId, FuncId, GlobalId, InstId};
use crate::inst::{Inst, Opcode};
use crate::types::IrType;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub func: FuncId,
    pub label: String,
    /// Ordered instructions, terminator included as the final element.
    pub insts: Vec<InstId>,
}

impl BasicBlock {
    pub fn terminator(&self) -> InstId {
        *self
            .insts
            .last()
            .expect("basic block must have a terminator before it is read")
    }

    pub fn body(&self) -> &[InstId] {
        &self.insts[..self.insts.len().saturating_sub(1)]
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub ret_type: Option<IrType>,
    pub is_variadic: bool,
    /// A declaration with no body is an external function.
    pub has_body: bool,
    pub blocks: Vec<BlockId>,
    pub entry: Option<BlockId>,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn returns_value(&self) -> bool {
        self.ret_type.is_some()
    }

    pub fn has_pointer_arg(&self) -> bool {
        self.params.iter().any(|(_, ty)| ty.is_pointer())
    }
}

#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    funcs: Vec<Function>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Inst>,
    globals: Vec<Global>,
    func_by_name: HashMap<String, FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ---- globals ----

    pub fn add_global(&mut self, name: impl Into<String>) -> GlobalId {
        let id = GlobalId::new(self.globals.len() as u32);
        self.globals.push(Global {
            id,
            name: name.into(),
        });
        id
    }

    // ---- functions ----

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<(String, IrType)>,
        ret_type: Option<IrType>,
        is_variadic: bool,
        has_body: bool,
    ) -> FuncId {
        let name = name.into();
        let id = FuncId::new(self.funcs.len() as u32);
        self.funcs.push(Function {
            id,
            name: name.clone(),
            params,
            ret_type,
            is_variadic,
            has_body,
            blocks: Vec::new(),
            entry: None,
        });
        self.func_by_name.insert(name, id);
        id
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.index()]
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncId> {
        self.func_by_name.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.funcs.iter()
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        (0..self.funcs.len()).map(|i| FuncId::new(i as u32))
    }

    // ---- blocks ----

    pub fn new_block(&mut self, func: FuncId, label: impl Into<String>) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            func,
            label: label.into(),
            insts: Vec::new(),
        });
        let f = self.func_mut(func);
        f.blocks.push(id);
        if f.entry.is_none() {
            f.entry = Some(id);
        }
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    // ---- instructions ----

    fn alloc_inst(&mut self, block: BlockId, opcode: Opcode, result_ty: Option<IrType>) -> InstId {
        let id = InstId::new(self.insts.len() as u32);
        self.insts.push(Inst {
            id,
            block,
            opcode,
            result_ty,
        });
        id
    }

    /// Append a non-terminator instruction to the end of `block`.
    pub fn push_inst(&mut self, block: BlockId, opcode: Opcode, result_ty: Option<IrType>) -> InstId {
        debug_assert!(!opcode.is_terminator(), "use terminate_block for terminators");
        let id = self.alloc_inst(block, opcode, result_ty);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Close out `block` with a terminator. Must be called exactly once per
    /// block, after all body instructions have been pushed.
    pub fn terminate_block(&mut self, block: BlockId, opcode: Opcode) -> InstId {
        debug_assert!(opcode.is_terminator());
        let id = self.alloc_inst(block, opcode, None);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Insert a new instruction immediately before `before` in `before`'s
    /// block, returning the new instruction's id. Used by the Rewriter to
    /// splice in joins and return-value loads.
    pub fn insert_before(
        &mut self,
        before: InstId,
        opcode: Opcode,
        result_ty: Option<IrType>,
    ) -> InstId {
        let block = self.inst(before).block;
        let new_id = self.alloc_inst(block, opcode, result_ty);
        let b = self.block_mut(block);
        let pos = b
            .insts
            .iter()
            .position(|&i| i == before)
            .expect("`before` must live in its own block");
        b.insts.insert(pos, new_id);
        new_id
    }

    /// Remove `target` from its block's instruction list. The arena slot is
    /// left in place (other instructions may still carry its `InstId` as an
    /// operand momentarily, before the Rewriter finishes replacing uses).
    pub fn erase_inst(&mut self, target: InstId) {
        let block = self.inst(target).block;
        self.block_mut(block).insts.retain(|&i| i != target);
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    /// All instructions in `block`, in order (including the terminator).
    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        &self.block(block).insts
    }

    /// Direct successor blocks of `block`, read off its terminator.
    pub fn successors(&self, block: BlockId) -> smallvec::SmallVec<[BlockId; 2]> {
        self.inst(self.block(block).terminator()).opcode.successors()
    }

    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.iter()
    }
}
