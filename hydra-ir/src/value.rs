use crate::entities::{GlobalId, InstId};

/// An operand: either the result of another instruction, an argument of the
/// enclosing function, a constant, or a reference to a module-level global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Inst(InstId),
    Arg(u32),
    ConstInt(i64),
    ConstFloat(f64),
    ConstBool(bool),
    Global(GlobalId),
}

impl Value {
    pub fn is_global(&self) -> bool {
        matches!(self, Value::Global(_))
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }
}
