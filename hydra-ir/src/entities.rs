//! Stable, copyable identifiers for everything living in a [`crate::Module`]'s
//! arenas.
//!
//! Blocks, instructions, and values reference each other constantly and
//! often cyclically (a phi reads an instruction in a block that jumps back
//! to it); arena + id sidesteps that entirely, since every cross-reference
//! between analyses is an index lookup instead of a borrow.

use std::fmt;

macro_rules! entity_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

entity_id!(FuncId, "fn");
entity_id!(BlockId, "bb");
entity_id!(InstId, "v");
entity_id!(GlobalId, "g");
