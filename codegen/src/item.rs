//! Value descriptors.
//!
//! An `Item` describes where the value of an expression currently lives
//! during generation: folded into the instruction stream as a constant,
//! in memory relative to a base register, in a register, or dissolved
//! into the processor condition code with two pending jump chains. Items
//! are produced and consumed as parsing proceeds; none survive past the
//! statement that created them.

use std::rc::Rc;

use oberon0_dsl::types::Type;

use crate::emit::{Cond, Position, Reg};

/// Where an expression value lives, with the addressing data for that
/// location.
#[derive(Clone, Debug)]
pub enum ItemKind {
    /// A compile-time constant; no code has been emitted for it.
    Const { value: i32 },
    /// A variable in memory at `base` + `offset`.
    Var { base: Reg, offset: i32 },
    /// A reference parameter: the frame slot at `base` + `offset` holds
    /// the address of the value, so every access takes one extra
    /// indirection.
    RefParam { base: Reg, offset: i32 },
    /// A procedure; `entry` is its instruction position once the body has
    /// been generated.
    Proc { entry: Option<Position> },
    /// A value held in a register of the expression stack.
    Register { reg: Reg },
    /// A value in memory whose address was computed at runtime into
    /// `base`, plus a static `offset`.
    RegIndirect { base: Reg, offset: i32 },
    /// A boolean dissolved into the condition code. `false_chain` and
    /// `true_chain` are the heads of the pending jump chains that must be
    /// resolved to the false and true destinations (0 = empty chain).
    Condition {
        cond: Cond,
        false_chain: Position,
        true_chain: Position,
    },
}

/// A value descriptor: an addressing mode plus the type and the lexical
/// level of the declaration it came from.
#[derive(Clone, Debug)]
pub struct Item {
    pub kind: ItemKind,
    pub ty: Rc<Type>,
    pub level: i32,
}

impl Item {
    /// An item holding a compile-time constant.
    pub fn constant(ty: Rc<Type>, value: i32) -> Self {
        Self {
            kind: ItemKind::Const { value },
            ty,
            level: 0,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ItemKind::Const { .. })
    }

    /// The constant value, when the item is one.
    pub fn const_value(&self) -> Option<i32> {
        match self.kind {
            ItemKind::Const { value } => Some(value),
            _ => None,
        }
    }

    /// Replaces the type, keeping location and level. Used where the
    /// result type of an operation differs from its operand types.
    pub fn with_type(mut self, ty: Rc<Type>) -> Self {
        self.ty = ty;
        self
    }
}
