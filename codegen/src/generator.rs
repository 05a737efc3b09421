//! The code generator.
//!
//! The parser calls these operations as it recognizes language
//! constructs; no syntax tree is built. Expression values are tracked as
//! [`Item`]s, registers are allocated as a stack whose cursor must return
//! to zero at every statement boundary, and forward jumps are threaded
//! into chains through their own operand fields until their destination
//! becomes known.

use std::rc::Rc;

use log::{debug, trace};

use oberon0_dsl::diagnostic::{Diagnostic, Label};
use oberon0_dsl::problems::Problem;
use oberon0_dsl::scope::{DeclKind, Declaration, ParamMode};
use oberon0_dsl::types::{Field, Type, WORD_SIZE};

use crate::emit::{listing, AluOp, Cond, Emitter, Instruction, Position, Reg, GB, LNK, SP};
use crate::item::{Item, ItemKind};

/// Number of general purpose registers available to the expression
/// stack. R13 and above are dedicated.
pub const MAX_REGISTERS: u8 = 13;

/// A boolean connective handled by short-circuit jump code rather than
/// by an ALU instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// An operation routed through the shared operand-loading logic: either
/// a real ALU operation or a comparison, which sets the condition code
/// and has no destination register.
#[derive(Clone, Copy)]
enum PutOp {
    Alu(AluOp),
    Cmp,
}

impl PutOp {
    /// Operations where operand order matters. When the left operand is
    /// a constant it cannot be folded into the immediate field and must
    /// be loaded.
    fn non_commutative(self) -> bool {
        matches!(
            self,
            PutOp::Alu(AluOp::Sub) | PutOp::Alu(AluOp::Div) | PutOp::Alu(AluOp::Mod) | PutOp::Cmp
        )
    }
}

/// A boolean expression dissolved into condition code and jump chains,
/// unpacked from its item for the condition operations.
#[derive(Debug)]
struct CondParts {
    ty: Rc<Type>,
    level: i32,
    cond: Cond,
    false_chain: Position,
    true_chain: Position,
}

impl CondParts {
    fn into_item(self) -> Item {
        Item {
            kind: ItemKind::Condition {
                cond: self.cond,
                false_chain: self.false_chain,
                true_chain: self.true_chain,
            },
            ty: self.ty,
            level: self.level,
        }
    }
}

/// Generation state for one compilation unit.
pub struct Generator {
    emit: Emitter,
    /// Register stack cursor: R0..r-1 hold live intermediate values.
    r: u8,
    /// Lexical level of the procedure body being generated; 0 at module
    /// level.
    level: i32,
}

impl Generator {
    pub fn new() -> Self {
        Self {
            emit: Emitter::new(),
            r: 0,
            level: 0,
        }
    }

    /// Starts the compilation unit. The module label occupies position 0,
    /// which keeps every jump instruction at a nonzero position; position
    /// 0 can therefore serve as the empty-chain sentinel.
    pub fn open(&mut self, module_name: &str) {
        self.emit.label(module_name);
    }

    /// The position the next instruction will occupy.
    pub fn pc(&self) -> Position {
        self.emit.pc()
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Tracks entry to (+1) and exit from (-1) a procedure body.
    pub fn adjust_level(&mut self, delta: i32) {
        self.level += delta;
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.emit.instructions()
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.emit.into_instructions()
    }

    /// The emitted program as text, one instruction per line.
    pub fn listing(&self) -> String {
        listing(self.emit.instructions())
    }

    fn alloc_reg(&mut self) -> Result<Reg, Diagnostic> {
        if self.r >= MAX_REGISTERS {
            return Err(Diagnostic::problem(
                Problem::ExpressionTooComplex,
                Label::unpositioned("out of registers"),
            ));
        }
        let reg = Reg(self.r);
        self.r += 1;
        Ok(reg)
    }

    fn release(&mut self, count: u8) {
        self.r = self.r.saturating_sub(count);
    }

    fn bad_patch(position: Position) -> Diagnostic {
        Diagnostic::problem(
            Problem::BadJumpPatch,
            Label::unpositioned(format!("position {}", position)),
        )
    }

    /// Verifies that the statement just generated returned every register
    /// it used. On imbalance the cursor is reset so that generation can
    /// continue.
    pub fn check_registers(&mut self) -> Result<(), Diagnostic> {
        if self.r != 0 {
            let count = self.r;
            self.r = 0;
            return Err(Diagnostic::problem(
                Problem::RegisterImbalance,
                Label::unpositioned("after statement"),
            )
            .with_context("registers", &count.to_string()));
        }
        Ok(())
    }

    /// The base register for a declaration: module-level storage is
    /// addressed off GB, the current frame off SP. Declarations of an
    /// intermediate level cannot be addressed at all.
    fn base_register(&self, level: i32, name: &str) -> Result<Reg, Diagnostic> {
        if level == 0 {
            Ok(GB)
        } else if level == self.level {
            Ok(SP)
        } else {
            Err(Diagnostic::problem(
                Problem::LevelAccess,
                Label::unpositioned("level!"),
            )
            .with_context("identifier", name))
        }
    }

    /// Creates the item for a named declaration.
    pub fn make_item(&self, decl: &Declaration) -> Result<Item, Diagnostic> {
        let ty = decl.ty.clone();
        let level = decl.level;
        let kind = match &decl.kind {
            DeclKind::Const { value } => ItemKind::Const { value: *value },
            DeclKind::Var { offset } => ItemKind::Var {
                base: self.base_register(level, &decl.name)?,
                offset: *offset,
            },
            DeclKind::RefParam { offset } => ItemKind::RefParam {
                base: self.base_register(level, &decl.name)?,
                offset: *offset,
            },
            DeclKind::Procedure { entry, .. } => {
                self.base_register(level, &decl.name)?;
                ItemKind::Proc { entry: *entry }
            }
            DeclKind::TypeName => {
                return Err(Diagnostic::problem(
                    Problem::NotAValue,
                    Label::unpositioned("type used as value"),
                )
                .with_context("identifier", &decl.name))
            }
            DeclKind::Builtin { .. } => {
                return Err(Diagnostic::problem(
                    Problem::NotImplemented,
                    Label::unpositioned("builtin procedure"),
                )
                .with_context("identifier", &decl.name))
            }
        };
        Ok(Item { kind, ty, level })
    }

    /// Brings a value into a register, emitting whatever access code its
    /// current location requires. Condition items are materialized as 0
    /// or 1 through a three-instruction diamond.
    fn load_reg(&mut self, item: Item) -> Result<(Reg, Rc<Type>, i32), Diagnostic> {
        let ty = item.ty;
        let level = item.level;
        let reg = match item.kind {
            ItemKind::Register { reg } => reg,
            ItemKind::Const { value } => {
                let reg = self.alloc_reg()?;
                self.emit.mov_imm(reg, value);
                reg
            }
            ItemKind::Var { base, offset } => {
                let reg = self.alloc_reg()?;
                self.emit.load(reg, base, offset);
                reg
            }
            ItemKind::RefParam { base, offset } => {
                let reg = self.alloc_reg()?;
                self.emit.load(reg, base, offset);
                self.emit.load(reg, reg, 0);
                reg
            }
            ItemKind::RegIndirect { base, offset } => {
                // The address register is reused for the value.
                self.emit.load(base, base, offset);
                base
            }
            ItemKind::Condition {
                cond,
                false_chain,
                true_chain,
            } => {
                self.emit.branch(cond.negate(), 2);
                self.fix_chain(true_chain)?;
                let reg = self.alloc_reg()?;
                self.emit.mov_imm(reg, 1);
                self.emit.branch(Cond::Always, 1);
                self.fix_chain(false_chain)?;
                self.emit.mov_imm(reg, 0);
                reg
            }
            ItemKind::Proc { .. } => {
                return Err(Diagnostic::problem(
                    Problem::NotAValue,
                    Label::unpositioned("procedure used as value"),
                ))
            }
        };
        Ok((reg, ty, level))
    }

    /// [`Self::load_reg`], repacked as an item.
    pub fn load(&mut self, item: Item) -> Result<Item, Diagnostic> {
        let (reg, ty, level) = self.load_reg(item)?;
        Ok(Item {
            kind: ItemKind::Register { reg },
            ty,
            level,
        })
    }

    /// Computes the address of a designator into a register. Only items
    /// that designate memory have one.
    pub fn load_address(&mut self, item: Item) -> Result<Item, Diagnostic> {
        let ty = item.ty;
        let level = item.level;
        let reg = match item.kind {
            ItemKind::Var { base, offset } => {
                let reg = self.alloc_reg()?;
                self.emit.alu_imm(AluOp::Add, reg, base, offset);
                reg
            }
            ItemKind::RefParam { base, offset } => {
                // The frame slot already holds the address.
                let reg = self.alloc_reg()?;
                self.emit.load(reg, base, offset);
                reg
            }
            ItemKind::RegIndirect { base, offset } => {
                self.emit.alu_imm(AluOp::Add, base, base, offset);
                base
            }
            _ => {
                return Err(Diagnostic::problem(
                    Problem::AddressError,
                    Label::unpositioned("address error"),
                ))
            }
        };
        Ok(Item {
            kind: ItemKind::Register { reg },
            ty,
            level,
        })
    }

    /// Unpacks a boolean into condition code and jump chains, converting
    /// from other locations when needed. A constant becomes an
    /// `Always`/`Never` code with empty chains; anything else is loaded
    /// and compared against 0.
    fn cond_parts(&mut self, item: Item) -> Result<CondParts, Diagnostic> {
        if let ItemKind::Condition {
            cond,
            false_chain,
            true_chain,
        } = item.kind
        {
            return Ok(CondParts {
                ty: item.ty,
                level: item.level,
                cond,
                false_chain,
                true_chain,
            });
        }
        if !item.ty.is_bool() {
            return Err(Diagnostic::problem(
                Problem::NotBoolean,
                Label::unpositioned("bool?"),
            ));
        }
        if let ItemKind::Const { value } = item.kind {
            return Ok(CondParts {
                ty: item.ty,
                level: item.level,
                cond: if value != 0 { Cond::Always } else { Cond::Never },
                false_chain: 0,
                true_chain: 0,
            });
        }
        let (reg, ty, level) = self.load_reg(item)?;
        self.emit.cmp_imm(reg, 0);
        self.release(1);
        Ok(CondParts {
            ty,
            level,
            cond: Cond::NotEqual,
            false_chain: 0,
            true_chain: 0,
        })
    }

    /// Loads both operands as the instruction forms require and emits the
    /// operation. Immediate forms are used when one operand is constant,
    /// except that a constant left operand of a non-commutative operation
    /// must be loaded.
    fn put_operation(&mut self, op: PutOp, x: Item, y: Item) -> Result<Item, Diagnostic> {
        let ty = x.ty.clone();
        let level = x.level;
        if let ItemKind::Const { value } = x.kind {
            // y is not constant here; the caller folds const-const.
            let (y_reg, ..) = self.load_reg(y)?;
            if op.non_commutative() {
                let (x_reg, ..) = self.load_reg(x)?;
                self.release(1);
                self.emit_operation(op, Reg(self.r - 1), x_reg, y_reg);
            } else {
                self.emit_operation_imm(op, Reg(self.r - 1), y_reg, value);
            }
        } else {
            let (x_reg, ..) = self.load_reg(x)?;
            if let ItemKind::Const { value } = y.kind {
                self.emit_operation_imm(op, Reg(self.r - 1), x_reg, value);
            } else {
                let (y_reg, ..) = self.load_reg(y)?;
                self.emit_operation(op, Reg(self.r - 2), x_reg, y_reg);
                self.release(1);
            }
        }
        Ok(Item {
            kind: ItemKind::Register {
                reg: Reg(self.r - 1),
            },
            ty,
            level,
        })
    }

    fn emit_operation(&mut self, op: PutOp, dest: Reg, lhs: Reg, rhs: Reg) {
        match op {
            PutOp::Alu(op) => self.emit.alu(op, dest, lhs, rhs),
            PutOp::Cmp => self.emit.cmp(lhs, rhs),
        }
    }

    fn emit_operation_imm(&mut self, op: PutOp, dest: Reg, lhs: Reg, value: i32) {
        match op {
            PutOp::Alu(op) => self.emit.alu_imm(op, dest, lhs, value),
            PutOp::Cmp => self.emit.cmp_imm(lhs, value),
        }
    }

    /// An integer binary operation: folded when both operands are
    /// constant, otherwise emitted. Folding uses wrapping arithmetic, the
    /// same results the emitted code would compute.
    pub fn int_op(&mut self, op: AluOp, x: Item, y: Item) -> Result<Item, Diagnostic> {
        if let (Some(a), Some(b)) = (x.const_value(), y.const_value()) {
            if matches!(op, AluOp::Div | AluOp::Mod) && b == 0 {
                return Err(Diagnostic::problem(
                    Problem::DivisionByZero,
                    Label::unpositioned("constant divisor"),
                ));
            }
            let value = match op {
                AluOp::Add => a.wrapping_add(b),
                AluOp::Sub => a.wrapping_sub(b),
                AluOp::Mul => a.wrapping_mul(b),
                AluOp::Div => a.wrapping_div(b),
                AluOp::Mod => a.wrapping_rem(b),
                AluOp::And => a & b,
                AluOp::Or => a | b,
                AluOp::Xor => a ^ b,
                AluOp::Lsh => a.wrapping_shl(b as u32),
                AluOp::Rsh => a.wrapping_shr(b as u32),
            };
            return Ok(Item {
                kind: ItemKind::Const { value },
                ty: x.ty,
                level: x.level,
            });
        }
        self.put_operation(PutOp::Alu(op), x, y)
    }

    /// Unary minus: two's complement negation.
    pub fn negate(&mut self, x: Item) -> Result<Item, Diagnostic> {
        if let ItemKind::Const { value } = x.kind {
            return Ok(Item {
                kind: ItemKind::Const {
                    value: value.wrapping_neg(),
                },
                ty: x.ty,
                level: x.level,
            });
        }
        let (reg, ty, level) = self.load_reg(x)?;
        self.emit.alu_imm(AluOp::Xor, reg, reg, -1);
        self.emit.alu_imm(AluOp::Add, reg, reg, 1);
        Ok(Item {
            kind: ItemKind::Register { reg },
            ty,
            level,
        })
    }

    /// Boolean negation: inverts the condition and swaps the chains.
    pub fn not(&mut self, x: Item) -> Result<Item, Diagnostic> {
        let parts = self.cond_parts(x)?;
        Ok(CondParts {
            cond: parts.cond.negate(),
            false_chain: parts.true_chain,
            true_chain: parts.false_chain,
            ..parts
        }
        .into_item())
    }

    /// A comparison. Constant operands are decided here; otherwise a
    /// compare instruction is emitted and the outcome lives in the
    /// condition code. The caller gives the result its boolean type.
    pub fn relation(&mut self, cond: Cond, x: Item, y: Item) -> Result<Item, Diagnostic> {
        if let (Some(a), Some(b)) = (x.const_value(), y.const_value()) {
            let holds = match cond {
                Cond::Equal => a == b,
                Cond::NotEqual => a != b,
                Cond::Less => a < b,
                Cond::LessEqual => a <= b,
                Cond::Greater => a > b,
                Cond::GreaterEqual => a >= b,
                Cond::Always => true,
                Cond::Never => false,
            };
            return Ok(Item {
                kind: ItemKind::Condition {
                    cond: if holds { Cond::Always } else { Cond::Never },
                    false_chain: 0,
                    true_chain: 0,
                },
                ty: x.ty,
                level: x.level,
            });
        }
        let x = self.put_operation(PutOp::Cmp, x, y)?;
        self.release(1);
        Ok(Item {
            kind: ItemKind::Condition {
                cond,
                false_chain: 0,
                true_chain: 0,
            },
            ty: x.ty,
            level: x.level,
        })
    }

    /// Called after the left operand of `&` or `or`, before the right
    /// operand is parsed: emits the short-circuit jump and threads it
    /// onto the matching chain. A condition already known at compile time
    /// emits nothing and keeps its chains unchanged.
    pub fn short_circuit_left(&mut self, op: BoolOp, x: Item) -> Result<Item, Diagnostic> {
        let parts = self.cond_parts(x)?;
        match op {
            BoolOp::And => {
                let false_chain = match self
                    .emit
                    .branch_pending(parts.cond.negate(), parts.false_chain)
                {
                    Some(position) => position,
                    None => parts.false_chain,
                };
                self.fix_chain(parts.true_chain)?;
                Ok(CondParts {
                    false_chain,
                    true_chain: 0,
                    ..parts
                }
                .into_item())
            }
            BoolOp::Or => {
                let true_chain = match self.emit.branch_pending(parts.cond, parts.true_chain) {
                    Some(position) => position,
                    None => parts.true_chain,
                };
                self.fix_chain(parts.false_chain)?;
                Ok(CondParts {
                    false_chain: 0,
                    true_chain,
                    ..parts
                }
                .into_item())
            }
        }
    }

    /// Called after the right operand of `&` or `or`: combines the two
    /// conditions by merging the chain that survives the connective.
    pub fn short_circuit_right(&mut self, op: BoolOp, x: Item, y: Item) -> Result<Item, Diagnostic> {
        let x = self.cond_parts(x)?;
        let y = self.cond_parts(y)?;
        match op {
            BoolOp::And => {
                let false_chain = self.merge_chains(y.false_chain, x.false_chain)?;
                Ok(CondParts {
                    cond: y.cond,
                    false_chain,
                    true_chain: y.true_chain,
                    ..x
                }
                .into_item())
            }
            BoolOp::Or => {
                let true_chain = self.merge_chains(y.true_chain, x.true_chain)?;
                Ok(CondParts {
                    cond: y.cond,
                    false_chain: y.false_chain,
                    true_chain,
                    ..x
                }
                .into_item())
            }
        }
    }

    /// Splices chain `b` onto the tail of chain `a`, returning the head
    /// of the combined chain.
    fn merge_chains(&mut self, a: Position, b: Position) -> Result<Position, Diagnostic> {
        if a == 0 {
            return Ok(b);
        }
        let mut tail = a;
        loop {
            match self.emit.jump_link(tail) {
                Some(0) => break,
                Some(next) => tail = next,
                None => return Err(Self::bad_patch(tail)),
            }
        }
        if !self.emit.patch_link(tail, b) {
            return Err(Self::bad_patch(tail));
        }
        Ok(a)
    }

    /// Resolves every jump in a chain to the current position.
    pub fn fix_chain(&mut self, chain: Position) -> Result<(), Diagnostic> {
        let target = self.emit.pc();
        self.fix_chain_to(chain, target)
    }

    /// Resolves every jump in a chain to `target`.
    pub fn fix_chain_to(&mut self, chain: Position, target: Position) -> Result<(), Diagnostic> {
        let mut position = chain;
        while position != 0 {
            trace!("fixing jump at {} to {}", position, target);
            let next = match self.emit.jump_link(position) {
                Some(next) => next,
                None => return Err(Self::bad_patch(position)),
            };
            let displacement = target as i32 - position as i32 - 1;
            if !self.emit.patch_jump(position, displacement) {
                return Err(Self::bad_patch(position));
            }
            position = next;
        }
        Ok(())
    }

    /// A conditional exit jump at the head of an `if`/`while` body: jumps
    /// forward, destination unknown, when the condition is false. The
    /// returned item's false chain includes the new jump; its true chain
    /// has been resolved to the instruction that follows.
    pub fn cond_forward_jump(&mut self, x: Item) -> Result<Item, Diagnostic> {
        let parts = self.cond_parts(x)?;
        let false_chain = match self
            .emit
            .branch_pending(parts.cond.negate(), parts.false_chain)
        {
            Some(position) => position,
            None => parts.false_chain,
        };
        self.fix_chain(parts.true_chain)?;
        Ok(CondParts {
            false_chain,
            true_chain: 0,
            ..parts
        }
        .into_item())
    }

    /// The backward jump of `repeat`/`until`: jumps to `target` when the
    /// condition is false. Both chains are resolved here, the false chain
    /// to the loop head and the true chain to the loop exit.
    pub fn cond_backward_jump(&mut self, x: Item, target: Position) -> Result<(), Diagnostic> {
        let parts = self.cond_parts(x)?;
        let displacement = target as i32 - self.emit.pc() as i32 - 1;
        self.emit.branch(parts.cond.negate(), displacement);
        self.fix_chain_to(parts.false_chain, target)?;
        self.fix_chain(parts.true_chain)
    }

    /// An unconditional jump with unknown destination, threaded onto
    /// `chain`. Returns the head of the extended chain.
    pub fn forward_jump(&mut self, chain: Position) -> Position {
        match self.emit.branch_pending(Cond::Always, chain) {
            Some(position) => position,
            None => chain,
        }
    }

    /// An unconditional jump back to a known position.
    pub fn backward_jump(&mut self, target: Position) {
        let displacement = target as i32 - self.emit.pc() as i32 - 1;
        self.emit.branch(Cond::Always, displacement);
    }

    /// Record field selection. Access code is only needed for reference
    /// parameters, whose slot must be dereferenced first.
    pub fn field(&mut self, x: Item, field: &Field) -> Result<Item, Diagnostic> {
        let level = x.level;
        let kind = match x.kind {
            ItemKind::Var { base, offset } => ItemKind::Var {
                base,
                offset: offset + field.offset,
            },
            ItemKind::RegIndirect { base, offset } => ItemKind::RegIndirect {
                base,
                offset: offset + field.offset,
            },
            ItemKind::RefParam { base, offset } => {
                let reg = self.alloc_reg()?;
                self.emit.load(reg, base, offset);
                ItemKind::RegIndirect {
                    base: reg,
                    offset: field.offset,
                }
            }
            _ => {
                return Err(Diagnostic::problem(
                    Problem::NotARecord,
                    Label::unpositioned("record expected"),
                ))
            }
        };
        Ok(Item {
            kind,
            ty: field.ty.clone(),
            level,
        })
    }

    /// Array indexing. A constant index is range checked and folded into
    /// the offset; a computed index is scaled by the element size and
    /// added to the base address at runtime.
    pub fn index(&mut self, x: Item, index: Item) -> Result<Item, Diagnostic> {
        let (length, element) = match x.ty.as_ref() {
            Type::Array(array) => (array.length, array.element.clone()),
            _ => {
                return Err(Diagnostic::problem(
                    Problem::NotAnArray,
                    Label::unpositioned("array expected"),
                ))
            }
        };
        let element_size = element.size();
        let level = x.level;
        if let ItemKind::Const { value } = index.kind {
            if value < 0 || value >= length {
                return Err(Diagnostic::problem(
                    Problem::IndexOutOfRange,
                    Label::unpositioned("bad index"),
                )
                .with_context("index", &value.to_string()));
            }
            let kind = match x.kind {
                ItemKind::Var { base, offset } => ItemKind::Var {
                    base,
                    offset: offset + value * element_size,
                },
                ItemKind::RegIndirect { base, offset } => ItemKind::RegIndirect {
                    base,
                    offset: offset + value * element_size,
                },
                ItemKind::RefParam { base, offset } => {
                    let reg = self.alloc_reg()?;
                    self.emit.load(reg, base, offset);
                    ItemKind::RegIndirect {
                        base: reg,
                        offset: value * element_size,
                    }
                }
                _ => {
                    return Err(Diagnostic::problem(
                        Problem::NotAnArray,
                        Label::unpositioned("array expected"),
                    ))
                }
            };
            return Ok(Item {
                kind,
                ty: element,
                level,
            });
        }
        let (index_reg, ..) = self.load_reg(index)?;
        self.emit.alu_imm(AluOp::Mul, index_reg, index_reg, element_size);
        let kind = match x.kind {
            ItemKind::Var { base, offset } => {
                self.emit.alu(AluOp::Add, index_reg, base, index_reg);
                ItemKind::RegIndirect {
                    base: index_reg,
                    offset,
                }
            }
            ItemKind::RefParam { base, offset } => {
                let reg = self.alloc_reg()?;
                self.emit.load(reg, base, offset);
                self.emit.alu(AluOp::Add, index_reg, index_reg, reg);
                self.release(1);
                ItemKind::RegIndirect {
                    base: index_reg,
                    offset: 0,
                }
            }
            ItemKind::RegIndirect { base, offset } => {
                self.emit.alu(AluOp::Add, base, base, index_reg);
                self.release(1);
                ItemKind::RegIndirect { base, offset }
            }
            _ => {
                self.release(1);
                return Err(Diagnostic::problem(
                    Problem::NotAnArray,
                    Label::unpositioned("array expected"),
                ));
            }
        };
        Ok(Item {
            kind,
            ty: element,
            level,
        })
    }

    /// The assignment `x := y`.
    pub fn store(&mut self, x: Item, y: Item) -> Result<(), Diagnostic> {
        let (y_reg, ..) = self.load_reg(y)?;
        match x.kind {
            ItemKind::Var { base, offset } => {
                self.emit.store(y_reg, base, offset);
                self.release(1);
            }
            ItemKind::RefParam { base, offset } => {
                let address = self.alloc_reg()?;
                self.emit.load(address, base, offset);
                self.emit.store(y_reg, address, 0);
                self.release(2);
            }
            ItemKind::RegIndirect { base, offset } => {
                self.emit.store(y_reg, base, offset);
                self.release(2);
            }
            _ => {
                self.release(1);
                return Err(Diagnostic::problem(
                    Problem::IllegalAssignment,
                    Label::unpositioned("illegal assignment"),
                ));
            }
        }
        Ok(())
    }

    /// Prepares one actual argument: a reference parameter receives the
    /// address of the designator, a value parameter the value.
    pub fn parameter(&mut self, x: Item, mode: ParamMode) -> Result<Item, Diagnostic> {
        match mode {
            ParamMode::Reference => self.load_address(x),
            ParamMode::Value => self.load(x),
        }
    }

    /// Procedure prologue: label, frame allocation, saved link, and the
    /// spill of register-passed arguments into their frame slots.
    pub fn enter(&mut self, name: &str, param_block_size: i32, local_block_size: i32) {
        debug!(
            "procedure {}: parameter block {} bytes, frame {} bytes",
            name, param_block_size, local_block_size
        );
        self.emit.label(name);
        self.emit.alu_imm(AluOp::Sub, SP, SP, local_block_size);
        self.emit.store(LNK, SP, 0);
        let mut offset = WORD_SIZE;
        let mut reg = 0u8;
        while offset < param_block_size {
            self.emit.store(Reg(reg), SP, offset);
            reg += 1;
            offset += WORD_SIZE;
        }
    }

    /// Procedure epilogue: restore the link, pop the frame, jump back.
    pub fn ret(&mut self, frame_size: i32) {
        self.emit.load(LNK, SP, 0);
        self.emit.alu_imm(AluOp::Add, SP, SP, frame_size);
        self.emit.jump_reg(LNK);
    }

    /// A procedure call. Arguments are already in R0 upward; the call
    /// consumes them, so the register stack is empty afterwards.
    pub fn call(&mut self, x: Item) -> Result<(), Diagnostic> {
        self.r = 0;
        match x.kind {
            ItemKind::Proc { entry: Some(entry) } => {
                self.emit.mov_imm(LNK, (self.emit.pc() + 1) as i32);
                let displacement = entry as i32 - self.emit.pc() as i32 - 1;
                self.emit.branch(Cond::Always, displacement);
                Ok(())
            }
            ItemKind::Proc { entry: None } => Err(Diagnostic::problem(
                Problem::ForwardCall,
                Label::unpositioned("body not yet compiled"),
            )),
            _ => Err(Diagnostic::problem(
                Problem::NotAValue,
                Label::unpositioned("not a procedure"),
            )),
        }
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Rc<Type> {
        Rc::new(Type::Int)
    }

    fn boolean() -> Rc<Type> {
        Rc::new(Type::Bool)
    }

    fn global_int(offset: i32) -> Item {
        Item {
            kind: ItemKind::Var { base: GB, offset },
            ty: int(),
            level: 0,
        }
    }

    fn text(generator: &Generator) -> Vec<String> {
        generator
            .instructions()
            .iter()
            .map(|i| format!("{}", i))
            .collect()
    }

    #[test]
    fn generator_when_const_operands_then_folded() {
        let mut generator = Generator::new();
        // 1 + 2 * 3
        let product = generator
            .int_op(AluOp::Mul, Item::constant(int(), 2), Item::constant(int(), 3))
            .unwrap();
        let sum = generator
            .int_op(AluOp::Add, Item::constant(int(), 1), product)
            .unwrap();

        assert_eq!(sum.const_value(), Some(7));
        assert_eq!(generator.pc(), 0);
    }

    #[test]
    fn generator_when_const_division_by_zero_then_err() {
        let mut generator = Generator::new();
        let result = generator.int_op(
            AluOp::Div,
            Item::constant(int(), 1),
            Item::constant(int(), 0),
        );
        assert_eq!(result.unwrap_err().problem, Problem::DivisionByZero);
    }

    #[test]
    fn generator_when_store_const_then_registers_balanced() {
        let mut generator = Generator::new();
        generator.open("M");
        generator
            .store(global_int(0), Item::constant(int(), 7))
            .unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(text(&generator), vec!["M:", "R0 := 7", "mem[GB + 0] := R0"]);
    }

    #[test]
    fn generator_when_var_plus_const_then_immediate_form() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .int_op(AluOp::Add, global_int(4), Item::constant(int(), 1))
            .unwrap();
        generator.store(global_int(4), x).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 4]",
                "R0 := R0 + 1",
                "mem[GB + 4] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_const_minus_var_then_const_is_loaded() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .int_op(AluOp::Sub, Item::constant(int(), 10), global_int(0))
            .unwrap();
        generator.store(global_int(4), x).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 0]",
                "R1 := 10",
                "R0 := R1 - R0",
                "mem[GB + 4] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_var_plus_var_then_register_form() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .int_op(AluOp::Add, global_int(0), global_int(4))
            .unwrap();
        generator.store(global_int(8), x).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 0]",
                "R1 := mem[GB + 4]",
                "R0 := R0 + R1",
                "mem[GB + 8] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_negate_variable_then_complement_and_add() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator.negate(global_int(0)).unwrap();
        generator.store(global_int(0), x).unwrap();

        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 0]",
                "R0 := R0 xor -1",
                "R0 := R0 + 1",
                "mem[GB + 0] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_negate_const_then_folded() {
        let mut generator = Generator::new();
        let x = generator.negate(Item::constant(int(), 5)).unwrap();
        assert_eq!(x.const_value(), Some(-5));
        assert_eq!(generator.pc(), 0);
    }

    #[test]
    fn generator_when_relation_then_condition_with_empty_chains() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .relation(Cond::Less, global_int(0), Item::constant(int(), 10))
            .unwrap();

        assert!(generator.check_registers().is_ok());
        match x.kind {
            ItemKind::Condition {
                cond,
                false_chain,
                true_chain,
            } => {
                assert_eq!(cond, Cond::Less);
                assert_eq!(false_chain, 0);
                assert_eq!(true_chain, 0);
            }
            other => panic!("expected condition, got {:?}", other),
        }
        assert_eq!(text(&generator), vec!["M:", "R0 := mem[GB + 0]", "cmp R0, 10"]);
    }

    #[test]
    fn generator_when_const_relation_then_decided() {
        let mut generator = Generator::new();
        let x = generator
            .relation(Cond::Less, Item::constant(int(), 1), Item::constant(int(), 2))
            .unwrap();
        match x.kind {
            ItemKind::Condition { cond, .. } => assert_eq!(cond, Cond::Always),
            other => panic!("expected condition, got {:?}", other),
        }
        assert_eq!(generator.pc(), 0);
    }

    #[test]
    fn generator_when_cond_forward_jump_then_pending_chain() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .relation(Cond::Equal, global_int(0), Item::constant(int(), 0))
            .unwrap();
        let x = generator.cond_forward_jump(x).unwrap();

        // The false-branch jump sits at position 3 and ends its chain.
        match x.kind {
            ItemKind::Condition { false_chain, .. } => assert_eq!(false_chain, 3),
            other => panic!("expected condition, got {:?}", other),
        }
        assert_eq!(text(&generator)[3], "jne   0");
    }

    #[test]
    fn generator_when_chain_fixed_then_relative_displacements() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .relation(Cond::Equal, global_int(0), Item::constant(int(), 0))
            .unwrap();
        let x = generator.cond_forward_jump(x).unwrap();
        generator
            .store(global_int(4), Item::constant(int(), 1))
            .unwrap();
        match x.kind {
            ItemKind::Condition { false_chain, .. } => {
                generator.fix_chain(false_chain).unwrap()
            }
            other => panic!("expected condition, got {:?}", other),
        }

        // jne at 3, chain target 6: displacement 6 - 3 - 1 = 2.
        assert_eq!(text(&generator)[3], "jne   2");
    }

    #[test]
    fn generator_when_merge_chains_then_spliced_through_tail() {
        let mut generator = Generator::new();
        generator.open("M");
        let a1 = generator.forward_jump(0);
        let a2 = generator.forward_jump(a1);
        let b = generator.forward_jump(0);
        let merged = generator.merge_chains(a2, b).unwrap();

        assert_eq!(merged, a2);
        // Walking the merged chain reaches every member: a2 -> a1 -> b.
        assert_eq!(generator.emit.jump_link(a2), Some(a1));
        assert_eq!(generator.emit.jump_link(a1), Some(b));
        assert_eq!(generator.emit.jump_link(b), Some(0));
    }

    #[test]
    fn generator_when_merge_with_empty_left_then_right() {
        let mut generator = Generator::new();
        generator.open("M");
        let b = generator.forward_jump(0);
        assert_eq!(generator.merge_chains(0, b).unwrap(), b);
    }

    #[test]
    fn generator_when_condition_materialized_then_diamond() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = generator
            .relation(Cond::Less, global_int(0), Item::constant(int(), 10))
            .unwrap();
        let x = generator.load(x).unwrap();
        generator.store(global_int(4), x).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 0]",
                "cmp R0, 10",
                "jge   2",
                "R0 := 1",
                "jmp   1",
                "R0 := 0",
                "mem[GB + 4] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_const_true_condition_loaded_then_no_branch() {
        let mut generator = Generator::new();
        generator.open("M");
        let x = Item::constant(boolean(), 1);
        let parts = generator.cond_parts(x).unwrap();
        let x = generator.load(parts.into_item()).unwrap();
        generator.store(global_int(0), x).unwrap();

        // Never-condition branch disappears; jmp 1 skips the 0 arm.
        assert_eq!(
            text(&generator),
            vec!["M:", "R0 := 1", "jmp   1", "R0 := 0", "mem[GB + 0] := R0"]
        );
    }

    #[test]
    fn generator_when_non_boolean_condition_then_err() {
        let mut generator = Generator::new();
        let result = generator.cond_parts(Item::constant(int(), 1));
        assert_eq!(result.unwrap_err().problem, Problem::NotBoolean);
    }

    #[test]
    fn generator_when_enter_and_return_then_linkage() {
        let mut generator = Generator::new();
        generator.open("M");
        // One value parameter (4 byte slot after the saved link).
        generator.enter("P", 8, 8);
        generator.ret(8);

        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "P:",
                "SP := SP - 8",
                "mem[SP + 0] := LNK",
                "mem[SP + 4] := R0",
                "LNK := mem[SP + 0]",
                "SP := SP + 8",
                "jmp LNK",
            ]
        );
    }

    #[test]
    fn generator_when_call_then_link_and_relative_jump() {
        let mut generator = Generator::new();
        generator.open("M");
        generator.enter("P", 4, 4);
        generator.ret(4);
        let entry = 1;
        generator
            .call(Item {
                kind: ItemKind::Proc { entry: Some(entry) },
                ty: int(),
                level: 0,
            })
            .unwrap();

        // mov at 7, jump at 8: displacement 1 - 8 - 1 = -8.
        assert_eq!(text(&generator)[7], "LNK := 8");
        assert_eq!(text(&generator)[8], "jmp  -8");
        assert!(generator.check_registers().is_ok());
    }

    #[test]
    fn generator_when_forward_call_then_err() {
        let mut generator = Generator::new();
        let result = generator.call(Item {
            kind: ItemKind::Proc { entry: None },
            ty: int(),
            level: 0,
        });
        assert_eq!(result.unwrap_err().problem, Problem::ForwardCall);
    }

    #[test]
    fn generator_when_registers_leak_then_imbalance_and_reset() {
        let mut generator = Generator::new();
        generator.open("M");
        generator.load(Item::constant(int(), 1)).unwrap();

        let result = generator.check_registers();
        assert_eq!(result.unwrap_err().problem, Problem::RegisterImbalance);
        // The cursor was reset so later statements start clean.
        assert!(generator.check_registers().is_ok());
    }

    #[test]
    fn generator_when_all_registers_taken_then_too_complex() {
        let mut generator = Generator::new();
        generator.open("M");
        for _ in 0..MAX_REGISTERS {
            generator.load(Item::constant(int(), 0)).unwrap();
        }
        let result = generator.load(Item::constant(int(), 0));
        assert_eq!(result.unwrap_err().problem, Problem::ExpressionTooComplex);
    }

    #[test]
    fn generator_when_level_mismatch_then_err() {
        let mut generator = Generator::new();
        generator.adjust_level(2);
        let decl = Declaration {
            name: "x".to_owned(),
            kind: DeclKind::Var { offset: 4 },
            ty: int(),
            level: 1,
            is_param: false,
        };
        let result = generator.make_item(&decl);
        assert_eq!(result.unwrap_err().problem, Problem::LevelAccess);
    }

    #[test]
    fn generator_when_module_level_var_then_gb_base() {
        let mut generator = Generator::new();
        generator.adjust_level(1);
        let decl = Declaration {
            name: "x".to_owned(),
            kind: DeclKind::Var { offset: 8 },
            ty: int(),
            level: 0,
            is_param: false,
        };
        match generator.make_item(&decl).unwrap().kind {
            ItemKind::Var { base, offset } => {
                assert_eq!(base, GB);
                assert_eq!(offset, 8);
            }
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn generator_when_const_index_then_folded_offset() {
        let mut generator = Generator::new();
        let array = Item {
            kind: ItemKind::Var { base: GB, offset: 8 },
            ty: Rc::new(Type::array(10, int())),
            level: 0,
        };
        let x = generator.index(array, Item::constant(int(), 3)).unwrap();
        match x.kind {
            ItemKind::Var { base, offset } => {
                assert_eq!(base, GB);
                assert_eq!(offset, 20);
            }
            other => panic!("expected var, got {:?}", other),
        }
        assert_eq!(generator.pc(), 0);
    }

    #[test]
    fn generator_when_const_index_out_of_range_then_err() {
        let mut generator = Generator::new();
        let array = Item {
            kind: ItemKind::Var { base: GB, offset: 0 },
            ty: Rc::new(Type::array(10, int())),
            level: 0,
        };
        let result = generator.index(array, Item::constant(int(), 10));
        assert_eq!(result.unwrap_err().problem, Problem::IndexOutOfRange);
    }

    #[test]
    fn generator_when_dynamic_index_then_scaled_and_added() {
        let mut generator = Generator::new();
        generator.open("M");
        let array = Item {
            kind: ItemKind::Var { base: GB, offset: 8 },
            ty: Rc::new(Type::array(10, int())),
            level: 0,
        };
        let x = generator.index(array, global_int(0)).unwrap();
        let x = generator.load(x).unwrap();
        generator.store(global_int(4), x).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[GB + 0]",
                "R0 := R0 * 4",
                "R0 := GB + R0",
                "R0 := mem[R0 + 8]",
                "mem[GB + 4] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_record_field_then_offset_added() {
        let mut generator = Generator::new();
        let record_ty = Rc::new(Type::record(vec![
            ("a".to_owned(), int()),
            ("b".to_owned(), int()),
        ]));
        let record = Item {
            kind: ItemKind::Var { base: GB, offset: 16 },
            ty: record_ty.clone(),
            level: 0,
        };
        let field = match record_ty.find_field("b") {
            Some(field) => field,
            None => panic!("field b missing"),
        };
        let x = generator.field(record, field).unwrap();
        match x.kind {
            ItemKind::Var { base, offset } => {
                assert_eq!(base, GB);
                assert_eq!(offset, 20);
            }
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn generator_when_ref_param_stored_then_indirect_store() {
        let mut generator = Generator::new();
        generator.open("M");
        generator.adjust_level(1);
        let param = Item {
            kind: ItemKind::RefParam { base: SP, offset: 4 },
            ty: int(),
            level: 1,
        };
        generator.store(param, Item::constant(int(), 9)).unwrap();

        assert!(generator.check_registers().is_ok());
        assert_eq!(
            text(&generator),
            vec!["M:", "R0 := 9", "R1 := mem[SP + 4]", "mem[R1 + 0] := R0"]
        );
    }

    #[test]
    fn generator_when_ref_param_loaded_then_double_indirection() {
        let mut generator = Generator::new();
        generator.open("M");
        generator.adjust_level(1);
        let param = Item {
            kind: ItemKind::RefParam { base: SP, offset: 4 },
            ty: int(),
            level: 1,
        };
        let x = generator.load(param).unwrap();
        generator.store(global_int(0), x).unwrap();

        assert_eq!(
            text(&generator),
            vec![
                "M:",
                "R0 := mem[SP + 4]",
                "R0 := mem[R0 + 0]",
                "mem[GB + 0] := R0",
            ]
        );
    }

    #[test]
    fn generator_when_short_circuit_and_then_chains_threaded() {
        let mut generator = Generator::new();
        generator.open("M");
        // x < 10 & x > 0
        let left = generator
            .relation(Cond::Less, global_int(0), Item::constant(int(), 10))
            .unwrap();
        let left = generator.short_circuit_left(BoolOp::And, left).unwrap();
        let right = generator
            .relation(Cond::Greater, global_int(0), Item::constant(int(), 0))
            .unwrap();
        let x = generator
            .short_circuit_right(BoolOp::And, left, right)
            .unwrap();

        // The left short-circuit jump at 3 joins the false chain.
        match x.kind {
            ItemKind::Condition {
                cond,
                false_chain,
                true_chain,
            } => {
                assert_eq!(cond, Cond::Greater);
                assert_eq!(false_chain, 3);
                assert_eq!(true_chain, 0);
            }
            other => panic!("expected condition, got {:?}", other),
        }
        assert_eq!(text(&generator)[3], "jge   0");
        assert!(generator.check_registers().is_ok());
    }
}
