//! Low-level abstract machine emitter.
//!
//! Appends fixed-form textual instructions to an append-only buffer and
//! exposes the position-based jump primitives that the generator uses
//! for backpatching. Instructions never move once emitted; the only
//! permitted mutation is rewriting a jump instruction's target operand.
//!
//! A jump operand is an explicit two-state field: while the jump's final
//! destination is unknown the operand is `Pending(link)`, where `link`
//! is the position of the previous unresolved jump of the same logical
//! chain (0 = end of chain). Once the destination is known the operand
//! becomes `Resolved(displacement)`, a relative displacement from the
//! instruction that follows the jump.

use core::fmt;

/// The address of an instruction in the emitted stream.
pub type Position = usize;

/// A machine register. R0 through R12 are general purpose; the three
/// top registers are dedicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg(pub u8);

/// Global base register: addresses module-level storage.
pub const GB: Reg = Reg(13);
/// Stack pointer: addresses the current procedure frame.
pub const SP: Reg = Reg(14);
/// Link register: holds the return address during a call.
pub const LNK: Reg = Reg(15);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            13 => write!(f, "GB"),
            14 => write!(f, "SP"),
            15 => write!(f, "LNK"),
            n => write!(f, "R{}", n),
        }
    }
}

/// Register-register and register-immediate ALU operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    And,
    Or,
    Xor,
    Lsh,
    Rsh,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Lsh => "<<",
            AluOp::Rsh => ">>",
            AluOp::Add => "+",
            AluOp::Sub => "-",
            AluOp::Mul => "*",
            AluOp::Div => "/",
            AluOp::Mod => "%",
        };
        write!(f, "{}", symbol)
    }
}

/// An abstract machine comparison outcome, used to select which
/// conditional jump to emit. `Always` and `Never` are the compile-time
/// known outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Always,
    Never,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Cond {
    /// The condition that holds exactly when `self` does not.
    pub fn negate(self) -> Cond {
        match self {
            Cond::Always => Cond::Never,
            Cond::Never => Cond::Always,
            Cond::Equal => Cond::NotEqual,
            Cond::NotEqual => Cond::Equal,
            Cond::Less => Cond::GreaterEqual,
            Cond::LessEqual => Cond::Greater,
            Cond::Greater => Cond::LessEqual,
            Cond::GreaterEqual => Cond::Less,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Cond::Always => "jmp",
            Cond::Never => "nop",
            Cond::Equal => "je",
            Cond::NotEqual => "jne",
            Cond::Less => "jl",
            Cond::LessEqual => "jle",
            Cond::Greater => "jg",
            Cond::GreaterEqual => "jge",
        }
    }
}

/// The operand of a jump instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JumpTarget {
    /// Not yet resolved; holds the position of the previous unresolved
    /// jump of the same chain (0 = end of chain).
    Pending(Position),
    /// Resolved to a relative displacement from the next instruction.
    Resolved(i32),
}

/// One emitted instruction. The `Display` rendering is the output
/// format of the compiler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// A note line; occupies a position but performs nothing.
    Label(String),
    Move { dest: Reg, src: Reg },
    MoveImm { dest: Reg, value: i32 },
    Alu { op: AluOp, dest: Reg, lhs: Reg, rhs: Reg },
    AluImm { op: AluOp, dest: Reg, lhs: Reg, value: i32 },
    Compare { lhs: Reg, rhs: Reg },
    CompareImm { lhs: Reg, value: i32 },
    Load { dest: Reg, base: Reg, offset: i32 },
    Store { src: Reg, base: Reg, offset: i32 },
    Branch { cond: Cond, target: JumpTarget },
    /// An indirect jump through a register (procedure return and call
    /// linkage).
    BranchReg { reg: Reg },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(name) => write!(f, "{}:", name),
            Instruction::Move { dest, src } => write!(f, "{} := {}", dest, src),
            Instruction::MoveImm { dest, value } => write!(f, "{} := {}", dest, value),
            Instruction::Alu { op, dest, lhs, rhs } => {
                write!(f, "{} := {} {} {}", dest, lhs, op, rhs)
            }
            Instruction::AluImm {
                op,
                dest,
                lhs,
                value,
            } => write!(f, "{} := {} {} {}", dest, lhs, op, value),
            Instruction::Compare { lhs, rhs } => write!(f, "cmp {}, {}", lhs, rhs),
            Instruction::CompareImm { lhs, value } => write!(f, "cmp {}, {}", lhs, value),
            Instruction::Load { dest, base, offset } => {
                write!(f, "{} := mem[{} + {}]", dest, base, offset)
            }
            Instruction::Store { src, base, offset } => {
                write!(f, "mem[{} + {}] := {}", base, offset, src)
            }
            Instruction::Branch { cond, target } => {
                let operand = match target {
                    JumpTarget::Pending(link) => *link as i32,
                    JumpTarget::Resolved(displacement) => *displacement,
                };
                write!(f, "{:<3} {:>3}", cond.mnemonic(), operand)
            }
            Instruction::BranchReg { reg } => write!(f, "jmp {}", reg),
        }
    }
}

/// Renders instructions one per line, prefixed with their positions.
pub fn listing(instructions: &[Instruction]) -> String {
    use fmt::Write;
    let mut out = String::new();
    for (position, instruction) in instructions.iter().enumerate() {
        // Infallible for String.
        let _ = writeln!(out, "{:3}: {}", position, instruction);
    }
    out
}

/// Accumulates instructions for one compilation unit.
#[derive(Debug, Default)]
pub struct Emitter {
    instructions: Vec<Instruction>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position the next instruction will occupy.
    pub fn pc(&self) -> Position {
        self.instructions.len()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    pub fn label(&mut self, name: &str) {
        self.instructions.push(Instruction::Label(name.to_owned()));
    }

    pub fn mov(&mut self, dest: Reg, src: Reg) {
        self.instructions.push(Instruction::Move { dest, src });
    }

    pub fn mov_imm(&mut self, dest: Reg, value: i32) {
        self.instructions.push(Instruction::MoveImm { dest, value });
    }

    pub fn alu(&mut self, op: AluOp, dest: Reg, lhs: Reg, rhs: Reg) {
        self.instructions.push(Instruction::Alu { op, dest, lhs, rhs });
    }

    pub fn alu_imm(&mut self, op: AluOp, dest: Reg, lhs: Reg, value: i32) {
        self.instructions.push(Instruction::AluImm {
            op,
            dest,
            lhs,
            value,
        });
    }

    pub fn cmp(&mut self, lhs: Reg, rhs: Reg) {
        self.instructions.push(Instruction::Compare { lhs, rhs });
    }

    pub fn cmp_imm(&mut self, lhs: Reg, value: i32) {
        self.instructions.push(Instruction::CompareImm { lhs, value });
    }

    pub fn load(&mut self, dest: Reg, base: Reg, offset: i32) {
        self.instructions.push(Instruction::Load { dest, base, offset });
    }

    pub fn store(&mut self, src: Reg, base: Reg, offset: i32) {
        self.instructions.push(Instruction::Store { src, base, offset });
    }

    /// Emits a conditional jump whose destination is already known as a
    /// relative displacement. A `Never` condition emits nothing.
    pub fn branch(&mut self, cond: Cond, displacement: i32) {
        if cond == Cond::Never {
            return;
        }
        self.instructions.push(Instruction::Branch {
            cond,
            target: JumpTarget::Resolved(displacement),
        });
    }

    /// Emits a conditional jump whose destination is not yet known,
    /// threading it onto the chain that starts at `link`. Returns the
    /// position of the new jump, or `None` when the condition is `Never`
    /// and no instruction was emitted.
    pub fn branch_pending(&mut self, cond: Cond, link: Position) -> Option<Position> {
        if cond == Cond::Never {
            return None;
        }
        self.instructions.push(Instruction::Branch {
            cond,
            target: JumpTarget::Pending(link),
        });
        Some(self.pc() - 1)
    }

    pub fn jump_reg(&mut self, reg: Reg) {
        self.instructions.push(Instruction::BranchReg { reg });
    }

    /// Reads the chain link stored in a pending jump. Returns `None`
    /// when the position does not hold a pending jump; the generator
    /// treats that as an internal-consistency error.
    pub fn jump_link(&self, position: Position) -> Option<Position> {
        match self.instructions.get(position) {
            Some(Instruction::Branch {
                target: JumpTarget::Pending(link),
                ..
            }) => Some(*link),
            _ => None,
        }
    }

    /// Re-threads a pending jump onto another chain. Returns false when
    /// the position does not hold a pending jump.
    pub fn patch_link(&mut self, position: Position, link: Position) -> bool {
        match self.instructions.get_mut(position) {
            Some(Instruction::Branch {
                target: target @ JumpTarget::Pending(_),
                ..
            }) => {
                *target = JumpTarget::Pending(link);
                true
            }
            _ => false,
        }
    }

    /// Resolves a pending jump to a relative displacement. Returns false
    /// when the position does not hold a pending jump.
    pub fn patch_jump(&mut self, position: Position, displacement: i32) -> bool {
        match self.instructions.get_mut(position) {
            Some(Instruction::Branch {
                target: target @ JumpTarget::Pending(_),
                ..
            }) => {
                *target = JumpTarget::Resolved(displacement);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_when_mov_imm_then_assignment_text() {
        let mut em = Emitter::new();
        em.mov_imm(Reg(0), 7);

        assert_eq!(format!("{}", em.instructions()[0]), "R0 := 7");
    }

    #[test]
    fn emitter_when_alu_then_infix_text() {
        let mut em = Emitter::new();
        em.alu(AluOp::Add, Reg(0), Reg(1), Reg(2));
        em.alu_imm(AluOp::Mul, Reg(3), Reg(3), 4);

        assert_eq!(format!("{}", em.instructions()[0]), "R0 := R1 + R2");
        assert_eq!(format!("{}", em.instructions()[1]), "R3 := R3 * 4");
    }

    #[test]
    fn emitter_when_load_store_then_memory_text() {
        let mut em = Emitter::new();
        em.load(Reg(0), GB, 8);
        em.store(Reg(0), SP, 4);

        assert_eq!(format!("{}", em.instructions()[0]), "R0 := mem[GB + 8]");
        assert_eq!(format!("{}", em.instructions()[1]), "mem[SP + 4] := R0");
    }

    #[test]
    fn emitter_when_branch_then_mnemonic_and_operand() {
        let mut em = Emitter::new();
        em.branch(Cond::Equal, 5);
        em.jump_reg(LNK);

        assert_eq!(format!("{}", em.instructions()[0]), "je    5");
        assert_eq!(format!("{}", em.instructions()[1]), "jmp LNK");
    }

    #[test]
    fn emitter_when_branch_never_then_nothing_emitted() {
        let mut em = Emitter::new();
        em.branch(Cond::Never, 5);
        assert_eq!(em.pc(), 0);
        assert_eq!(em.branch_pending(Cond::Never, 0), None);
        assert_eq!(em.pc(), 0);
    }

    #[test]
    fn emitter_when_branch_pending_then_returns_own_position() {
        let mut em = Emitter::new();
        em.label("m");
        let position = em.branch_pending(Cond::Greater, 0).unwrap();

        assert_eq!(position, 1);
        assert_eq!(em.jump_link(position), Some(0));
    }

    #[test]
    fn emitter_when_patch_jump_then_resolved_displacement() {
        let mut em = Emitter::new();
        em.label("m");
        let position = em.branch_pending(Cond::Always, 0).unwrap();
        assert!(em.patch_jump(position, 3));

        assert_eq!(
            em.instructions()[position],
            Instruction::Branch {
                cond: Cond::Always,
                target: JumpTarget::Resolved(3),
            }
        );
        // Fixing a chain consumes it; a second patch must fail.
        assert!(!em.patch_jump(position, 4));
    }

    #[test]
    fn emitter_when_patch_non_jump_then_false() {
        let mut em = Emitter::new();
        em.mov_imm(Reg(0), 1);

        assert!(!em.patch_jump(0, 3));
        assert!(!em.patch_link(0, 2));
        assert_eq!(em.jump_link(0), None);
    }

    #[test]
    fn emitter_when_negate_then_inverse_condition() {
        assert_eq!(Cond::Less.negate(), Cond::GreaterEqual);
        assert_eq!(Cond::Greater.negate(), Cond::LessEqual);
        assert_eq!(Cond::Always.negate(), Cond::Never);
        assert_eq!(Cond::Equal.negate().negate(), Cond::Equal);
    }

    #[test]
    fn emitter_when_listing_then_positions_prefixed() {
        let mut em = Emitter::new();
        em.label("M");
        em.mov_imm(Reg(0), 7);
        em.store(Reg(0), GB, 0);

        let text = listing(em.instructions());
        assert_eq!(text, "  0: M:\n  1: R0 := 7\n  2: mem[GB + 0] := R0\n");
    }
}
