//! Code generation for the Oberon-0 compiler.
//!
//! The compiler is single pass: the parser invokes the [`Generator`]
//! directly while recognizing the source text, and the generator appends
//! instructions for a register machine to an append-only stream.
//! Forward jumps whose destinations are not yet known are threaded into
//! chains through their own operand fields and resolved in place once the
//! destination is reached.

pub mod emit;
pub mod generator;
pub mod item;

pub use emit::{listing, AluOp, Cond, Emitter, Instruction, JumpTarget, Position, Reg, GB, LNK, SP};
pub use generator::{BoolOp, Generator, MAX_REGISTERS};
pub use item::{Item, ItemKind};
