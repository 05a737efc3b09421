//! Common definitions for the Oberon-0 compiler: source locations,
//! diagnostics, type descriptors and the scoped symbol table.
//!
//! These items are shared by the lexer, the single-pass parser and the
//! code generator. They define *what* the language talks about; the
//! `oberon0-codegen` crate defines how values are lowered to instructions.

pub mod core;
pub mod diagnostic;
pub mod problems;
pub mod scope;
pub mod types;
