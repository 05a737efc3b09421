//! Lexer and single-pass parser for the Oberon-0 language.
//!
//! [`compile`] is the whole pipeline: tokenize the source, parse it, and
//! return either the generated abstract machine program or every
//! diagnostic the run could find.

pub mod lexer;
pub mod parser;
pub mod token;

pub use parser::compile;
