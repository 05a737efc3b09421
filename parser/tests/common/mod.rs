//! Shared test helpers for instruction-level integration tests.

use oberon0_codegen::Instruction;
use oberon0_dsl::core::FileId;
use oberon0_parser::compile;

/// Compiles a source string, panicking with the diagnostics on failure.
#[allow(dead_code)]
pub fn assemble(source: &str) -> Vec<Instruction> {
    match compile(source, &FileId::default()) {
        Ok(instructions) => instructions,
        Err(diagnostics) => panic!("compilation failed: {:?}", diagnostics),
    }
}

/// Compiles a source string and renders each instruction as text, one
/// entry per position.
#[allow(dead_code)]
pub fn assemble_lines(source: &str) -> Vec<String> {
    assemble(source)
        .iter()
        .map(|instruction| format!("{}", instruction))
        .collect()
}
