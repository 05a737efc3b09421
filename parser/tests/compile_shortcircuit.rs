//! Instruction-level tests for boolean expressions. Connectives compile
//! to conditional jumps, not ALU instructions, and a boolean only
//! becomes a 0/1 value when something stores or passes it.

mod common;

use common::assemble_lines;

#[test]
fn compile_when_conjunction_stored_then_diamond_materializes() {
    let source = "
module m;
var x: integer; ok: bool;
begin
  ok := (x > 0) & (x < 10)
end m.
";
    // Layout:
    //   0: m:
    //   1: R0 := mem[GB + 0]
    //   2: cmp R0, 0
    //   3: jle   5              short-circuit to the 0 arm
    //   4: R0 := mem[GB + 0]
    //   5: cmp R0, 10
    //   6: jge   2
    //   7: R0 := 1
    //   8: jmp   1
    //   9: R0 := 0
    //  10: mem[GB + 4] := R0
    assert_eq!(
        assemble_lines(source),
        vec![
            "m:",
            "R0 := mem[GB + 0]",
            "cmp R0, 0",
            "jle   5",
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
fn compile_when_disjunction_stored_then_true_chain_reaches_one_arm() {
    let source = "
module m;
var x: integer; ok: bool;
begin
  ok := (x = 0) or (x = 5)
end m.
";
    // The short-circuit jump after the left operand branches on success
    // and lands on the 1 arm.
    assert_eq!(
        assemble_lines(source),
        vec![
            "m:",
            "R0 := mem[GB + 0]",
            "cmp R0, 0",
            "je    3",
            "R0 := mem[GB + 0]",
            "cmp R0, 5",
            "jne   2",
            "R0 := 1",
            "jmp   1",
            "R0 := 0",
            "mem[GB + 4] := R0",
        ]
    );
}

#[test]
fn compile_when_conjunction_in_condition_then_no_materialization() {
    // Used directly by an if statement, the boolean stays in jump form:
    // both the short-circuit jump and the condition jump join the same
    // false chain.
    let source = "
module m;
var x: integer;
begin
  if (x > 0) & (x < 10) then x := 0 end
end m.
";
    assert_eq!(
        assemble_lines(source),
        vec![
            "m:",
            "R0 := mem[GB + 0]",
            "cmp R0, 0",
            "jle   5",
            "R0 := mem[GB + 0]",
            "cmp R0, 10",
            "jge   2",
            "R0 := 0",
            "mem[GB + 0] := R0",
        ]
    );
}

#[test]
fn compile_when_negation_then_condition_inverted() {
    let source = "
module m;
var x: integer; ok: bool;
begin
  ok := ~(x = 0)
end m.
";
    assert_eq!(
        assemble_lines(source),
        vec![
            "m:",
            "R0 := mem[GB + 0]",
            "cmp R0, 0",
            "je    2",
            "R0 := 1",
            "jmp   1",
            "R0 := 0",
            "mem[GB + 4] := R0",
        ]
    );
}

#[test]
fn compile_when_constant_true_operand_then_no_test_emitted() {
    // `true` never needs a short-circuit jump; only the right operand is
    // tested.
    let source = "
module m;
var x: integer; ok: bool;
begin
  ok := true & (x = 0)
end m.
";
    assert_eq!(
        assemble_lines(source),
        vec![
            "m:",
            "R0 := mem[GB + 0]",
            "cmp R0, 0",
            "jne   2",
            "R0 := 1",
            "jmp   1",
            "R0 := 0",
            "mem[GB + 4] := R0",
        ]
    );
}
