use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SOURCE: AtomicUsize = AtomicUsize::new(0);

fn write_source(src: &str) -> PathBuf {
    let n = NEXT_SOURCE.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("pastac_diag_{}_{n}.pas", std::process::id()));
    fs::write(&path, src).expect("failed to write test source");
    path
}

/// Runs the compiler on a source expected to be rejected; returns stderr.
fn run_compiler_fail(src: &str) -> String {
    let path = write_source(src);
    let out = Command::new(env!("CARGO_BIN_EXE_pastac"))
        .arg(&path)
        .output()
        .expect("failed to spawn pastac");
    fs::remove_file(&path).ok();
    assert!(
        !out.status.success(),
        "compiler should fail but succeeded.\nstdout:\n{}",
        String::from_utf8_lossy(&out.stdout)
    );
    assert_eq!(
        out.status.code(),
        Some(1),
        "compile errors must exit with status 1"
    );
    String::from_utf8(out.stderr).expect("stderr is not valid utf-8")
}

#[test]
fn rejects_real_to_integer_assignment_with_position() {
    let stderr = run_compiler_fail("program P; var x:integer; y:real; begin x:=y end.");
    assert!(
        stderr.contains("Semantic Error: Type mismatch in assignment: cannot assign real to integer"),
        "unexpected diagnostic: {stderr}"
    );
    assert!(stderr.contains("at 1:41"), "missing position: {stderr}");
}

#[test]
fn rejects_undefined_variable() {
    let stderr = run_compiler_fail("program P; begin x:=1 end.");
    assert!(stderr.contains("Semantic Error: Undefined variable: x"));
}

#[test]
fn rejects_duplicate_declaration_case_insensitively() {
    let stderr = run_compiler_fail("program P; var x:integer; X:real; begin end.");
    assert!(stderr.contains("Semantic Error: Duplicate declaration of 'X'"));
}

#[test]
fn rejects_non_boolean_condition() {
    let stderr = run_compiler_fail("program P; begin if 1 then writeln('x') end.");
    assert!(stderr.contains("Semantic Error: Condition must be boolean, got integer"));
}

#[test]
fn rejects_arity_mismatch() {
    let stderr = run_compiler_fail(
        "program P; function Add(x,y:integer):integer; begin Add:=x+y end; var r:integer; begin r:=Add(1) end.",
    );
    assert!(stderr.contains("Argument count mismatch in call to Add: expected 2, got 1"));
}

#[test]
fn rejects_literal_for_var_parameter() {
    let stderr = run_compiler_fail(
        "program P; procedure Bump(var n: integer); begin n:=n+1 end; begin Bump(5) end.",
    );
    assert!(stderr.contains("Argument 1 in call to Bump must be a variable for var parameter"));
}

#[test]
fn rejects_promotion_for_var_parameter() {
    let stderr = run_compiler_fail(
        "program P; procedure SetR(var r: real); begin r:=0.0 end; var x:integer; begin SetR(x) end.",
    );
    assert!(stderr.contains("Argument 1 type mismatch in call to SetR: expected real, got integer"));
}

#[test]
fn rejects_argument_type_mismatch() {
    let stderr = run_compiler_fail(
        "program P; procedure Show(n: integer); begin writeln(n) end; begin Show('hello') end.",
    );
    assert!(stderr.contains("Argument 1 type mismatch in call to Show: expected integer, got string"));
}

#[test]
fn reports_unterminated_string() {
    let stderr = run_compiler_fail("program P; begin writeln('abc) end.");
    assert!(stderr.contains("Syntax Error: Unterminated string"));
}

#[test]
fn reports_unterminated_comment() {
    let stderr = run_compiler_fail("program P; { never closed");
    assert!(stderr.contains("Syntax Error: Unterminated comment"));
}

#[test]
fn reports_unexpected_character_with_position() {
    let stderr = run_compiler_fail("program P;\n  @begin end.");
    assert!(stderr.contains("Syntax Error: Unexpected character '@' at 2:3"));
}

#[test]
fn reports_expected_token_mismatch() {
    let stderr = run_compiler_fail("program P begin end.");
    assert!(stderr.contains("Syntax Error: Expected ';', got 'begin'"));
}

#[test]
fn reports_unexpected_end_of_input() {
    let stderr = run_compiler_fail("program P; begin x:=");
    assert!(stderr.contains("Syntax Error: Unexpected token end of input"));
}

#[test]
fn rejects_trailing_text_after_program() {
    let stderr = run_compiler_fail("program P; begin end. extra");
    assert!(stderr.contains("Syntax Error: Expected end of input, got 'extra'"));
}

#[test]
fn rejects_div_on_real_operands() {
    let stderr = run_compiler_fail("program P; var x:integer; begin x := 1.5 div 2 end.");
    assert!(stderr.contains("Semantic Error: Operator div requires integer operands"));
}

#[test]
fn rejects_char_string_comparison() {
    let stderr = run_compiler_fail(
        "program P; var c:char; s:string; begin s:='hi'; c:='a'; if c = s then writeln('eq') end.",
    );
    assert!(stderr.contains("Semantic Error: Cannot compare char with string"));
}

#[test]
fn rejects_multi_character_literal_for_char() {
    let stderr = run_compiler_fail("program P; var c:char; begin c:='ab' end.");
    assert!(stderr.contains("Type mismatch in assignment: cannot assign string to char"));
}

#[test]
fn rejects_read_of_non_lvalue() {
    let stderr = run_compiler_fail("program P; begin read(1) end.");
    assert!(stderr.contains("Semantic Error: Read requires a variable argument"));
}

#[test]
fn rejects_assignment_to_function_outside_its_body() {
    let stderr = run_compiler_fail(
        "program P; function F:integer; begin F:=1 end; begin F:=2 end.",
    );
    assert!(stderr.contains("Semantic Error: Cannot assign to function 'F'"));
}

#[test]
fn rejects_function_called_as_procedure() {
    let stderr = run_compiler_fail(
        "program P; function F:integer; begin F:=1 end; begin F end.",
    );
    assert!(stderr.contains("Semantic Error: 'F' is not a procedure"));
}

#[test]
fn rejects_array_rank_mismatch() {
    let stderr = run_compiler_fail(
        "program P; var a: array[1..2, 1..2] of integer; begin a[1] := 0 end.",
    );
    assert!(stderr.contains("Semantic Error: Array rank mismatch: expected 2 indices, got 1"));
}

#[test]
fn rejects_non_integer_array_index() {
    let stderr = run_compiler_fail(
        "program P; var a: array[1..4] of integer; begin a[1.5] := 0 end.",
    );
    assert!(stderr.contains("Semantic Error: Array index must be integer, got real"));
}

#[test]
fn rejects_forward_reference_between_siblings() {
    let stderr = run_compiler_fail(
        "program P; procedure A; begin B end; procedure B; begin end; begin A end.",
    );
    assert!(stderr.contains("Semantic Error: Undefined procedure: B"));
}

#[test]
fn rejects_whole_array_write() {
    let stderr = run_compiler_fail(
        "program P; var a: array[1..4] of integer; begin writeln(a) end.",
    );
    assert!(stderr.contains("Write supports only values of simple type"));
}

#[test]
fn missing_input_file_exits_with_status_2() {
    let out = Command::new(env!("CARGO_BIN_EXE_pastac"))
        .arg("no_such_file.pas")
        .output()
        .expect("failed to spawn pastac");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error reading input file"));
}
