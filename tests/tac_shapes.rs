use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SOURCE: AtomicUsize = AtomicUsize::new(0);

fn write_source(src: &str) -> PathBuf {
    let n = NEXT_SOURCE.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("pastac_shapes_{}_{n}.pas", std::process::id()));
    fs::write(&path, src).expect("failed to write test source");
    path
}

fn run_compiler(src: &str) -> String {
    let path = write_source(src);
    let out = Command::new(env!("CARGO_BIN_EXE_pastac"))
        .arg(&path)
        .output()
        .expect("failed to spawn pastac");
    fs::remove_file(&path).ok();
    assert!(
        out.status.success(),
        "pastac failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).expect("stdout is not valid utf-8")
}

fn assert_lines_in_order(tac: &str, expected: &[&str]) {
    let lines: Vec<&str> = tac.lines().collect();
    let mut from = 0;
    for want in expected {
        match lines[from..].iter().position(|line| line == want) {
            Some(i) => from += i + 1,
            None => panic!("line {want:?} not found in order in:\n{tac}"),
        }
    }
}

#[test]
fn lowers_straight_line_arithmetic() {
    let tac = run_compiler(
        "program P; var x,y,z:integer; begin x:=10; y:=20; z:=x+y end.",
    );
    assert_lines_in_order(
        &tac,
        &["main:", "x = 10", "y = 20", "t0 = x + y", "z = t0", "halt"],
    );
}

#[test]
fn lowers_if_else_with_branch_labels() {
    let tac = run_compiler(
        "program P; var i:integer; begin i:=15; if i>10 then writeln('big') else writeln('small') end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "i = 15",
            "t0 = i > 10",
            "if_false t0 goto L0",
            "write 'big'",
            "writeln",
            "goto L1",
            "L0:",
            "write 'small'",
            "writeln",
            "L1:",
            "halt",
        ],
    );
}

#[test]
fn lowers_if_without_else_to_single_join_label() {
    let tac = run_compiler(
        "program P; var x:integer; begin x:=1; if x>0 then x:=2 end.",
    );
    assert_lines_in_order(
        &tac,
        &["t0 = x > 0", "if_false t0 goto L0", "x = 2", "L0:", "halt"],
    );
    assert!(!tac.contains("goto L1"));
}

#[test]
fn while_loop_has_one_backward_goto_and_one_exit() {
    let tac = run_compiler(
        "program P; var s,i:integer; begin s:=0; i:=1; while i<=10 do begin s:=s+i; i:=i+1 end end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "s = 0",
            "i = 1",
            "L0:",
            "t0 = i <= 10",
            "if_false t0 goto L1",
            "t1 = s + i",
            "s = t1",
            "t2 = i + 1",
            "i = t2",
            "goto L0",
            "L1:",
            "halt",
        ],
    );
    assert_eq!(tac.lines().filter(|l| *l == "goto L0").count(), 1);
    assert_eq!(tac.lines().filter(|l| l.starts_with("if_false")).count(), 1);
}

#[test]
fn for_loop_initializes_once_and_steps_by_one() {
    let tac = run_compiler(
        "program P; var i,f:integer; begin f:=1; for i:=1 to 5 do f:=f*i end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "f = 1",
            "i = 1",
            "L0:",
            "t0 = i <= 5",
            "if_false t0 goto L1",
            "t1 = f * i",
            "f = t1",
            "i = i + 1",
            "goto L0",
            "L1:",
            "halt",
        ],
    );
    assert_eq!(tac.lines().filter(|l| *l == "i = 1").count(), 1);
}

#[test]
fn downto_loop_compares_and_decrements() {
    let tac = run_compiler(
        "program P; var i,s:integer; begin s:=0; for i:=5 downto 1 do s:=s+i end.",
    );
    assert_lines_in_order(&tac, &["i = 5", "t0 = i >= 1", "i = i - 1"]);
}

#[test]
fn function_routine_precedes_main_and_sets_return_slot() {
    let tac = run_compiler(
        "program P; function Add(x,y:integer):integer; begin Add:=x+y end; var r:integer; begin r:=Add(2,3) end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "Add:",
            "t0 = x + y",
            "Add = t0",
            "return",
            "main:",
            "t1 = call Add, 2, 3",
            "r = t1",
            "halt",
        ],
    );
}

#[test]
fn nested_routines_emit_innermost_first() {
    let src = r#"
program P;
procedure Outer;
  procedure Inner;
  begin
    writeln('inner')
  end;
begin
  Inner
end;
begin
  Outer
end.
"#;
    let tac = run_compiler(src);
    assert_lines_in_order(
        &tac,
        &[
            "Inner:",
            "write 'inner'",
            "writeln",
            "return",
            "Outer:",
            "call Inner",
            "return",
            "main:",
            "call Outer",
            "halt",
        ],
    );
}

#[test]
fn repeat_loop_jumps_back_on_false() {
    let tac = run_compiler(
        "program P; var i:integer; begin i:=0; repeat i:=i+1 until i>3 end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "i = 0",
            "L0:",
            "t0 = i + 1",
            "i = t0",
            "t1 = i > 3",
            "if_false t1 goto L0",
            "halt",
        ],
    );
}

#[test]
fn lowers_unary_operators() {
    let tac = run_compiler(
        "program P; var x,y:integer; b,c:boolean; begin y:=2; x:=-y; c:=true; b:=not c end.",
    );
    assert_lines_in_order(
        &tac,
        &["y = 2", "t0 = 0 - y", "x = t0", "c = 1", "t1 = c == 0", "b = t1"],
    );
}

#[test]
fn lowers_div_and_mod_with_dedicated_operators() {
    let tac = run_compiler(
        "program P; var x,y,q,r:integer; begin x:=17; y:=5; q:=x div y; r:=x mod y end.",
    );
    assert_lines_in_order(&tac, &["t0 = x div y", "q = t0", "t1 = x mod y", "r = t1"]);
}

#[test]
fn and_short_circuits_past_right_operand() {
    let tac = run_compiler(
        "program P; var a,b,x:integer; begin a:=1; b:=2; if (a>0) and (b>0) then x:=1 end.",
    );
    assert_lines_in_order(
        &tac,
        &[
            "t0 = a > 0",
            "t1 = t0",
            "if_false t1 goto L0",
            "t2 = b > 0",
            "t1 = t2",
            "L0:",
            "if_false t1 goto L1",
            "x = 1",
            "L1:",
        ],
    );
}

#[test]
fn or_short_circuits_on_true() {
    let tac = run_compiler(
        "program P; var a,b,x:integer; begin a:=1; b:=2; if (a>0) or (b>0) then x:=2 end.",
    );
    assert_lines_in_order(
        &tac,
        &["t0 = a > 0", "t1 = t0", "if_true t1 goto L0", "t2 = b > 0", "t1 = t2", "L0:"],
    );
}

#[test]
fn lowers_array_reads_and_writes() {
    let tac = run_compiler(
        "program P; var a: array[1..10] of integer; i,y:integer; begin i:=1; y:=0; a[i]:=y+1; y:=a[i] end.",
    );
    assert_lines_in_order(
        &tac,
        &["t0 = y + 1", "a[i] = t0", "t1 = a[i]", "y = t1"],
    );
}

#[test]
fn lowers_multi_dimension_indexing() {
    let tac = run_compiler(
        "program P; var m: array[1..2, 1..3] of integer; x:integer; begin m[1,2]:=5; x:=m[2,1] end.",
    );
    assert_lines_in_order(&tac, &["m[1, 2] = 5", "t0 = m[2, 1]", "x = t0"]);
}

#[test]
fn var_parameter_receives_lvalue_name() {
    let tac = run_compiler(
        "program P; procedure Bump(var n: integer); begin n := n + 1 end; var x: integer; begin x:=1; Bump(x) end.",
    );
    assert_lines_in_order(
        &tac,
        &["Bump:", "t0 = n + 1", "n = t0", "return", "main:", "x = 1", "call Bump, x", "halt"],
    );
}

#[test]
fn read_and_write_emit_one_instruction_per_argument() {
    let tac = run_compiler(
        "program P; var x,y:integer; begin read(x); readln(y); write(x, y); writeln('done') end.",
    );
    assert_lines_in_order(
        &tac,
        &["read x", "read y", "readln", "write x", "write y", "write 'done'", "writeln"],
    );
}

#[test]
fn integer_promotes_into_real_context() {
    let tac = run_compiler("program P; var r:real; begin r := 1 + 0.5; r := 2.0 end.");
    assert_lines_in_order(&tac, &["t0 = 1 + 0.5", "r = t0", "r = 2.0"]);
}

#[test]
fn char_accepts_single_character_literal() {
    let tac = run_compiler("program P; var c:char; begin c:='a' end.");
    assert_lines_in_order(&tac, &["c = 'a'"]);
}

#[test]
fn string_operand_reescapes_embedded_quote() {
    let tac = run_compiler("program P; begin writeln('it''s') end.");
    assert_lines_in_order(&tac, &["write 'it''s'", "writeln"]);
}

#[test]
fn halt_is_the_final_instruction_exactly_once() {
    let tac = run_compiler(
        "program P; function F:integer; begin F:=1 end; var x:integer; begin x:=F() end.",
    );
    assert_eq!(tac.lines().filter(|l| *l == "halt").count(), 1);
    assert_eq!(tac.lines().last(), Some("halt"));
    assert_eq!(tac.lines().filter(|l| *l == "main:").count(), 1);
}

#[test]
fn identical_input_yields_identical_output() {
    let src =
        "program P; var s,i:integer; begin s:=0; i:=1; while i<=10 do begin s:=s+i; i:=i+1 end end.";
    let first = run_compiler(src);
    let second = run_compiler(src);
    assert_eq!(first, second);
}

#[test]
fn counters_restart_for_each_compilation() {
    let tac = run_compiler("program P; var x,y:integer; begin x:=1; y:=x+x end.");
    assert!(tac.contains("t0 = x + x"), "expected t0 in:\n{tac}");
}
