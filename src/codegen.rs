//! Code generation: lowers the validated AST to line-oriented
//! three-address code.
//!
//! Expressions are lowered post-order; literals and variables appear as
//! operands directly, everything else lands in a fresh temporary. The two
//! fresh-name counters (`t0, t1, …` and `L0, L1, …`) never reset within a
//! run, so identical input yields identical output.

use crate::ast::*;
use crate::sema::Env;

pub struct TacGen<'a> {
    env: &'a Env,
    out: String,
    temps: usize,
    labels: usize,
}

impl<'a> TacGen<'a> {
    pub fn new(env: &'a Env) -> Self {
        Self {
            env,
            out: String::new(),
            temps: 0,
            labels: 0,
        }
    }

    fn wln(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn new_temp(&mut self) -> String {
        let temp = format!("t{}", self.temps);
        self.temps += 1;
        temp
    }

    fn new_label(&mut self) -> String {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        label
    }

    pub fn generate(mut self, program: &Program) -> String {
        self.gen_routines(&program.decls);
        self.wln("main:");
        self.gen_stmt(&program.body);
        self.wln("halt");
        self.out
    }

    /// Emits every routine ahead of `main:`, nested routines before their
    /// parent. Variable declarations produce no code.
    fn gen_routines(&mut self, decls: &[Decl]) {
        for decl in decls {
            match decl {
                Decl::Var(_) => {}
                Decl::Proc(p) => {
                    self.gen_routines(&p.locals);
                    self.gen_routine(&p.name, &p.body);
                }
                Decl::Func(f) => {
                    self.gen_routines(&f.locals);
                    self.gen_routine(&f.name, &f.body);
                }
            }
        }
    }

    fn gen_routine(&mut self, name: &str, body: &Stmt) {
        self.wln(&format!("{name}:"));
        self.gen_stmt(body);
        self.wln("return");
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Compound { stmts, .. } => {
                for s in stmts {
                    self.gen_stmt(s);
                }
            }
            Stmt::Assign { target, value, .. } => {
                let rhs = self.gen_expr(value);
                let lhs = self.lvalue(target);
                self.wln(&format!("{lhs} = {rhs}"));
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let c = self.gen_expr(cond);
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.wln(&format!("if_false {c} goto {else_label}"));
                self.gen_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.wln(&format!("goto {end_label}"));
                    self.wln(&format!("{else_label}:"));
                    self.gen_stmt(else_branch);
                    self.wln(&format!("{end_label}:"));
                } else {
                    self.wln(&format!("{else_label}:"));
                }
            }
            Stmt::While { cond, body, .. } => {
                let top = self.new_label();
                let end = self.new_label();
                self.wln(&format!("{top}:"));
                let c = self.gen_expr(cond);
                self.wln(&format!("if_false {c} goto {end}"));
                self.gen_stmt(body);
                self.wln(&format!("goto {top}"));
                self.wln(&format!("{end}:"));
            }
            Stmt::For {
                var,
                from,
                to,
                downto,
                body,
                ..
            } => {
                let init = self.gen_expr(from);
                self.wln(&format!("{var} = {init}"));
                // The bound is evaluated once, before the loop.
                let bound = self.gen_expr(to);
                let top = self.new_label();
                let end = self.new_label();
                self.wln(&format!("{top}:"));
                let cond = self.new_temp();
                let cmp = if *downto { ">=" } else { "<=" };
                self.wln(&format!("{cond} = {var} {cmp} {bound}"));
                self.wln(&format!("if_false {cond} goto {end}"));
                self.gen_stmt(body);
                let step = if *downto { "-" } else { "+" };
                self.wln(&format!("{var} = {var} {step} 1"));
                self.wln(&format!("goto {top}"));
                self.wln(&format!("{end}:"));
            }
            Stmt::Repeat { body, cond, .. } => {
                let top = self.new_label();
                self.wln(&format!("{top}:"));
                for s in body {
                    self.gen_stmt(s);
                }
                let c = self.gen_expr(cond);
                self.wln(&format!("if_false {c} goto {top}"));
            }
            Stmt::Call { name, args, .. } => {
                let operands = self.gen_call_args(name, args);
                if operands.is_empty() {
                    self.wln(&format!("call {name}"));
                } else {
                    self.wln(&format!("call {name}, {}", operands.join(", ")));
                }
            }
            Stmt::Write { args, newline, .. } => {
                for arg in args {
                    let operand = self.gen_expr(arg);
                    self.wln(&format!("write {operand}"));
                }
                if *newline {
                    self.wln("writeln");
                }
            }
            Stmt::Read {
                targets, newline, ..
            } => {
                for target in targets {
                    let lv = self.lvalue(target);
                    self.wln(&format!("read {lv}"));
                }
                if *newline {
                    self.wln("readln");
                }
            }
        }
    }

    /// Lowers an expression, returning the operand holding its value.
    fn gen_expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Int { value, .. } => value.to_string(),
            Expr::Real { value, .. } => real_operand(*value),
            Expr::Str { value, .. } => string_operand(value),
            Expr::Bool { value, .. } => String::from(if *value { "1" } else { "0" }),
            Expr::Var { name, .. } => name.clone(),
            Expr::Index { base, indices, .. } => {
                let base_op = self.gen_expr(base);
                let index_ops = self.gen_operands(indices);
                let temp = self.new_temp();
                self.wln(&format!("{temp} = {base_op}[{}]", index_ops.join(", ")));
                temp
            }
            Expr::Call { name, args, .. } => {
                let operands = self.gen_call_args(name, args);
                let temp = self.new_temp();
                if operands.is_empty() {
                    self.wln(&format!("{temp} = call {name}"));
                } else {
                    self.wln(&format!("{temp} = call {name}, {}", operands.join(", ")));
                }
                temp
            }
            Expr::Unary { op, operand, .. } => match op {
                UnOp::Plus => self.gen_expr(operand),
                UnOp::Neg => {
                    let inner = self.gen_expr(operand);
                    let temp = self.new_temp();
                    self.wln(&format!("{temp} = 0 - {inner}"));
                    temp
                }
                UnOp::Not => {
                    let inner = self.gen_expr(operand);
                    let temp = self.new_temp();
                    self.wln(&format!("{temp} = {inner} == 0"));
                    temp
                }
            },
            Expr::Binary { lhs, op, rhs, .. } => match op {
                BinOp::And | BinOp::Or => self.gen_short_circuit(*op, lhs, rhs),
                _ => {
                    let a = self.gen_expr(lhs);
                    let b = self.gen_expr(rhs);
                    let temp = self.new_temp();
                    self.wln(&format!("{temp} = {a} {} {b}", tac_op(*op)));
                    temp
                }
            },
        }
    }

    /// `and`/`or` evaluate the right operand only when the left one has not
    /// already decided the result.
    fn gen_short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> String {
        let a = self.gen_expr(lhs);
        let temp = self.new_temp();
        self.wln(&format!("{temp} = {a}"));
        let skip = self.new_label();
        let jump = if op == BinOp::And {
            "if_false"
        } else {
            "if_true"
        };
        self.wln(&format!("{jump} {temp} goto {skip}"));
        let b = self.gen_expr(rhs);
        self.wln(&format!("{temp} = {b}"));
        self.wln(&format!("{skip}:"));
        temp
    }

    fn gen_operands(&mut self, exprs: &[Expr]) -> Vec<String> {
        exprs.iter().map(|e| self.gen_expr(e)).collect()
    }

    /// Arguments are evaluated left to right; by-reference formals receive
    /// the l-value's textual form instead of a loaded temporary.
    fn gen_call_args(&mut self, name: &str, args: &[Expr]) -> Vec<String> {
        let modes: Vec<bool> = self
            .env
            .routines
            .get(&name.to_lowercase())
            .map(|sig| sig.iter().map(|p| p.by_ref).collect())
            .unwrap_or_default();
        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                if modes.get(i).copied().unwrap_or(false) {
                    self.lvalue(arg)
                } else {
                    self.gen_expr(arg)
                }
            })
            .collect()
    }

    /// Textual form of an l-value: a bare name or `name[index, …]`, with
    /// index expressions evaluated in order.
    fn lvalue(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Var { name, .. } => name.clone(),
            Expr::Index { base, indices, .. } => {
                let base_text = self.lvalue(base);
                let index_ops = self.gen_operands(indices);
                format!("{base_text}[{}]", index_ops.join(", "))
            }
            _ => self.gen_expr(expr),
        }
    }
}

fn tac_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::IntDiv => "div",
        BinOp::Mod => "mod",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And | BinOp::Or => unreachable!("lowered via short-circuit control flow"),
    }
}

/// Real literals keep a decimal point so `2.0` does not render as `2`.
fn real_operand(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn string_operand(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
