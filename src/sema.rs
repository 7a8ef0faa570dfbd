//! Semantic analysis: scope management, declaration checking and type
//! checking over the parsed program.
//!
//! Names are compared case-insensitively; symbols keep the declared
//! spelling for diagnostics. On success the analyzer hands the code
//! generator an `Env` with the routine signatures it needs for
//! by-reference argument passing.

use std::collections::HashMap;
use std::fmt;

use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::token::Pos;

/// Resolved type of a declaration or expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Integer,
    Real,
    Boolean,
    Char,
    Str,
    Array {
        ranges: Vec<(i64, i64)>,
        elem: Box<Type>,
    },
}

impl Type {
    fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Real)
    }

    fn is_simple(&self) -> bool {
        !matches!(self, Type::Array { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => f.write_str("integer"),
            Type::Real => f.write_str("real"),
            Type::Boolean => f.write_str("boolean"),
            Type::Char => f.write_str("char"),
            Type::Str => f.write_str("string"),
            Type::Array { ranges, elem } => {
                write!(f, "array[")?;
                for (i, (lo, hi)) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{lo}..{hi}")?;
                }
                write!(f, "] of {elem}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSig {
    pub ty: Type,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable { ty: Type },
    Parameter { ty: Type },
    LoopIndex,
    Procedure { params: Vec<ParamSig> },
    Function { params: Vec<ParamSig>, ret: Type },
    Builtin,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    /// Spelling at the declaration site, kept for diagnostics.
    pub name: String,
    pub kind: SymbolKind,
}

/// Routine signatures the code generator consults when lowering calls.
/// Keyed by lowercased bare name.
#[derive(Debug, Default)]
pub struct Env {
    pub routines: HashMap<String, Vec<ParamSig>>,
}

/// Checks the program, aborting on the first violation.
pub fn check(program: &Program) -> CompileResult<Env> {
    let mut analyzer = Analyzer::new();
    analyzer.check_program(program)?;
    Ok(analyzer.env)
}

struct Analyzer {
    /// Innermost scope last; lookup walks outward.
    scopes: Vec<HashMap<String, Symbol>>,
    /// Lowercased name of the function whose body is being checked.
    current_function: Option<String>,
    env: Env,
}

const IO_BUILTINS: [&str; 4] = ["write", "writeln", "read", "readln"];

impl Analyzer {
    fn new() -> Self {
        let mut global = HashMap::new();
        for name in IO_BUILTINS {
            global.insert(
                name.to_string(),
                Symbol {
                    name: name.to_string(),
                    kind: SymbolKind::Builtin,
                },
            );
        }
        Self {
            scopes: vec![global],
            current_function: None,
            env: Env::default(),
        }
    }

    fn define(&mut self, name: &str, kind: SymbolKind, pos: Pos) -> CompileResult<()> {
        let key = name.to_lowercase();
        let innermost = self.scopes.len() - 1;
        if self.scopes[innermost].contains_key(&key) {
            return Err(CompileError::semantic(
                format!("Duplicate declaration of '{name}'"),
                pos,
            ));
        }
        self.scopes[innermost].insert(
            key,
            Symbol {
                name: name.to_string(),
                kind,
            },
        );
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Symbol> {
        let key = name.to_lowercase();
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&key))
            .cloned()
    }

    fn resolve_type(&self, spec: &TypeSpec) -> Type {
        match spec {
            TypeSpec::Simple { name, .. } => match name {
                SimpleType::Integer => Type::Integer,
                SimpleType::Real => Type::Real,
                SimpleType::Boolean => Type::Boolean,
                SimpleType::Char => Type::Char,
                SimpleType::Str => Type::Str,
            },
            TypeSpec::Array { ranges, elem, .. } => Type::Array {
                ranges: ranges.clone(),
                elem: Box::new(self.resolve_type(elem)),
            },
        }
    }

    fn check_program(&mut self, program: &Program) -> CompileResult<()> {
        self.check_decls(&program.decls)?;
        self.check_stmt(&program.body)
    }

    fn check_decls(&mut self, decls: &[Decl]) -> CompileResult<()> {
        for decl in decls {
            match decl {
                Decl::Var(v) => {
                    let ty = self.resolve_type(&v.ty);
                    for name in &v.names {
                        self.define(name, SymbolKind::Variable { ty: ty.clone() }, v.pos)?;
                    }
                }
                Decl::Proc(p) => {
                    let params = self.param_sigs(&p.params);
                    self.define(
                        &p.name,
                        SymbolKind::Procedure {
                            params: params.clone(),
                        },
                        p.pos,
                    )?;
                    self.env.routines.insert(p.name.to_lowercase(), params);
                    self.check_routine(&p.params, None, &p.locals, &p.body)?;
                }
                Decl::Func(f) => {
                    let params = self.param_sigs(&f.params);
                    let ret = self.resolve_type(&f.ret);
                    self.define(
                        &f.name,
                        SymbolKind::Function {
                            params: params.clone(),
                            ret: ret.clone(),
                        },
                        f.pos,
                    )?;
                    self.env
                        .routines
                        .insert(f.name.to_lowercase(), params.clone());
                    self.check_routine(&f.params, Some((f, params, ret)), &f.locals, &f.body)?;
                }
            }
        }
        Ok(())
    }

    fn param_sigs(&self, params: &[Param]) -> Vec<ParamSig> {
        params
            .iter()
            .map(|p| ParamSig {
                ty: self.resolve_type(&p.ty),
                by_ref: p.by_ref,
            })
            .collect()
    }

    fn check_routine(
        &mut self,
        params: &[Param],
        func: Option<(&FuncDecl, Vec<ParamSig>, Type)>,
        locals: &[Decl],
        body: &Stmt,
    ) -> CompileResult<()> {
        self.scopes.push(HashMap::new());
        let saved_function = self.current_function.take();

        // A function binds its own name inside its body: the return slot,
        // assignable only there, and the target of recursive calls.
        if let Some((f, sigs, ret)) = func {
            self.define(&f.name, SymbolKind::Function { params: sigs, ret }, f.pos)?;
            self.current_function = Some(f.name.to_lowercase());
        }
        for param in params {
            let ty = self.resolve_type(&param.ty);
            self.define(&param.name, SymbolKind::Parameter { ty }, param.pos)?;
        }

        self.check_decls(locals)?;
        self.check_stmt(body)?;

        self.scopes.pop();
        self.current_function = saved_function;
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Compound { stmts, .. } => {
                for s in stmts {
                    self.check_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Assign { target, value, pos } => {
                let lhs = self.lvalue_type(target)?;
                let rhs = self.type_of(value)?;
                if !assignable(&lhs, &rhs, value) {
                    return Err(CompileError::semantic(
                        format!("Type mismatch in assignment: cannot assign {rhs} to {lhs}"),
                        *pos,
                    ));
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(cond)?;
                self.check_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                self.check_condition(cond)?;
                self.check_stmt(body)
            }
            Stmt::For {
                var,
                from,
                to,
                body,
                pos,
                ..
            } => self.check_for(var, from, to, body, *pos),
            Stmt::Repeat { body, cond, .. } => {
                for s in body {
                    self.check_stmt(s)?;
                }
                self.check_condition(cond)
            }
            Stmt::Call { name, args, pos } => {
                let Some(symbol) = self.lookup(name) else {
                    return Err(CompileError::semantic(
                        format!("Undefined procedure: {name}"),
                        *pos,
                    ));
                };
                match symbol.kind {
                    SymbolKind::Procedure { params } => {
                        self.check_call_args(name, &params, args, *pos)
                    }
                    _ => Err(CompileError::semantic(
                        format!("'{name}' is not a procedure"),
                        *pos,
                    )),
                }
            }
            Stmt::Write { args, .. } => {
                for arg in args {
                    let ty = self.type_of(arg)?;
                    if !ty.is_simple() {
                        return Err(CompileError::semantic(
                            format!("Write supports only values of simple type, got {ty}"),
                            arg.pos(),
                        ));
                    }
                }
                Ok(())
            }
            Stmt::Read { targets, .. } => {
                for target in targets {
                    if !matches!(target, Expr::Var { .. } | Expr::Index { .. }) {
                        return Err(CompileError::semantic(
                            "Read requires a variable argument",
                            target.pos(),
                        ));
                    }
                    let ty = self.lvalue_type(target)?;
                    if !ty.is_simple() {
                        return Err(CompileError::semantic(
                            format!("Read supports only values of simple type, got {ty}"),
                            target.pos(),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn check_condition(&mut self, cond: &Expr) -> CompileResult<()> {
        let ty = self.type_of(cond)?;
        if ty != Type::Boolean {
            return Err(CompileError::semantic(
                format!("Condition must be boolean, got {ty}"),
                cond.pos(),
            ));
        }
        Ok(())
    }

    fn check_for(
        &mut self,
        var: &str,
        from: &Expr,
        to: &Expr,
        body: &Stmt,
        pos: Pos,
    ) -> CompileResult<()> {
        let Some(symbol) = self.lookup(var) else {
            return Err(CompileError::semantic(
                format!("Undefined variable: {var}"),
                pos,
            ));
        };
        match &symbol.kind {
            SymbolKind::Variable { ty } | SymbolKind::Parameter { ty } => {
                if *ty != Type::Integer {
                    return Err(CompileError::semantic(
                        format!("For loop variable must be integer, got {ty}"),
                        pos,
                    ));
                }
            }
            SymbolKind::LoopIndex => {}
            _ => {
                return Err(CompileError::semantic(
                    format!("'{var}' is not a variable"),
                    pos,
                ))
            }
        }

        let from_ty = self.type_of(from)?;
        if from_ty != Type::Integer {
            return Err(CompileError::semantic(
                format!("For loop start value must be integer, got {from_ty}"),
                from.pos(),
            ));
        }
        let to_ty = self.type_of(to)?;
        if to_ty != Type::Integer {
            return Err(CompileError::semantic(
                format!("For loop end value must be integer, got {to_ty}"),
                to.pos(),
            ));
        }

        // Re-tag the variable as the loop index for the duration of the
        // body. Analysis aborts on error, so no restore is needed on the
        // failure path.
        let key = var.to_lowercase();
        let holder = self.scopes.iter().rposition(|s| s.contains_key(&key));
        let saved = holder.and_then(|i| {
            self.scopes[i].insert(
                key.clone(),
                Symbol {
                    name: symbol.name.clone(),
                    kind: SymbolKind::LoopIndex,
                },
            )
        });
        self.check_stmt(body)?;
        if let (Some(i), Some(old)) = (holder, saved) {
            self.scopes[i].insert(key, old);
        }
        Ok(())
    }

    fn check_call_args(
        &mut self,
        name: &str,
        params: &[ParamSig],
        args: &[Expr],
        pos: Pos,
    ) -> CompileResult<()> {
        if params.len() != args.len() {
            return Err(CompileError::semantic(
                format!(
                    "Argument count mismatch in call to {name}: expected {}, got {}",
                    params.len(),
                    args.len()
                ),
                pos,
            ));
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            let arg_no = i + 1;
            if param.by_ref {
                if !matches!(arg, Expr::Var { .. } | Expr::Index { .. }) {
                    return Err(CompileError::semantic(
                        format!(
                            "Argument {arg_no} in call to {name} must be a variable for var parameter"
                        ),
                        arg.pos(),
                    ));
                }
                // By-reference passing admits no promotion.
                let ty = self.lvalue_type(arg)?;
                if ty != param.ty {
                    return Err(CompileError::semantic(
                        format!(
                            "Argument {arg_no} type mismatch in call to {name}: expected {}, got {ty}",
                            param.ty
                        ),
                        arg.pos(),
                    ));
                }
            } else {
                let ty = self.type_of(arg)?;
                if !assignable(&param.ty, &ty, arg) {
                    return Err(CompileError::semantic(
                        format!(
                            "Argument {arg_no} type mismatch in call to {name}: expected {}, got {ty}",
                            param.ty
                        ),
                        arg.pos(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Type of an assignment target or `read`/`var`-argument l-value.
    fn lvalue_type(&mut self, expr: &Expr) -> CompileResult<Type> {
        match expr {
            Expr::Var { name, pos } => {
                let Some(symbol) = self.lookup(name) else {
                    return Err(CompileError::semantic(
                        format!("Undefined variable: {name}"),
                        *pos,
                    ));
                };
                match symbol.kind {
                    SymbolKind::Variable { ty } | SymbolKind::Parameter { ty } => Ok(ty),
                    SymbolKind::LoopIndex => Ok(Type::Integer),
                    SymbolKind::Function { ret, .. } => {
                        // The return slot: assignable only inside the
                        // function's own body.
                        if self.current_function.as_deref() == Some(name.to_lowercase().as_str()) {
                            Ok(ret)
                        } else {
                            Err(CompileError::semantic(
                                format!("Cannot assign to function '{name}'"),
                                *pos,
                            ))
                        }
                    }
                    SymbolKind::Procedure { .. } | SymbolKind::Builtin => Err(
                        CompileError::semantic(format!("'{name}' is not a variable"), *pos),
                    ),
                }
            }
            Expr::Index { .. } => self.type_of(expr),
            _ => Err(CompileError::semantic(
                "Assignment target must be a variable or array element",
                expr.pos(),
            )),
        }
    }

    fn type_of(&mut self, expr: &Expr) -> CompileResult<Type> {
        match expr {
            Expr::Int { .. } => Ok(Type::Integer),
            Expr::Real { .. } => Ok(Type::Real),
            Expr::Str { .. } => Ok(Type::Str),
            Expr::Bool { .. } => Ok(Type::Boolean),
            Expr::Var { name, pos } => {
                let Some(symbol) = self.lookup(name) else {
                    return Err(CompileError::semantic(
                        format!("Undefined variable: {name}"),
                        *pos,
                    ));
                };
                match symbol.kind {
                    SymbolKind::Variable { ty } | SymbolKind::Parameter { ty } => Ok(ty),
                    SymbolKind::LoopIndex => Ok(Type::Integer),
                    _ => Err(CompileError::semantic(
                        format!("'{name}' is not a variable"),
                        *pos,
                    )),
                }
            }
            Expr::Index { base, indices, pos } => {
                let base_ty = self.type_of(base)?;
                let Type::Array { ranges, elem } = base_ty else {
                    return Err(CompileError::semantic(
                        format!("Cannot index a value of type {base_ty}"),
                        *pos,
                    ));
                };
                if indices.len() != ranges.len() {
                    return Err(CompileError::semantic(
                        format!(
                            "Array rank mismatch: expected {} indices, got {}",
                            ranges.len(),
                            indices.len()
                        ),
                        *pos,
                    ));
                }
                for index in indices {
                    let ty = self.type_of(index)?;
                    if ty != Type::Integer {
                        return Err(CompileError::semantic(
                            format!("Array index must be integer, got {ty}"),
                            index.pos(),
                        ));
                    }
                }
                Ok(*elem)
            }
            Expr::Call { name, args, pos } => {
                let Some(symbol) = self.lookup(name) else {
                    return Err(CompileError::semantic(
                        format!("Undefined function: {name}"),
                        *pos,
                    ));
                };
                match symbol.kind {
                    SymbolKind::Function { params, ret } => {
                        self.check_call_args(name, &params, args, *pos)?;
                        Ok(ret)
                    }
                    _ => Err(CompileError::semantic(
                        format!("'{name}' is not a function"),
                        *pos,
                    )),
                }
            }
            Expr::Unary { op, operand, pos } => {
                let ty = self.type_of(operand)?;
                match op {
                    UnOp::Plus | UnOp::Neg => {
                        if !ty.is_numeric() {
                            return Err(CompileError::semantic(
                                format!("Unary {op} requires a numeric operand, got {ty}"),
                                *pos,
                            ));
                        }
                        Ok(ty)
                    }
                    UnOp::Not => {
                        if ty != Type::Boolean {
                            return Err(CompileError::semantic(
                                format!("Operator not requires a boolean operand, got {ty}"),
                                *pos,
                            ));
                        }
                        Ok(Type::Boolean)
                    }
                }
            }
            Expr::Binary { lhs, op, rhs, pos } => {
                let lt = self.type_of(lhs)?;
                let rt = self.type_of(rhs)?;
                binary_type(*op, &lt, &rt, *pos)
            }
        }
    }
}

fn binary_type(op: BinOp, lt: &Type, rt: &Type, pos: Pos) -> CompileResult<Type> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            if !lt.is_numeric() || !rt.is_numeric() {
                return Err(CompileError::semantic(
                    format!("Operator {op} requires numeric operands"),
                    pos,
                ));
            }
            if *lt == Type::Integer && *rt == Type::Integer {
                Ok(Type::Integer)
            } else {
                Ok(Type::Real)
            }
        }
        BinOp::Div => {
            if !lt.is_numeric() || !rt.is_numeric() {
                return Err(CompileError::semantic(
                    format!("Operator {op} requires numeric operands"),
                    pos,
                ));
            }
            Ok(Type::Real)
        }
        BinOp::IntDiv | BinOp::Mod => {
            if *lt != Type::Integer || *rt != Type::Integer {
                return Err(CompileError::semantic(
                    format!("Operator {op} requires integer operands"),
                    pos,
                ));
            }
            Ok(Type::Integer)
        }
        BinOp::And | BinOp::Or => {
            if *lt != Type::Boolean || *rt != Type::Boolean {
                return Err(CompileError::semantic(
                    format!("Operator {op} requires boolean operands"),
                    pos,
                ));
            }
            Ok(Type::Boolean)
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let numeric_pair = lt.is_numeric() && rt.is_numeric();
            let same_simple = lt == rt && lt.is_simple();
            if !numeric_pair && !same_simple {
                return Err(CompileError::semantic(
                    format!("Cannot compare {lt} with {rt}"),
                    pos,
                ));
            }
            Ok(Type::Boolean)
        }
    }
}

/// Assignment compatibility: equal types, the `integer → real` promotion,
/// or a single-character string literal targeting a `char`.
fn assignable(dst: &Type, src: &Type, src_expr: &Expr) -> bool {
    if dst == src {
        return true;
    }
    if *dst == Type::Real && *src == Type::Integer {
        return true;
    }
    if *dst == Type::Char && *src == Type::Str {
        return matches!(src_expr, Expr::Str { value, .. } if value.chars().count() == 1);
    }
    false
}
