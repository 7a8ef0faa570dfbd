//! Recursive-descent parser producing the program AST.
//!
//! One-token lookahead (`current`) and single-token consume (`expect`) are
//! the only primitives. The first unexpected token aborts the parse; there
//! is no recovery. Precedence, lowest to highest: relational, additive
//! (`+ - or`), multiplicative (`* / div mod and`), unary, atom — all binary
//! levels left-associative.

use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        // The token stream always ends in Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        let tok = self.current();
        if tok.kind != kind {
            return Err(CompileError::syntax(
                format!("Expected {kind}, got {}", tok.describe()),
                tok.pos,
            ));
        }
        Ok(self.advance())
    }

    pub fn parse(mut self) -> CompileResult<Program> {
        let program = self.parse_program()?;
        self.expect(TokenKind::Eof)?;
        Ok(program)
    }

    fn parse_program(&mut self) -> CompileResult<Program> {
        let start = self.expect(TokenKind::Program)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::Semicolon)?;

        let decls = self.parse_declarations()?;
        let body = self.parse_compound()?;
        self.expect(TokenKind::Dot)?;

        Ok(Program {
            name,
            decls,
            body,
            pos: start.pos,
        })
    }

    fn parse_declarations(&mut self) -> CompileResult<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Var => self.parse_var_section(&mut decls)?,
                TokenKind::Procedure => decls.push(Decl::Proc(self.parse_procedure()?)),
                TokenKind::Function => decls.push(Decl::Func(self.parse_function()?)),
                _ => return Ok(decls),
            }
        }
    }

    fn parse_var_section(&mut self, decls: &mut Vec<Decl>) -> CompileResult<()> {
        self.expect(TokenKind::Var)?;
        while self.check(TokenKind::Identifier) {
            let first = self.advance();
            let mut names = vec![first.lexeme];
            while self.check(TokenKind::Comma) {
                self.advance();
                names.push(self.expect(TokenKind::Identifier)?.lexeme);
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type_spec()?;
            self.expect(TokenKind::Semicolon)?;
            decls.push(Decl::Var(VarDecl {
                names,
                ty,
                pos: first.pos,
            }));
        }
        Ok(())
    }

    fn parse_procedure(&mut self) -> CompileResult<ProcDecl> {
        let start = self.expect(TokenKind::Procedure)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        let params = if self.check(TokenKind::LParen) {
            self.parse_parameters()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Semicolon)?;
        let locals = self.parse_declarations()?;
        let body = self.parse_compound()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(ProcDecl {
            name,
            params,
            locals,
            body,
            pos: start.pos,
        })
    }

    fn parse_function(&mut self) -> CompileResult<FuncDecl> {
        let start = self.expect(TokenKind::Function)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        let params = if self.check(TokenKind::LParen) {
            self.parse_parameters()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Colon)?;
        let ret = self.parse_type_spec()?;
        self.expect(TokenKind::Semicolon)?;
        let locals = self.parse_declarations()?;
        let body = self.parse_compound()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(FuncDecl {
            name,
            params,
            ret,
            locals,
            body,
            pos: start.pos,
        })
    }

    fn parse_parameters(&mut self) -> CompileResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let by_ref = if self.check(TokenKind::Var) {
                    self.advance();
                    true
                } else {
                    false
                };
                let first = self.expect(TokenKind::Identifier)?;
                let mut names = vec![(first.lexeme, first.pos)];
                while self.check(TokenKind::Comma) {
                    self.advance();
                    let tok = self.expect(TokenKind::Identifier)?;
                    names.push((tok.lexeme, tok.pos));
                }
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type_spec()?;
                for (name, pos) in names {
                    params.push(Param {
                        name,
                        ty: ty.clone(),
                        by_ref,
                        pos,
                    });
                }
                if !self.check(TokenKind::Semicolon) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_type_spec(&mut self) -> CompileResult<TypeSpec> {
        let tok = self.current().clone();
        let simple = match tok.kind {
            TokenKind::Array => return self.parse_array_type(),
            TokenKind::Integer => SimpleType::Integer,
            TokenKind::Real => SimpleType::Real,
            TokenKind::Boolean => SimpleType::Boolean,
            TokenKind::Char => SimpleType::Char,
            TokenKind::StringKw => SimpleType::Str,
            _ => {
                return Err(CompileError::syntax(
                    format!("Expected type specification, got {}", tok.describe()),
                    tok.pos,
                ))
            }
        };
        self.advance();
        Ok(TypeSpec::Simple {
            name: simple,
            pos: tok.pos,
        })
    }

    fn parse_array_type(&mut self) -> CompileResult<TypeSpec> {
        let start = self.expect(TokenKind::Array)?;
        self.expect(TokenKind::LBracket)?;
        let mut ranges = vec![self.parse_range()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            ranges.push(self.parse_range()?);
        }
        self.expect(TokenKind::RBracket)?;
        self.expect(TokenKind::Of)?;
        let elem = self.parse_type_spec()?;
        Ok(TypeSpec::Array {
            ranges,
            elem: Box::new(elem),
            pos: start.pos,
        })
    }

    fn parse_range(&mut self) -> CompileResult<(i64, i64)> {
        let lo = self.parse_index_bound()?;
        self.expect(TokenKind::DotDot)?;
        let hi = self.parse_index_bound()?;
        Ok((lo, hi))
    }

    fn parse_index_bound(&mut self) -> CompileResult<i64> {
        let negative = if self.check(TokenKind::Minus) {
            self.advance();
            true
        } else {
            false
        };
        let tok = self.expect(TokenKind::IntLiteral)?;
        let value = tok
            .lexeme
            .parse::<i64>()
            .map_err(|_| CompileError::syntax("Invalid number", tok.pos))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_compound(&mut self) -> CompileResult<Stmt> {
        let start = self.expect(TokenKind::Begin)?;
        let stmts = self.parse_statement_list()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::Compound {
            stmts,
            pos: start.pos,
        })
    }

    fn parse_statement_list(&mut self) -> CompileResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        if !self.check(TokenKind::End) {
            stmts.push(self.parse_statement()?);
            while self.check(TokenKind::Semicolon) {
                self.advance();
                // The terminator before 'end' or 'until' may be omitted.
                if self.check(TokenKind::End) || self.check(TokenKind::Until) {
                    break;
                }
                stmts.push(self.parse_statement()?);
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> CompileResult<Stmt> {
        match self.current().kind {
            TokenKind::Begin => self.parse_compound(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Identifier => self.parse_assignment_or_call(),
            // Empty statement.
            _ => Ok(Stmt::Compound {
                stmts: Vec::new(),
                pos: self.current().pos,
            }),
        }
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let start = self.expect(TokenKind::If)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Then)?;
        let then_branch = Box::new(self.parse_statement()?);
        // 'else' binds to the nearest unmatched 'if'.
        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            pos: start.pos,
        })
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        let start = self.expect(TokenKind::While)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While {
            cond,
            body,
            pos: start.pos,
        })
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let start = self.expect(TokenKind::For)?;
        let var = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::Assign)?;
        let from = self.parse_expression()?;
        let downto = match self.current().kind {
            TokenKind::To => {
                self.advance();
                false
            }
            TokenKind::Downto => {
                self.advance();
                true
            }
            _ => {
                let tok = self.current();
                return Err(CompileError::syntax(
                    format!("Expected 'to' or 'downto', got {}", tok.describe()),
                    tok.pos,
                ));
            }
        };
        let to = self.parse_expression()?;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            var,
            from,
            to,
            downto,
            body,
            pos: start.pos,
        })
    }

    fn parse_repeat(&mut self) -> CompileResult<Stmt> {
        let start = self.expect(TokenKind::Repeat)?;
        let body = self.parse_statement_list()?;
        self.expect(TokenKind::Until)?;
        let cond = self.parse_expression()?;
        Ok(Stmt::Repeat {
            body,
            cond,
            pos: start.pos,
        })
    }

    fn parse_assignment_or_call(&mut self) -> CompileResult<Stmt> {
        let name_tok = self.expect(TokenKind::Identifier)?;
        let name = name_tok.lexeme;
        let pos = name_tok.pos;

        // The I/O builtins get dedicated statement nodes unless the name is
        // being assigned to, in which case the semantic phase rejects it.
        if !self.check(TokenKind::Assign) {
            match name.to_ascii_lowercase().as_str() {
                "write" | "writeln" => {
                    let newline = name.eq_ignore_ascii_case("writeln");
                    let args = self.parse_optional_arguments()?;
                    return Ok(Stmt::Write { args, newline, pos });
                }
                "read" | "readln" => {
                    let newline = name.eq_ignore_ascii_case("readln");
                    let targets = self.parse_optional_arguments()?;
                    return Ok(Stmt::Read {
                        targets,
                        newline,
                        pos,
                    });
                }
                _ => {}
            }
        }

        if self.check(TokenKind::LBracket) {
            let mut target = Expr::Var { name, pos };
            while self.check(TokenKind::LBracket) {
                let indices = self.parse_index_list()?;
                target = Expr::Index {
                    base: Box::new(target),
                    indices,
                    pos,
                };
            }
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expression()?;
            return Ok(Stmt::Assign { target, value, pos });
        }
        if self.check(TokenKind::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Stmt::Assign {
                target: Expr::Var { name, pos },
                value,
                pos,
            });
        }
        if self.check(TokenKind::LParen) {
            let args = self.parse_arguments()?;
            return Ok(Stmt::Call { name, args, pos });
        }
        // Procedure call without arguments.
        Ok(Stmt::Call {
            name,
            args: Vec::new(),
            pos,
        })
    }

    fn parse_optional_arguments(&mut self) -> CompileResult<Vec<Expr>> {
        if self.check(TokenKind::LParen) {
            self.parse_arguments()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_arguments(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_index_list(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(TokenKind::LBracket)?;
        let mut indices = vec![self.parse_expression()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            indices.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(indices)
    }

    fn parse_expression(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Equal => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                _ => return Ok(left),
            };
            let pos = left.pos();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                lhs: Box::new(left),
                op,
                rhs: Box::new(right),
                pos,
            };
        }
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Or => BinOp::Or,
                _ => return Ok(left),
            };
            let pos = left.pos();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                lhs: Box::new(left),
                op,
                rhs: Box::new(right),
                pos,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Div => BinOp::IntDiv,
                TokenKind::Mod => BinOp::Mod,
                TokenKind::And => BinOp::And,
                _ => return Ok(left),
            };
            let pos = left.pos();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                lhs: Box::new(left),
                op,
                rhs: Box::new(right),
                pos,
            };
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Plus => UnOp::Plus,
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not => UnOp::Not,
            _ => return self.parse_atom(),
        };
        let tok = self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            pos: tok.pos,
        })
    }

    fn parse_atom(&mut self) -> CompileResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = tok
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| CompileError::syntax("Invalid number", tok.pos))?;
                Ok(Expr::Int {
                    value,
                    pos: tok.pos,
                })
            }
            TokenKind::RealLiteral => {
                self.advance();
                let value = tok
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| CompileError::syntax("Invalid number", tok.pos))?;
                Ok(Expr::Real {
                    value,
                    pos: tok.pos,
                })
            }
            TokenKind::StrLiteral => {
                self.advance();
                Ok(Expr::Str {
                    value: tok.lexeme,
                    pos: tok.pos,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::Bool {
                    value: tok.kind == TokenKind::True,
                    pos: tok.pos,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call {
                        name: tok.lexeme,
                        args,
                        pos: tok.pos,
                    })
                } else if self.check(TokenKind::LBracket) {
                    let mut expr = Expr::Var {
                        name: tok.lexeme,
                        pos: tok.pos,
                    };
                    while self.check(TokenKind::LBracket) {
                        let indices = self.parse_index_list()?;
                        expr = Expr::Index {
                            base: Box::new(expr),
                            indices,
                            pos: tok.pos,
                        };
                    }
                    Ok(expr)
                } else {
                    Ok(Expr::Var {
                        name: tok.lexeme,
                        pos: tok.pos,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(CompileError::syntax(
                format!("Unexpected token {}", tok.describe()),
                tok.pos,
            )),
        }
    }
}
