//! Crate root: wires together the compilation pipeline.
//!
//! The phases run strictly in sequence; each hands its artifact to the
//! next or aborts with the first diagnostic:
//! - `lexer` turns source text into a flat token stream.
//! - `parser` owns all syntactic knowledge and builds the program AST.
//! - `sema` enforces declaration, scoping and type rules.
//! - `codegen` lowers the validated AST to three-address code text.
//! - `error` centralises the diagnostics shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod token;

pub use error::{CompileError, CompileResult};

/// Compile Pascal source text into three-address code.
pub fn compile(source: &str) -> CompileResult<String> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::Parser::new(tokens).parse()?;
    let env = sema::check(&program)?;
    Ok(codegen::TacGen::new(&env).generate(&program))
}
