//! Shared diagnostics for the compilation pipeline.
//!
//! Every diagnostic carries a phase prefix, a message and the 1-based
//! source position of the offending construct. The first violation in a
//! phase aborts the compilation; later phases do not run.

use thiserror::Error;

use crate::token::Pos;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Lexical and syntactic violations.
    #[error("Syntax Error: {message} at {pos}")]
    Syntax { message: String, pos: Pos },

    /// Declaration, scoping and type violations.
    #[error("Semantic Error: {message} at {pos}")]
    Semantic { message: String, pos: Pos },
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, pos: Pos) -> Self {
        Self::Syntax {
            message: message.into(),
            pos,
        }
    }

    pub fn semantic(message: impl Into<String>, pos: Pos) -> Self {
        Self::Semantic {
            message: message.into(),
            pos,
        }
    }
}
