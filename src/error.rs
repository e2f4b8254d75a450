use std::process::ExitStatus;

use thiserror::Error;

use crate::analyzer::{SymbolError, Type, TypeError};
use crate::parser::AstOp;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Everything that can abort a compilation. The first error wins: nothing
/// is recovered or accumulated.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: undeclared identifier `{name}`")]
    Undeclared { line: usize, name: String },

    #[error("line {line}: {source}")]
    Symbol { line: usize, source: SymbolError },

    #[error("line {line}: {source}")]
    Type { line: usize, source: TypeError },

    #[error("line {line}: type mismatch: {message}")]
    TypeMismatch { line: usize, message: String },

    #[error("line {line}: incompatible types in {context}")]
    IncompatibleTypes { line: usize, context: String },

    #[error("line {line}: function `{name}` does not end with a return statement")]
    MissingReturn { line: usize, name: String },

    #[error("line {line}: invalid size for array `{name}`")]
    InvalidArraySize { line: usize, name: String },

    #[error("line {line}: {message}")]
    InvalidLvalue { line: usize, message: String },

    #[error("line {line}: `{keyword}` is not allowed here")]
    Misplaced { line: usize, keyword: &'static str },

    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("`{program}` failed with {status}")]
    Toolchain { program: String, status: ExitStatus },
}

/// Defects in the compiler itself. None of these should be reachable from an
/// AST the parser is able to build.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("AST operator {0:?} cannot be generated here")]
    UnknownOperator(AstOp),

    #[error("no free register left")]
    RegisterExhausted,

    #[error("register index {0} is out of range")]
    InvalidRegister(usize),

    #[error("register {0} is not allocated")]
    RegisterNotBusy(&'static str),

    #[error("type {0:?} has no machine representation")]
    UnrepresentableType(Type),

    #[error("symbol slot {0} does not exist")]
    InvalidSymbol(usize),

    #[error("a token has already been pushed back")]
    DoublePushBack,

    #[error("no jump target for {0:?}")]
    MissingJumpTarget(AstOp),
}
