//! Compile-time and runtime errors.
//!
//! Every error is fatal for the stage that detects it and is propagated to the caller of
//! the pipeline as is.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("malformed {kind} node: {reason}")]
    MalformedNode { kind: &'static str, reason: String },
    #[error("division by zero in constant expression `{expression}`")]
    Arithmetic {
        operator: String,
        expression: String,
    },
}

impl CompileError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedNode {
            kind,
            reason: reason.into(),
        }
    }
}

/// Errors raised while running a CPS program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("{0} is not callable")]
    NotCallable(String),
    #[error("cannot apply {operator} to {left} and {right}")]
    TypeMismatch {
        operator: String,
        left: String,
        right: String,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("raw code cannot be interpreted: {0}")]
    RawSplice(String),
    #[error("malformed program: {0}")]
    Malformed(String),
    #[error("program finished without calling the top-level continuation")]
    Unfinished,
}
