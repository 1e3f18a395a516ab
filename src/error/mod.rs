//! Error types for all phases of the toolchain.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("No prefix parse rule for '{found}' at {span}")]
    NoPrefixParse { found: String, span: Span },

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::NoPrefixParse { span, .. } => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Undefined variable '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable(_, span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Runtime errors raised by the VM or the tree-walking interpreter.
///
/// Bytecode carries no source positions, so these have no spans.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Stack overflow")]
    StackOverflow,

    #[error("Wrong number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },

    #[error("Cannot call value of type {0}")]
    NotCallable(String),

    #[error("Unsupported types for binary operation: {left} {op} {right}")]
    UnsupportedOperands {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("Unsupported type for negation: {0}")]
    UnsupportedNegation(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unusable as hash key: {0}")]
    UnhashableKey(String),

    #[error("Index operator not supported on {0}")]
    NotIndexable(String),

    #[error("{0}")]
    General(String),
}

impl RuntimeError {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum MarmotError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
