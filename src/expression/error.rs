use std::fmt;

/// Lexer/parser error with a byte offset into the script source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExprError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl ExprError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ExprError {}

/// Why an embedded script could not produce a value.
///
/// Always recoverable: callers substitute a default and report a diagnostic.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalFault {
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("undefined identifier '{name}'")]
    UndefinedIdentifier { name: String, offset: usize },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String, offset: usize },

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl EvalFault {
    pub(crate) fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Byte offset into the script, when the fault is tied to a token.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Syntax { offset, .. }
            | Self::UndefinedIdentifier { offset, .. }
            | Self::UnknownFunction { offset, .. } => Some(*offset),
            Self::Arity { .. } | Self::Type(_) | Self::Runtime(_) => None,
        }
    }
}

impl From<ExprError> for EvalFault {
    fn from(e: ExprError) -> Self {
        Self::Syntax {
            offset: e.offset,
            message: e.message,
        }
    }
}
