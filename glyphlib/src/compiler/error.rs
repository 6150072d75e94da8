use std::fmt;

use thiserror::Error;

/// The two failure buckets callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The program is provably wrong. Never fall back to another executor.
    Semantic,
    /// The program may be fine but uses a construct the compiler does not lower.
    Unsupported,
}

impl CompileErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CompileErrorKind::Semantic => "E-COMPILE-SEMANTIC",
            CompileErrorKind::Unsupported => "E-COMPILE-UNSUPPORTED",
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::Semantic => write!(f, "semantic error"),
            CompileErrorKind::Unsupported => write!(f, "unsupported construct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
}

impl CompileError {
    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Semantic,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Unsupported,
            message: message.into(),
        }
    }

    pub fn is_semantic(&self) -> bool {
        self.kind == CompileErrorKind::Semantic
    }

    /// True when the caller may run the item through the interpreter instead.
    pub fn is_recoverable(&self) -> bool {
        self.kind == CompileErrorKind::Unsupported
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Prefixes the message, keeping the kind.
    pub(crate) fn in_context(self, context: &str) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }
}
