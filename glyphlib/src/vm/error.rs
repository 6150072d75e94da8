use std::fmt;

use thiserror::Error;

use crate::bytecode::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    CorruptBytecode,
    StackUnderflow,
    StackOverflow,
    TypeMismatch,
    DivisionByZero,
    UndefinedVariable,
    IndexOutOfBounds,
    FieldNotFound,
    InvalidIterator,
    UnknownBuiltin,
    ArityMismatch,
    BuiltinFailed,
    HostUnavailable,
    HostError,
    StepLimitExceeded,
}

impl VmErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            VmErrorKind::CorruptBytecode => "E-VM-CORRUPT",
            VmErrorKind::StackUnderflow => "E-VM-STACK-UNDERFLOW",
            VmErrorKind::StackOverflow => "E-VM-STACK-OVERFLOW",
            VmErrorKind::TypeMismatch => "E-VM-TYPE",
            VmErrorKind::DivisionByZero => "E-VM-DIV-ZERO",
            VmErrorKind::UndefinedVariable => "E-VM-UNDEFINED-VAR",
            VmErrorKind::IndexOutOfBounds => "E-VM-INDEX-OOB",
            VmErrorKind::FieldNotFound => "E-VM-FIELD",
            VmErrorKind::InvalidIterator => "E-VM-ITER",
            VmErrorKind::UnknownBuiltin => "E-VM-UNKNOWN-BUILTIN",
            VmErrorKind::ArityMismatch => "E-VM-ARITY",
            VmErrorKind::BuiltinFailed => "E-VM-BUILTIN",
            VmErrorKind::HostUnavailable => "E-VM-HOST-UNAVAILABLE",
            VmErrorKind::HostError => "E-VM-HOST",
            VmErrorKind::StepLimitExceeded => "E-VM-STEP-LIMIT",
        }
    }
}

impl fmt::Display for VmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
}

impl VmError {
    pub(crate) fn new(kind: VmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl From<DecodeError> for VmError {
    fn from(err: DecodeError) -> Self {
        VmError::new(VmErrorKind::CorruptBytecode, err.to_string())
    }
}
