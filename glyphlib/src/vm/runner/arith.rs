use crate::value::{BinaryOp, OpError, UnaryOp, eval_binary, eval_unary};
use crate::vm::{VmError, VmErrorKind};

use super::state::Frame;

pub(super) fn binary(frame: &mut Frame<'_>, op: BinaryOp, ip: usize) -> Result<(), VmError> {
    let r = frame.pop(op.symbol(), ip)?;
    let l = frame.pop(op.symbol(), ip)?;
    let v = eval_binary(op, &l, &r).map_err(|e| op_error(e, ip))?;
    frame.push(v, ip)
}

pub(super) fn unary(frame: &mut Frame<'_>, op: UnaryOp, ip: usize) -> Result<(), VmError> {
    let v = frame.pop(op.symbol(), ip)?;
    let v = eval_unary(op, &v).map_err(|e| op_error(e, ip))?;
    frame.push(v, ip)
}

fn op_error(err: OpError, ip: usize) -> VmError {
    let kind = match err {
        OpError::DivisionByZero => VmErrorKind::DivisionByZero,
        OpError::TypeMismatch { .. } | OpError::UnaryTypeMismatch { .. } => {
            VmErrorKind::TypeMismatch
        }
    };
    super::err_at(kind, err.to_string(), ip)
}
