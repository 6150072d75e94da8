use crate::value::Value;
use crate::vm::builtins::call_builtin;
use crate::vm::{VmError, VmErrorKind};

use super::err_at;
use super::state::Frame;

/// `CALL argc`: the callee name sits below its arguments.
pub(super) fn call(frame: &mut Frame<'_>, argc: u32, ip: usize) -> Result<(), VmError> {
    let args = frame.pop_n(argc as usize, "CALL", ip)?;
    let Value::String(name) = frame.pop("CALL", ip)? else {
        return Err(err_at(
            VmErrorKind::TypeMismatch,
            "CALL expects a function name below its arguments",
            ip,
        ));
    };
    let v = call_builtin(&name, args).map_err(|e| err_at(e.kind, e.message, ip))?;
    frame.push(v, ip)
}
