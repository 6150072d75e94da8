use crate::value::Value;
use crate::vm::{VmError, VmErrorKind};

use super::state::Frame;

/// Pops the condition and returns the jump destination when it is taken.
pub(super) fn jump_if(
    frame: &mut Frame<'_>,
    target: u32,
    when: bool,
    ip: usize,
) -> Result<Option<usize>, VmError> {
    match frame.pop("conditional jump", ip)? {
        Value::Bool(v) if v == when => Ok(Some(target as usize)),
        Value::Bool(_) => Ok(None),
        other => Err(super::err_at(
            VmErrorKind::TypeMismatch,
            format!("conditional jump expects bool, got {}", other.type_name()),
            ip,
        )),
    }
}
