use indexmap::IndexMap;

use crate::value::Value;
use crate::vm::{VmError, VmErrorKind};

use super::err_at;
use super::state::Frame;

pub(super) fn build_array(frame: &mut Frame<'_>, n: u32, ip: usize) -> Result<(), VmError> {
    let items = frame.pop_n(n as usize, "BUILD_ARRAY", ip)?;
    frame.push(Value::Array(items), ip)
}

/// Pops `n` (key, value) pairs pushed in source order.
pub(super) fn build_object(frame: &mut Frame<'_>, n: u32, ip: usize) -> Result<(), VmError> {
    let flat = frame.pop_n(2 * n as usize, "BUILD_OBJECT", ip)?;
    let mut fields = IndexMap::with_capacity(n as usize);
    let mut it = flat.into_iter();
    while let (Some(key), Some(value)) = (it.next(), it.next()) {
        let Value::String(key) = key else {
            return Err(err_at(
                VmErrorKind::TypeMismatch,
                format!("object keys must be strings, got {}", key.type_name()),
                ip,
            ));
        };
        fields.insert(key, value);
    }
    frame.push(Value::Object(fields), ip)
}

pub(super) fn get_index(frame: &mut Frame<'_>, ip: usize) -> Result<(), VmError> {
    let index = frame.pop("GET_INDEX", ip)?;
    let target = frame.pop("GET_INDEX", ip)?;
    let v = match (target, index) {
        (Value::Array(mut items), Value::Int(i)) => {
            let len = items.len();
            if i < 0 || i as usize >= len {
                return Err(err_at(
                    VmErrorKind::IndexOutOfBounds,
                    format!("index {i} out of bounds for array of length {len}"),
                    ip,
                ));
            }
            items.swap_remove(i as usize)
        }
        (Value::Object(mut fields), Value::String(key)) => {
            let Some(v) = fields.swap_remove(&key) else {
                return Err(err_at(
                    VmErrorKind::FieldNotFound,
                    format!("object has no key `{key}`"),
                    ip,
                ));
            };
            v
        }
        (target, index) => {
            return Err(err_at(
                VmErrorKind::TypeMismatch,
                format!(
                    "cannot index {} with {}",
                    target.type_name(),
                    index.type_name()
                ),
                ip,
            ));
        }
    };
    frame.push(v, ip)
}

pub(super) fn get_field(frame: &mut Frame<'_>, ip: usize) -> Result<(), VmError> {
    let name = frame.pop("GET_FIELD", ip)?;
    let target = frame.pop("GET_FIELD", ip)?;
    let Value::String(name) = name else {
        return Err(err_at(
            VmErrorKind::TypeMismatch,
            format!("field name must be a string, got {}", name.type_name()),
            ip,
        ));
    };
    let Value::Object(mut fields) = target else {
        return Err(err_at(
            VmErrorKind::TypeMismatch,
            format!("cannot read field `{name}` of {}", target.type_name()),
            ip,
        ));
    };
    let Some(v) = fields.swap_remove(&name) else {
        return Err(err_at(
            VmErrorKind::FieldNotFound,
            format!("object has no field `{name}`"),
            ip,
        ));
    };
    frame.push(v, ip)
}
