use crate::value::Value;
use crate::vm::{VmError, VmErrorKind};

use super::err_at;
use super::state::Frame;

/// A snapshot of the collection taken by `GET_ITER`; later writes to the
/// source local do not affect the loop.
pub(super) struct IterState {
    entries: Vec<(Value, Value)>,
    pos: usize,
}

pub(super) fn get_iter(frame: &mut Frame<'_>, ip: usize) -> Result<(), VmError> {
    let entries = match frame.pop("GET_ITER", ip)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v))
            .collect(),
        Value::Object(fields) => fields
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect(),
        other => {
            return Err(err_at(
                VmErrorKind::TypeMismatch,
                format!("cannot iterate over {}", other.type_name()),
                ip,
            ));
        }
    };
    let state = IterState { entries, pos: 0 };
    let handle = match frame.iters.iter().position(Option::is_none) {
        Some(free) => {
            frame.iters[free] = Some(state);
            free
        }
        None => {
            frame.iters.push(Some(state));
            frame.iters.len() - 1
        }
    };
    frame.push(Value::Int(handle as i64), ip)
}

/// An exhausted iterator gives its slot back so loops nested in loops do not
/// pile up snapshots.
pub(super) fn has_next(frame: &mut Frame<'_>, ip: usize) -> Result<(), VmError> {
    let handle = pop_handle(frame, "ITER_HAS_NEXT", ip)?;
    let slot = &mut frame.iters[handle];
    let more = slot.as_ref().is_some_and(|it| it.pos < it.entries.len());
    if !more {
        *slot = None;
    }
    frame.push(Value::Bool(more), ip)
}

pub(super) fn next(frame: &mut Frame<'_>, with_key: bool, ip: usize) -> Result<(), VmError> {
    let handle = pop_handle(frame, "ITER_NEXT", ip)?;
    let Some(it) = frame.iters[handle].as_mut() else {
        return Err(err_at(
            VmErrorKind::InvalidIterator,
            format!("iterator {handle} is exhausted"),
            ip,
        ));
    };
    let Some((key, value)) = it.entries.get(it.pos).cloned() else {
        return Err(err_at(
            VmErrorKind::InvalidIterator,
            format!("iterator {handle} is exhausted"),
            ip,
        ));
    };
    it.pos += 1;
    frame.push(value, ip)?;
    if with_key {
        frame.push(key, ip)?;
    }
    Ok(())
}

fn pop_handle(frame: &mut Frame<'_>, what: &str, ip: usize) -> Result<usize, VmError> {
    match frame.pop(what, ip)? {
        Value::Int(h) if h >= 0 && (h as usize) < frame.iters.len() => Ok(h as usize),
        Value::Int(h) => Err(invalid(h, ip)),
        other => Err(err_at(
            VmErrorKind::InvalidIterator,
            format!("{what} expects an iterator handle, got {}", other.type_name()),
            ip,
        )),
    }
}

fn invalid(handle: impl std::fmt::Display, ip: usize) -> VmError {
    err_at(
        VmErrorKind::InvalidIterator,
        format!("no iterator with handle {handle}"),
        ip,
    )
}
