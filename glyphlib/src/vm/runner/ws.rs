use crate::bytecode::Instr;
use crate::value::Value;
use crate::vm::{HostError, VmError, VmErrorKind, WebSocketHandler};

use super::err_at;
use super::state::Frame;

/// Runs one `WS_*` opcode. Every opcode leaves exactly one value: `null` for
/// actions, the answer for queries.
pub(super) fn dispatch(
    frame: &mut Frame<'_>,
    instr: Instr,
    ws: Option<&dyn WebSocketHandler>,
    ip: usize,
) -> Result<(), VmError> {
    let Some(hub) = ws else {
        let v = match instr {
            Instr::WsGetConnCount | Instr::WsGetUptime => Value::Int(0),
            _ => {
                return Err(err_at(
                    VmErrorKind::HostUnavailable,
                    format!("{} needs a WebSocket handler", instr.mnemonic()),
                    ip,
                ));
            }
        };
        return frame.push(v, ip);
    };
    let host = |r: Result<(), HostError>| r.map_err(|e| host_error(instr, e, ip));
    let v = match instr {
        Instr::WsSend => {
            let msg = frame.pop("WS_SEND", ip)?;
            host(hub.send(&msg))?;
            Value::Null
        }
        Instr::WsBroadcast => {
            let msg = frame.pop("WS_BROADCAST", ip)?;
            host(hub.broadcast(&msg))?;
            Value::Null
        }
        Instr::WsBroadcastRoom => {
            let msg = frame.pop("WS_BROADCAST_ROOM", ip)?;
            let room = pop_room(frame, instr, ip)?;
            host(hub.broadcast_to_room(&room, &msg))?;
            Value::Null
        }
        Instr::WsJoinRoom => {
            let room = pop_room(frame, instr, ip)?;
            host(hub.join_room(&room))?;
            Value::Null
        }
        Instr::WsLeaveRoom => {
            let room = pop_room(frame, instr, ip)?;
            host(hub.leave_room(&room))?;
            Value::Null
        }
        Instr::WsClose => {
            let reason = match frame.pop("WS_CLOSE", ip)? {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            host(hub.close(&reason))?;
            Value::Null
        }
        Instr::WsGetRooms => strings(hub.rooms().map_err(|e| host_error(instr, e, ip))?),
        Instr::WsGetClients => {
            let room = pop_room(frame, instr, ip)?;
            strings(
                hub.room_clients(&room)
                    .map_err(|e| host_error(instr, e, ip))?,
            )
        }
        Instr::WsGetConnCount => Value::Int(
            hub.connection_count()
                .map_err(|e| host_error(instr, e, ip))?,
        ),
        Instr::WsGetUptime => Value::Int(hub.uptime().map_err(|e| host_error(instr, e, ip))?),
        other => {
            return Err(err_at(
                VmErrorKind::CorruptBytecode,
                format!("{} is not a WebSocket opcode", other.mnemonic()),
                ip,
            ));
        }
    };
    frame.push(v, ip)
}

fn pop_room(frame: &mut Frame<'_>, instr: Instr, ip: usize) -> Result<String, VmError> {
    match frame.pop(instr.mnemonic(), ip)? {
        Value::String(room) => Ok(room),
        other => Err(err_at(
            VmErrorKind::TypeMismatch,
            format!(
                "{} expects a room name string, got {}",
                instr.mnemonic(),
                other.type_name()
            ),
            ip,
        )),
    }
}

fn strings(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

fn host_error(instr: Instr, err: HostError, ip: usize) -> VmError {
    err_at(
        VmErrorKind::HostError,
        format!("{} failed: {err}", instr.mnemonic()),
        ip,
    )
}
