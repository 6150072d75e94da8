//! VM interpreter loop and instruction dispatch.

mod arith;
mod calls;
mod collections;
mod control_flow;
mod iter;
mod state;
mod ws;

use std::collections::HashMap;

use tracing::trace;

use crate::bytecode::{BytecodeModule, Instr};
use crate::value::{BinaryOp, UnaryOp, Value};

use super::{VmConfig, VmError, VmErrorKind, WebSocketHandler};

pub(super) fn run(
    module: &BytecodeModule,
    locals: HashMap<String, Value>,
    hub: Option<&dyn WebSocketHandler>,
    config: VmConfig,
) -> Result<Value, VmError> {
    let code = &module.code;
    let mut frame = state::Frame::new(module, locals, config.max_stack_depth);
    let mut steps = 0usize;
    let mut ip = 0usize;
    while ip < code.len() {
        steps += 1;
        if steps > config.max_steps {
            return Err(err_at(
                VmErrorKind::StepLimitExceeded,
                format!("step limit exceeded ({})", config.max_steps),
                ip,
            ));
        }
        let instr = code[ip];
        if config.trace {
            trace!(ip, ?instr, depth = frame.stack.len(), "dispatch");
        }
        match instr {
            Instr::Push(idx) => frame.push_const(idx, ip)?,
            Instr::Pop => {
                frame.pop("POP", ip)?;
            }
            Instr::Add => arith::binary(&mut frame, BinaryOp::Add, ip)?,
            Instr::Sub => arith::binary(&mut frame, BinaryOp::Sub, ip)?,
            Instr::Mul => arith::binary(&mut frame, BinaryOp::Mul, ip)?,
            Instr::Div => arith::binary(&mut frame, BinaryOp::Div, ip)?,
            Instr::Mod => arith::binary(&mut frame, BinaryOp::Mod, ip)?,
            Instr::Eq => arith::binary(&mut frame, BinaryOp::Eq, ip)?,
            Instr::Ne => arith::binary(&mut frame, BinaryOp::Ne, ip)?,
            Instr::Lt => arith::binary(&mut frame, BinaryOp::Lt, ip)?,
            Instr::Gt => arith::binary(&mut frame, BinaryOp::Gt, ip)?,
            Instr::Ge => arith::binary(&mut frame, BinaryOp::Ge, ip)?,
            Instr::Le => arith::binary(&mut frame, BinaryOp::Le, ip)?,
            Instr::And => arith::binary(&mut frame, BinaryOp::And, ip)?,
            Instr::Or => arith::binary(&mut frame, BinaryOp::Or, ip)?,
            Instr::Not => arith::unary(&mut frame, UnaryOp::Not, ip)?,
            Instr::Neg => arith::unary(&mut frame, UnaryOp::Neg, ip)?,
            Instr::LoadVar(idx) => frame.load_local(idx, ip)?,
            Instr::StoreVar(idx) => frame.store_local(idx, ip)?,
            Instr::Jump(target) => {
                ip = target as usize;
                continue;
            }
            Instr::JumpIfFalse(target) => {
                if let Some(next_ip) = control_flow::jump_if(&mut frame, target, false, ip)? {
                    ip = next_ip;
                    continue;
                }
            }
            Instr::JumpIfTrue(target) => {
                if let Some(next_ip) = control_flow::jump_if(&mut frame, target, true, ip)? {
                    ip = next_ip;
                    continue;
                }
            }
            Instr::GetIter => iter::get_iter(&mut frame, ip)?,
            Instr::IterNext { with_key } => iter::next(&mut frame, with_key, ip)?,
            Instr::IterHasNext => iter::has_next(&mut frame, ip)?,
            Instr::GetIndex => collections::get_index(&mut frame, ip)?,
            Instr::GetField => collections::get_field(&mut frame, ip)?,
            Instr::BuildArray(n) => collections::build_array(&mut frame, n, ip)?,
            Instr::BuildObject(n) => collections::build_object(&mut frame, n, ip)?,
            Instr::Call(argc) => calls::call(&mut frame, argc, ip)?,
            Instr::WsSend
            | Instr::WsBroadcast
            | Instr::WsBroadcastRoom
            | Instr::WsJoinRoom
            | Instr::WsLeaveRoom
            | Instr::WsClose
            | Instr::WsGetRooms
            | Instr::WsGetClients
            | Instr::WsGetConnCount
            | Instr::WsGetUptime => ws::dispatch(&mut frame, instr, hub, ip)?,
            Instr::Return | Instr::Halt => return Ok(frame.finish_return()),
        }
        ip += 1;
    }
    Ok(frame.finish_return())
}

pub(super) fn err_at(kind: VmErrorKind, message: impl Into<String>, ip: usize) -> VmError {
    let msg = message.into();
    VmError::new(kind, format!("@{ip}: {msg}"))
}
