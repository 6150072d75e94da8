use super::{BytecodeModule, Instr, Operand};
use crate::value::Value;

const MAX_INLINE_CONSTANT: usize = 60;

impl BytecodeModule {
    /// Instruction listing with pool operands resolved inline.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (ip, instr) in self.code.iter().enumerate() {
            out.push_str(&format!("  {:04}  {}\n", ip, fmt_instr(instr, &self.constants)));
        }
        out
    }
}

impl Instr {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Push(_) => "PUSH",
            Instr::Pop => "POP",
            Instr::Add => "ADD",
            Instr::Sub => "SUB",
            Instr::Mul => "MUL",
            Instr::Div => "DIV",
            Instr::Mod => "MOD",
            Instr::Eq => "EQ",
            Instr::Ne => "NE",
            Instr::Lt => "LT",
            Instr::Gt => "GT",
            Instr::Ge => "GE",
            Instr::Le => "LE",
            Instr::And => "AND",
            Instr::Or => "OR",
            Instr::Not => "NOT",
            Instr::Neg => "NEG",
            Instr::LoadVar(_) => "LOAD_VAR",
            Instr::StoreVar(_) => "STORE_VAR",
            Instr::Jump(_) => "JUMP",
            Instr::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Instr::JumpIfTrue(_) => "JUMP_IF_TRUE",
            Instr::GetIter => "GET_ITER",
            Instr::IterNext { .. } => "ITER_NEXT",
            Instr::IterHasNext => "ITER_HAS_NEXT",
            Instr::GetIndex => "GET_INDEX",
            Instr::Return => "RETURN",
            Instr::Call(_) => "CALL",
            Instr::BuildObject(_) => "BUILD_OBJECT",
            Instr::GetField => "GET_FIELD",
            Instr::BuildArray(_) => "BUILD_ARRAY",
            Instr::WsSend => "WS_SEND",
            Instr::WsBroadcast => "WS_BROADCAST",
            Instr::WsBroadcastRoom => "WS_BROADCAST_ROOM",
            Instr::WsJoinRoom => "WS_JOIN_ROOM",
            Instr::WsLeaveRoom => "WS_LEAVE_ROOM",
            Instr::WsClose => "WS_CLOSE",
            Instr::WsGetRooms => "WS_GET_ROOMS",
            Instr::WsGetClients => "WS_GET_CLIENTS",
            Instr::WsGetConnCount => "WS_GET_CONN_COUNT",
            Instr::WsGetUptime => "WS_GET_UPTIME",
            Instr::Halt => "HALT",
        }
    }
}

/// Renders one instruction as `MNEMONIC operand  ; comment`.
pub(crate) fn fmt_instr(instr: &Instr, constants: &[Value]) -> String {
    match (instr.operand(), fmt_comment(instr, constants)) {
        (Some(operand), Some(comment)) => {
            format!("{} {}  ; {}", instr.mnemonic(), operand.raw(), comment)
        }
        _ => instr.mnemonic().to_string(),
    }
}

/// Operand annotation; counts are labelled by what they count.
pub(crate) fn fmt_comment(instr: &Instr, constants: &[Value]) -> Option<String> {
    let operand = instr.operand()?;
    Some(match *instr {
        Instr::BuildArray(n) => format!("{n} elements"),
        Instr::BuildObject(n) => format!("{n} fields"),
        Instr::Call(n) => format!("{n} args"),
        _ => fmt_operand(operand, constants),
    })
}

/// Human-readable meaning of an operand: the inlined constant, the local's
/// name, the jump destination, or the element count.
pub fn fmt_operand(operand: Operand, constants: &[Value]) -> String {
    match operand {
        Operand::Const(i) => match constants.get(i as usize) {
            Some(v) => fmt_constant(v),
            None => format!("<missing constant {i}>"),
        },
        Operand::Local(i) => match constants.get(i as usize).and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => format!("<bad local {i}>"),
        },
        Operand::Target(t) => format!("-> {t:04}"),
        Operand::Count(n) => n.to_string(),
        Operand::Flag(true) => "value and key".to_string(),
        Operand::Flag(false) => "value only".to_string(),
    }
}

pub(crate) fn fmt_constant(v: &Value) -> String {
    let text = v.to_literal_text();
    if text.chars().count() <= MAX_INLINE_CONSTANT {
        return text;
    }
    let mut short: String = text.chars().take(MAX_INLINE_CONSTANT - 3).collect();
    short.push_str("...");
    short
}
