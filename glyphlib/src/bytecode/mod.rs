//! Bytecode container and instruction set.
//!
//! Internals are split into:
//! - `codec`: binary encoding/decoding of the container
//! - `validate`: operand bounds checks run after every decode
//! - `disasm`: instruction mnemonics and listing helpers

mod codec;
mod disasm;
mod validate;

pub use codec::DecodeError;
pub use disasm::fmt_operand;
pub(crate) use disasm::{fmt_comment, fmt_constant, fmt_instr};

use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"GLYP";
/// Bumped whenever opcode semantics or operand layout change.
pub const BYTECODE_VERSION: u16 = 1;
/// Magic plus version.
pub const HEADER_LEN: usize = 6;

/// One decoded instruction. Operands are pool indices, instruction indices or
/// counts depending on the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instr {
    Push(u32),
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Ge,
    Le,
    And,
    Or,
    Not,
    Neg,
    LoadVar(u32),
    StoreVar(u32),
    Jump(u32),
    JumpIfFalse(u32),
    JumpIfTrue(u32),
    GetIter,
    IterNext { with_key: bool },
    IterHasNext,
    GetIndex,
    Return,
    Call(u32),
    BuildObject(u32),
    GetField,
    BuildArray(u32),
    WsSend,
    WsBroadcast,
    WsBroadcastRoom,
    WsJoinRoom,
    WsLeaveRoom,
    WsClose,
    WsGetRooms,
    WsGetClients,
    WsGetConnCount,
    WsGetUptime,
    Halt,
}

/// How an instruction's operand is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Const(u32),
    Local(u32),
    Target(u32),
    Count(u32),
    Flag(bool),
}

impl Operand {
    pub fn raw(self) -> u32 {
        match self {
            Operand::Const(n) | Operand::Local(n) | Operand::Target(n) | Operand::Count(n) => n,
            Operand::Flag(b) => b as u32,
        }
    }
}

impl Instr {
    pub fn operand(&self) -> Option<Operand> {
        match *self {
            Instr::Push(i) => Some(Operand::Const(i)),
            Instr::LoadVar(i) | Instr::StoreVar(i) => Some(Operand::Local(i)),
            Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) => {
                Some(Operand::Target(t))
            }
            Instr::Call(n) | Instr::BuildObject(n) | Instr::BuildArray(n) => {
                Some(Operand::Count(n))
            }
            Instr::IterNext { with_key } => Some(Operand::Flag(with_key)),
            _ => None,
        }
    }

    pub fn jump_target(&self) -> Option<u32> {
        match *self {
            Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) => Some(t),
            _ => None,
        }
    }

    /// Same instruction with its jump target replaced; non-jumps are returned as is.
    pub fn with_target(self, target: u32) -> Self {
        match self {
            Instr::Jump(_) => Instr::Jump(target),
            Instr::JumpIfFalse(_) => Instr::JumpIfFalse(target),
            Instr::JumpIfTrue(_) => Instr::JumpIfTrue(target),
            other => other,
        }
    }

    /// Same instruction with its constant/local pool index replaced.
    pub fn with_pool_index(self, index: u32) -> Self {
        match self {
            Instr::Push(_) => Instr::Push(index),
            Instr::LoadVar(_) => Instr::LoadVar(index),
            Instr::StoreVar(_) => Instr::StoreVar(index),
            other => other,
        }
    }

    pub fn pool_index(&self) -> Option<u32> {
        match *self {
            Instr::Push(i) | Instr::LoadVar(i) | Instr::StoreVar(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Return | Instr::Halt | Instr::Jump(_))
    }
}

/// An executable unit: constant pool plus a linear instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeModule {
    pub version: u16,
    pub constants: Vec<Value>,
    pub code: Vec<Instr>,
}

impl Default for BytecodeModule {
    fn default() -> Self {
        Self {
            version: BYTECODE_VERSION,
            constants: Vec::new(),
            code: Vec::new(),
        }
    }
}

impl BytecodeModule {
    pub fn new(constants: Vec<Value>, code: Vec<Instr>) -> Self {
        Self {
            version: BYTECODE_VERSION,
            constants,
            code,
        }
    }

    pub fn constant(&self, index: u32) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    /// Name of the local referenced by a `LoadVar`/`StoreVar` operand.
    pub fn local_name(&self, index: u32) -> Option<&str> {
        self.constant(index).and_then(Value::as_str)
    }
}
