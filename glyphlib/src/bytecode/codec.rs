use indexmap::IndexMap;
use thiserror::Error;

use super::{BYTECODE_VERSION, BytecodeModule, HEADER_LEN, Instr, MAGIC};
use crate::value::Value;

const TAG_NULL: u8 = 0x00;
const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_BOOL: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_ARRAY: u8 = 0x05;
const TAG_OBJECT: u8 = 0x06;

const MAX_CONSTANT_DEPTH: usize = 64;

/// Malformed, truncated or foreign bytecode. Offsets are byte positions in the
/// input buffer; instruction positions are instruction indices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid bytecode: too short ({len} bytes, header needs {header})", header = HEADER_LEN)]
    TooShort { len: usize },
    #[error("invalid bytecode: bad magic bytes {found:02x?}, expected {magic:02x?}", magic = MAGIC)]
    BadMagic { found: [u8; 4] },
    #[error("invalid bytecode: unsupported version {found}, expected {expected}")]
    UnsupportedVersion { expected: u16, found: u16 },
    #[error("invalid bytecode: unexpected end of input at offset {offset} reading {context} ({needed} bytes needed)")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        context: &'static str,
    },
    #[error("invalid bytecode: unknown constant tag 0x{tag:02x} at offset {offset}")]
    UnknownConstantTag { offset: usize, tag: u8 },
    #[error("invalid bytecode: constant at offset {offset} declares {declared} payload bytes but uses {consumed}")]
    LengthMismatch {
        offset: usize,
        declared: usize,
        consumed: usize,
    },
    #[error("invalid bytecode: bool constant at offset {offset} has byte {found}, expected 0 or 1")]
    InvalidBool { offset: usize, found: u8 },
    #[error("invalid bytecode: object constant at offset {offset} repeats key {key:?}")]
    DuplicateKey { offset: usize, key: String },
    #[error("invalid bytecode: string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("invalid bytecode: constant nesting exceeds {max} levels at offset {offset}", max = MAX_CONSTANT_DEPTH)]
    NestingTooDeep { offset: usize },
    #[error("invalid bytecode: unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("invalid bytecode: {count} trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },
    #[error("invalid bytecode: instruction {at} references constant {index}, pool has {len}")]
    ConstantOutOfBounds { at: usize, index: u32, len: usize },
    #[error("invalid bytecode: instruction {at} names local with constant {index}, which is {found}, expected string")]
    LocalNotString {
        at: usize,
        index: u32,
        found: &'static str,
    },
    #[error("invalid bytecode: instruction {at} jumps to {target}, stream has {len} instructions")]
    JumpOutOfBounds { at: usize, target: u32, len: usize },
    #[error("invalid bytecode: instruction at offset {offset} has flag {found}, expected 0 or 1")]
    InvalidFlag { offset: usize, found: u32 },
}

impl BytecodeModule {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 8 + self.code.len() * 5);
        out.extend_from_slice(MAGIC);
        write_u16(&mut out, self.version);
        write_u32(&mut out, self.constants.len() as u32);
        for value in &self.constants {
            encode_constant(value, &mut out);
        }
        write_u32(&mut out, self.code.len() as u32);
        for instr in &self.code {
            encode_instr(instr, &mut out);
        }
        out
    }

    /// Decodes and validates a container. Never panics on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }
        let mut rd = Reader { bytes, idx: 0 };
        let magic = rd.read_exact(4, "magic")?;
        if magic != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(DecodeError::BadMagic { found });
        }
        let version = rd.read_u16("version")?;
        if version != BYTECODE_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                expected: BYTECODE_VERSION,
                found: version,
            });
        }

        let const_count = rd.read_u32("constant count")? as usize;
        // every entry takes at least a tag and a length
        let mut constants = Vec::with_capacity(const_count.min(rd.remaining() / 5));
        for _ in 0..const_count {
            constants.push(decode_constant(&mut rd, 0)?);
        }

        let code_len = rd.read_u32("instruction count")? as usize;
        let mut code = Vec::with_capacity(code_len.min(rd.remaining()));
        for _ in 0..code_len {
            code.push(decode_instr(&mut rd)?);
        }
        if rd.remaining() > 0 {
            return Err(DecodeError::TrailingBytes {
                offset: rd.idx,
                count: rd.remaining(),
            });
        }

        let module = Self {
            version,
            constants,
            code,
        };
        module.validate()?;
        Ok(module)
    }
}

fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}
fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn encode_constant(v: &Value, out: &mut Vec<u8>) {
    let (tag, payload) = match v {
        Value::Null => (TAG_NULL, Vec::new()),
        Value::Int(n) => (TAG_INT, n.to_le_bytes().to_vec()),
        Value::Float(n) => (TAG_FLOAT, n.to_bits().to_le_bytes().to_vec()),
        Value::Bool(b) => (TAG_BOOL, vec![*b as u8]),
        Value::String(s) => (TAG_STRING, s.as_bytes().to_vec()),
        Value::Array(items) => {
            let mut payload = Vec::new();
            write_u32(&mut payload, items.len() as u32);
            for item in items {
                encode_constant(item, &mut payload);
            }
            (TAG_ARRAY, payload)
        }
        Value::Object(fields) => {
            let mut payload = Vec::new();
            write_u32(&mut payload, fields.len() as u32);
            for (key, value) in fields {
                write_str(&mut payload, key);
                encode_constant(value, &mut payload);
            }
            (TAG_OBJECT, payload)
        }
    };
    write_u8(out, tag);
    write_u32(out, payload.len() as u32);
    out.extend_from_slice(&payload);
}

fn encode_instr(i: &Instr, out: &mut Vec<u8>) {
    write_u8(out, opcode_of(i));
    if let Some(operand) = i.operand() {
        write_u32(out, operand.raw());
    }
}

pub(super) fn opcode_of(i: &Instr) -> u8 {
    match i {
        Instr::Push(_) => 0x01,
        Instr::Pop => 0x02,
        Instr::Add => 0x10,
        Instr::Sub => 0x11,
        Instr::Mul => 0x12,
        Instr::Div => 0x13,
        Instr::Mod => 0x14,
        Instr::Eq => 0x20,
        Instr::Ne => 0x21,
        Instr::Lt => 0x22,
        Instr::Gt => 0x23,
        Instr::Ge => 0x24,
        Instr::Le => 0x25,
        Instr::And => 0x26,
        Instr::Or => 0x27,
        Instr::Not => 0x28,
        Instr::Neg => 0x29,
        Instr::LoadVar(_) => 0x40,
        Instr::StoreVar(_) => 0x41,
        Instr::Jump(_) => 0x50,
        Instr::JumpIfFalse(_) => 0x51,
        Instr::JumpIfTrue(_) => 0x52,
        Instr::GetIter => 0x53,
        Instr::IterNext { .. } => 0x54,
        Instr::IterHasNext => 0x55,
        Instr::GetIndex => 0x56,
        Instr::Return => 0x61,
        Instr::Call(_) => 0x62,
        Instr::BuildObject(_) => 0x70,
        Instr::GetField => 0x71,
        Instr::BuildArray(_) => 0x80,
        Instr::WsSend => 0xA0,
        Instr::WsBroadcast => 0xA1,
        Instr::WsBroadcastRoom => 0xA2,
        Instr::WsJoinRoom => 0xA3,
        Instr::WsLeaveRoom => 0xA4,
        Instr::WsClose => 0xA5,
        Instr::WsGetRooms => 0xA6,
        Instr::WsGetClients => 0xA7,
        Instr::WsGetConnCount => 0xA8,
        Instr::WsGetUptime => 0xA9,
        Instr::Halt => 0xFF,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.idx
    }

    fn read_exact(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.idx,
                needed: n,
                context,
            });
        }
        let start = self.idx;
        self.idx += n;
        Ok(&self.bytes[start..self.idx])
    }

    fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read_exact(1, context)?[0])
    }

    fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        let mut arr = [0u8; 2];
        arr.copy_from_slice(self.read_exact(2, context)?);
        Ok(u16::from_le_bytes(arr))
    }

    fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(self.read_exact(4, context)?);
        Ok(u32::from_le_bytes(arr))
    }

    fn read_u64(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.read_exact(8, context)?);
        Ok(u64::from_le_bytes(arr))
    }

    fn read_str(&mut self, len: usize, context: &'static str) -> Result<String, DecodeError> {
        let offset = self.idx;
        let bytes = self.read_exact(len, context)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }
}

fn decode_constant(rd: &mut Reader<'_>, depth: usize) -> Result<Value, DecodeError> {
    let offset = rd.idx;
    if depth > MAX_CONSTANT_DEPTH {
        return Err(DecodeError::NestingTooDeep { offset });
    }
    let tag = rd.read_u8("constant tag")?;
    let declared = rd.read_u32("constant length")? as usize;
    if declared > rd.remaining() {
        return Err(DecodeError::UnexpectedEof {
            offset: rd.idx,
            needed: declared,
            context: "constant payload",
        });
    }
    let payload_start = rd.idx;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_INT => Value::Int(rd.read_u64("int constant")? as i64),
        TAG_FLOAT => Value::Float(f64::from_bits(rd.read_u64("float constant")?)),
        TAG_BOOL => {
            let at = rd.idx;
            match rd.read_u8("bool constant")? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                found => return Err(DecodeError::InvalidBool { offset: at, found }),
            }
        }
        TAG_STRING => Value::String(rd.read_str(declared, "string constant")?),
        TAG_ARRAY => {
            let count = rd.read_u32("array length")? as usize;
            let mut items = Vec::with_capacity(count.min(declared / 5));
            for _ in 0..count {
                items.push(decode_constant(rd, depth + 1)?);
            }
            Value::Array(items)
        }
        TAG_OBJECT => {
            let count = rd.read_u32("object length")? as usize;
            let mut fields = IndexMap::with_capacity(count.min(declared / 9));
            for _ in 0..count {
                let key_at = rd.idx;
                let key_len = rd.read_u32("object key length")? as usize;
                let key = rd.read_str(key_len, "object key")?;
                if fields.contains_key(&key) {
                    return Err(DecodeError::DuplicateKey {
                        offset: key_at,
                        key,
                    });
                }
                let value = decode_constant(rd, depth + 1)?;
                fields.insert(key, value);
            }
            Value::Object(fields)
        }
        tag => return Err(DecodeError::UnknownConstantTag { offset, tag }),
    };
    let consumed = rd.idx - payload_start;
    if consumed != declared {
        return Err(DecodeError::LengthMismatch {
            offset,
            declared,
            consumed,
        });
    }
    Ok(value)
}

fn decode_instr(rd: &mut Reader<'_>) -> Result<Instr, DecodeError> {
    let offset = rd.idx;
    let opcode = rd.read_u8("opcode")?;
    let instr = match opcode {
        0x01 => Instr::Push(rd.read_u32("push operand")?),
        0x02 => Instr::Pop,
        0x10 => Instr::Add,
        0x11 => Instr::Sub,
        0x12 => Instr::Mul,
        0x13 => Instr::Div,
        0x14 => Instr::Mod,
        0x20 => Instr::Eq,
        0x21 => Instr::Ne,
        0x22 => Instr::Lt,
        0x23 => Instr::Gt,
        0x24 => Instr::Ge,
        0x25 => Instr::Le,
        0x26 => Instr::And,
        0x27 => Instr::Or,
        0x28 => Instr::Not,
        0x29 => Instr::Neg,
        0x40 => Instr::LoadVar(rd.read_u32("local operand")?),
        0x41 => Instr::StoreVar(rd.read_u32("local operand")?),
        0x50 => Instr::Jump(rd.read_u32("jump target")?),
        0x51 => Instr::JumpIfFalse(rd.read_u32("jump target")?),
        0x52 => Instr::JumpIfTrue(rd.read_u32("jump target")?),
        0x53 => Instr::GetIter,
        0x54 => {
            let flag = rd.read_u32("iterator flag")?;
            if flag > 1 {
                return Err(DecodeError::InvalidFlag {
                    offset,
                    found: flag,
                });
            }
            Instr::IterNext {
                with_key: flag == 1,
            }
        }
        0x55 => Instr::IterHasNext,
        0x56 => Instr::GetIndex,
        0x61 => Instr::Return,
        0x62 => Instr::Call(rd.read_u32("argument count")?),
        0x70 => Instr::BuildObject(rd.read_u32("field count")?),
        0x71 => Instr::GetField,
        0x80 => Instr::BuildArray(rd.read_u32("element count")?),
        0xA0 => Instr::WsSend,
        0xA1 => Instr::WsBroadcast,
        0xA2 => Instr::WsBroadcastRoom,
        0xA3 => Instr::WsJoinRoom,
        0xA4 => Instr::WsLeaveRoom,
        0xA5 => Instr::WsClose,
        0xA6 => Instr::WsGetRooms,
        0xA7 => Instr::WsGetClients,
        0xA8 => Instr::WsGetConnCount,
        0xA9 => Instr::WsGetUptime,
        0xFF => Instr::Halt,
        opcode => return Err(DecodeError::UnknownOpcode { offset, opcode }),
    };
    Ok(instr)
}
