//! Symbolic execution of straight-line code into GLYPH-like statements.

use std::collections::HashSet;

use super::DecompiledResult;
use crate::bytecode::{Instr, fmt_instr};
use crate::value::Value;

const HEADER: &str = "# Decompiled GLYPH source (best-effort reconstruction)";
const ASM_MARKER: &str =
    "# --- not reconstructed: remaining instructions as annotated disassembly ---";
const INDENT: &str = "  ";

/// An expression being rebuilt on the symbolic stack.
#[derive(Debug, Clone)]
struct Expr {
    text: String,
    /// Safe to embed as an operand without parentheses.
    atomic: bool,
    /// Set when the expression is a string literal; used for object keys and
    /// field names.
    literal: Option<String>,
}

impl Expr {
    fn atom(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            atomic: true,
            literal: None,
        }
    }

    fn compound(text: String) -> Self {
        Self {
            text,
            atomic: false,
            literal: None,
        }
    }

    fn operand(&self) -> String {
        if self.atomic {
            self.text.clone()
        } else {
            format!("({})", self.text)
        }
    }
}

/// Why reconstruction stopped: nothing past this point is rendered as source.
struct Bail;

struct Rebuilder<'a> {
    result: &'a DecompiledResult,
    stack: Vec<Expr>,
    declared: HashSet<&'a str>,
    lines: Vec<String>,
}

pub(super) fn reconstruct(result: &DecompiledResult) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&format!(
        "# version {}, {} constants, {} instructions\n\n",
        result.version,
        result.constants.len(),
        result.instructions.len()
    ));

    let mut rb = Rebuilder {
        result,
        stack: Vec::new(),
        declared: HashSet::new(),
        lines: Vec::new(),
    };
    let mut statement_start = 0;
    let mut bailed_at = None;
    for (ip, instr) in result.instructions.iter().enumerate() {
        if rb.stack.is_empty() {
            statement_start = ip;
        }
        if rb.step(instr).is_err() {
            bailed_at = Some(statement_start);
            break;
        }
    }

    for line in &rb.lines {
        out.push_str(INDENT);
        out.push_str(line);
        out.push('\n');
    }
    if let Some(from) = bailed_at {
        out.push_str(ASM_MARKER);
        out.push('\n');
        for (ip, instr) in result.instructions.iter().enumerate().skip(from) {
            out.push_str(&format!(
                "# [asm] {ip:04}  {}\n",
                fmt_instr(instr, &result.constants)
            ));
        }
    }
    out
}

impl<'a> Rebuilder<'a> {
    fn step(&mut self, instr: &Instr) -> Result<(), Bail> {
        match *instr {
            Instr::Push(idx) => {
                let value = self.result.constants.get(idx as usize).ok_or(Bail)?;
                self.stack.push(literal(value));
            }
            Instr::Pop => {
                let e = self.pop()?;
                self.lines.push(e.text);
            }
            Instr::LoadVar(idx) => {
                let name = self.local(idx)?;
                self.stack.push(Expr::atom(name));
            }
            Instr::StoreVar(idx) => {
                let name = self.local(idx)?;
                let value = self.pop()?;
                if self.declared.insert(name) {
                    self.lines.push(format!("$ {name} = {}", value.text));
                } else {
                    self.lines.push(format!("{name} = {}", value.text));
                }
            }
            Instr::Add => self.binary("+")?,
            Instr::Sub => self.binary("-")?,
            Instr::Mul => self.binary("*")?,
            Instr::Div => self.binary("/")?,
            Instr::Mod => self.binary("%")?,
            Instr::Eq => self.binary("==")?,
            Instr::Ne => self.binary("!=")?,
            Instr::Lt => self.binary("<")?,
            Instr::Gt => self.binary(">")?,
            Instr::Ge => self.binary(">=")?,
            Instr::Le => self.binary("<=")?,
            Instr::And => self.binary("&&")?,
            Instr::Or => self.binary("||")?,
            Instr::Not => {
                let e = self.pop()?;
                self.stack.push(Expr::atom(format!("!{}", e.operand())));
            }
            Instr::Neg => {
                let e = self.pop()?;
                let operand = if e.text.starts_with('-') {
                    format!("({})", e.text)
                } else {
                    e.operand()
                };
                self.stack.push(Expr::atom(format!("-{operand}")));
            }
            Instr::BuildArray(n) => {
                let items = self.pop_n(n as usize)?;
                let texts: Vec<String> = items.into_iter().map(|e| e.text).collect();
                self.stack.push(Expr::atom(format!("[{}]", texts.join(", "))));
            }
            Instr::BuildObject(n) => {
                let flat = self.pop_n(2 * n as usize)?;
                let mut fields = Vec::with_capacity(n as usize);
                for pair in flat.chunks(2) {
                    let key = pair[0].literal.as_deref().ok_or(Bail)?;
                    fields.push(format!("{}: {}", object_key(key), pair[1].text));
                }
                self.stack.push(Expr::atom(format!("{{{}}}", fields.join(", "))));
            }
            Instr::GetField => {
                let name = self.pop()?;
                let object = self.pop()?;
                let field = name.literal.ok_or(Bail)?;
                self.stack
                    .push(Expr::atom(format!("{}.{field}", object.operand())));
            }
            Instr::GetIndex => {
                let index = self.pop()?;
                let target = self.pop()?;
                self.stack
                    .push(Expr::atom(format!("{}[{}]", target.operand(), index.text)));
            }
            Instr::Call(argc) => {
                let args = self.pop_n(argc as usize)?;
                let name = self.pop()?.literal.ok_or(Bail)?;
                self.call(&name, args);
            }
            Instr::WsSend => self.host_call("ws.send", 1)?,
            Instr::WsBroadcast => self.host_call("ws.broadcast", 1)?,
            Instr::WsBroadcastRoom => self.host_call("ws.broadcast_to_room", 2)?,
            Instr::WsJoinRoom => self.host_call("ws.join", 1)?,
            Instr::WsLeaveRoom => self.host_call("ws.leave", 1)?,
            Instr::WsClose => self.host_call("ws.close", 1)?,
            Instr::WsGetRooms => self.host_call("ws.get_rooms", 0)?,
            Instr::WsGetClients => self.host_call("ws.get_room_clients", 1)?,
            Instr::WsGetConnCount => self.host_call("ws.get_connection_count", 0)?,
            Instr::WsGetUptime => self.host_call("ws.get_uptime", 0)?,
            Instr::Return => {
                let e = self.pop()?;
                self.lines.push(format!("> {}", e.text));
                self.stack.clear();
            }
            Instr::Halt => {
                if let Some(e) = self.stack.pop() {
                    self.lines.push(format!("> {}", e.text));
                }
                self.stack.clear();
            }
            Instr::Jump(_)
            | Instr::JumpIfFalse(_)
            | Instr::JumpIfTrue(_)
            | Instr::GetIter
            | Instr::IterNext { .. }
            | Instr::IterHasNext => return Err(Bail),
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Expr, Bail> {
        self.stack.pop().ok_or(Bail)
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Expr>, Bail> {
        if self.stack.len() < n {
            return Err(Bail);
        }
        let split = self.stack.len() - n;
        Ok(self.stack.split_off(split))
    }

    /// Hidden compiler temporaries never appear as source.
    fn local(&self, idx: u32) -> Result<&'a str, Bail> {
        let result: &'a DecompiledResult = self.result;
        let name = result
            .constants
            .get(idx as usize)
            .and_then(Value::as_str)
            .ok_or(Bail)?;
        if name.starts_with("__") {
            return Err(Bail);
        }
        Ok(name)
    }

    fn binary(&mut self, symbol: &str) -> Result<(), Bail> {
        let r = self.pop()?;
        let l = self.pop()?;
        self.stack.push(Expr::compound(format!(
            "{} {symbol} {}",
            l.operand(),
            r.operand()
        )));
        Ok(())
    }

    fn call(&mut self, name: &str, args: Vec<Expr>) {
        let texts: Vec<String> = args.into_iter().map(|e| e.text).collect();
        self.stack
            .push(Expr::atom(format!("{name}({})", texts.join(", "))));
    }

    fn host_call(&mut self, name: &str, argc: usize) -> Result<(), Bail> {
        let args = self.pop_n(argc)?;
        self.call(name, args);
        Ok(())
    }
}

fn literal(value: &Value) -> Expr {
    let mut e = Expr::atom(value.to_literal_text());
    if let Value::String(s) = value {
        e.literal = Some(s.clone());
    }
    e
}

fn object_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_ident = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_ident {
        key.to_string()
    } else {
        Value::String(key.to_string()).to_json()
    }
}
