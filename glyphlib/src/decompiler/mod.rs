//! Bytecode back to text: an exact disassembly listing and a best-effort
//! pseudo-source reconstruction.

mod pseudo;

use tracing::debug;

use crate::bytecode::{BytecodeModule, DecodeError, Instr, fmt_comment, fmt_constant, fmt_instr};
use crate::value::Value;

const RULE_WIDE: usize = 50;
const RULE_NARROW: usize = 30;

/// A decoded module, for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompiledResult {
    pub version: u16,
    pub constants: Vec<Value>,
    pub instructions: Vec<Instr>,
}

/// One row of the instruction listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionLine {
    pub index: usize,
    pub mnemonic: &'static str,
    pub operand: Option<u32>,
    pub comment: Option<String>,
}

/// Parses and validates `bytecode` without running it.
pub fn decompile(bytecode: &[u8]) -> Result<DecompiledResult, DecodeError> {
    let module = BytecodeModule::from_bytes(bytecode)?;
    debug!(
        version = module.version,
        constants = module.constants.len(),
        instructions = module.code.len(),
        "decompiled bytecode"
    );
    Ok(DecompiledResult::from(module))
}

impl From<BytecodeModule> for DecompiledResult {
    fn from(module: BytecodeModule) -> Self {
        Self {
            version: module.version,
            constants: module.constants,
            instructions: module.code,
        }
    }
}

impl DecompiledResult {
    pub fn instruction_lines(&self) -> Vec<InstructionLine> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(index, instr)| InstructionLine {
                index,
                mnemonic: instr.mnemonic(),
                operand: instr.operand().map(|o| o.raw()),
                comment: fmt_comment(instr, &self.constants),
            })
            .collect()
    }

    /// Accurate listing of the pool and every instruction.
    pub fn format_disassembly(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("GLYPH bytecode v{}\n", self.version));
        out.push_str(&format!("{}\n\n", "=".repeat(RULE_WIDE)));
        out.push_str("CONSTANT POOL:\n");
        out.push_str(&format!("{}\n", "-".repeat(RULE_NARROW)));
        for (idx, v) in self.constants.iter().enumerate() {
            out.push_str(&format!(
                "  [{idx:3}] {:<8} {}\n",
                v.type_name(),
                fmt_constant(v)
            ));
        }
        out.push_str("\nINSTRUCTIONS:\n");
        out.push_str(&format!("{}\n", "-".repeat(RULE_NARROW)));
        for (ip, instr) in self.instructions.iter().enumerate() {
            out.push_str(&format!("  {ip:04}  {}\n", fmt_instr(instr, &self.constants)));
        }
        out
    }

    /// GLYPH-like source where it can be recovered, annotated disassembly
    /// where it cannot.
    pub fn format(&self) -> String {
        pseudo::reconstruct(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_resolved_operands() {
        let result = DecompiledResult::from(BytecodeModule::new(
            vec![Value::from("x")],
            vec![Instr::LoadVar(0), Instr::BuildArray(1), Instr::Return],
        ));
        let lines = result.instruction_lines();
        assert_eq!(lines[0].comment.as_deref(), Some("x"));
        assert_eq!(lines[1].comment.as_deref(), Some("1 elements"));
        assert_eq!(lines[2].operand, None);
    }
}
