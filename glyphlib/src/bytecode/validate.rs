use super::{BytecodeModule, DecodeError, Operand};

impl BytecodeModule {
    /// Checks every operand against the pool and the instruction stream.
    ///
    /// A jump may target one past the last instruction, which ends execution.
    pub fn validate(&self) -> Result<(), DecodeError> {
        let pool_len = self.constants.len();
        let code_len = self.code.len();
        for (at, instr) in self.code.iter().enumerate() {
            match instr.operand() {
                Some(Operand::Const(index)) if index as usize >= pool_len => {
                    return Err(DecodeError::ConstantOutOfBounds {
                        at,
                        index,
                        len: pool_len,
                    });
                }
                Some(Operand::Local(index)) => match self.constant(index) {
                    None => {
                        return Err(DecodeError::ConstantOutOfBounds {
                            at,
                            index,
                            len: pool_len,
                        });
                    }
                    Some(v) if v.as_str().is_none() => {
                        return Err(DecodeError::LocalNotString {
                            at,
                            index,
                            found: v.type_name(),
                        });
                    }
                    Some(_) => {}
                },
                Some(Operand::Target(target)) if target as usize > code_len => {
                    return Err(DecodeError::JumpOutOfBounds {
                        at,
                        target,
                        len: code_len,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
