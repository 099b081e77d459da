//! Pass 1 instruction sizing for the 8051/MCS-51 target (spec.md §4.4).
//! Registers are 8-bit; every immediate is range-checked to fit a byte.

use ua_core::prelude::*;

pub fn predict_size(instr: &Instruction) -> Result<u64, UaError> {
    let Instruction::Op { opcode, operands, pos, .. } = instr else {
        return Ok(0);
    };
    use Opcode::*;
    let size = match opcode {
        Nop | Ret | Reti => 1,
        Inc | Dec => 1,
        Not | Setb | Clr => 2,
        Mov | Ldi => 2,
        Push | Pop => 2,
        Add | Sub | And | Or | Xor | Shl | Shr => match operands.get(1) {
            Some(Operand::Register(_)) => 2,
            Some(Operand::Immediate(v)) => {
                check_imm8(*v, pos.line)?;
                3
            }
            _ => 2,
        },
        Cmp | Cjne => 3,
        Jmp | Call => 3,
        Jz | Jnz | Jl | Jg | Djnz => 2,
        Load | Store | Loadb | Storeb | Get => 3,
        Set => match operands.get(1) {
            Some(Operand::Immediate(_)) => 4,
            _ => 3,
        },
        Int => 2,
        Sys => 1,
        Hlt => 2,
        Var | Buffer => 0,
        Lds => 5,
        Org => 0,
        other => {
            return Err(UaError::Codegen(CodegenError::UnsupportedOpcode {
                opcode: other.mnemonic().to_string(),
                line: pos.line,
            }))
        }
    };
    Ok(size)
}

pub fn check_imm8(v: i64, line: u32) -> Result<(), UaError> {
    if (-128..=255).contains(&v) {
        Ok(())
    } else {
        Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
            value: v,
            detail: "8051 immediates must fit in 8 bits".to_string(),
            line,
        }))
    }
}
