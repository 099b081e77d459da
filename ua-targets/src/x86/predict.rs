//! Pass 1 instruction sizing for x86-64 (spec.md §4.4).

use ua_core::prelude::*;

pub fn fits_i8(v: i64) -> bool {
    (-128..=127).contains(&v)
}

pub fn fits_i32(v: i64) -> bool {
    (i32::MIN as i64..=i32::MAX as i64).contains(&v)
}

/// 4 bytes (`83 /x ib`) if the immediate fits a sign-extended byte, 7 bytes
/// (`81 /x id`) if it fits a sign-extended dword, else 13: a full 10-byte
/// `movabs` into the scratch register followed by the 3-byte register-form
/// op (spec.md §4.4: "size must be a deterministic function of the literal
/// value").
fn alu_imm_size(v: i64) -> u64 {
    if fits_i8(v) {
        4
    } else if fits_i32(v) {
        7
    } else {
        13
    }
}

pub fn predict_size(instr: &Instruction) -> Result<u64, UaError> {
    let Instruction::Op { opcode, operands, pos, .. } = instr else {
        return Ok(0);
    };
    use Opcode::*;
    let size = match opcode {
        Nop => 1,
        Hlt | Ret => 1,
        Push | Pop => 1,
        Inc | Dec | Not => 3,
        Ldi => {
            if let Some(Operand::Immediate(v)) = operands.get(1) {
                if !fits_i32(*v) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: *v,
                        detail: "x86-64 LDI takes a sign-extended 32-bit immediate".to_string(),
                        line: pos.line,
                    }));
                }
            }
            7
        }
        Mov => match operands.get(1) {
            Some(Operand::Register(_)) => 3,
            Some(Operand::Immediate(v)) => {
                if !fits_i32(*v) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: *v,
                        detail: "x86-64 MOV with an immediate source takes a sign-extended 32-bit value".to_string(),
                        line: pos.line,
                    }));
                }
                7
            }
            _ => 3,
        },
        Add | Sub | And | Or | Xor | Cmp => match operands.get(1) {
            Some(Operand::Register(_)) => 3,
            Some(Operand::Immediate(v)) => alu_imm_size(*v),
            _ => 3,
        },
        Mul => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) if fits_i32(*v) => 7,
            _ => 11,
        },
        Div => match operands.get(1) {
            Some(Operand::Register(_)) => 13,
            _ => 20,
        },
        Shl | Shr => match operands.get(1) {
            Some(Operand::Register(_)) => 3,
            Some(Operand::Immediate(v)) => {
                if !(0..=63).contains(v) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: *v,
                        detail: "shift amount must be 0..63".to_string(),
                        line: pos.line,
                    }));
                }
                4
            }
            _ => 3,
        },
        Jmp | Call => 5,
        Jz | Jnz | Jl | Jg => 6,
        Cpuid | Rdtsc | Sys => 2,
        Bswap => 3,
        Int => 2,
        Load | Store | Loadb | Storeb | Get => 7,
        Set => match operands.get(1) {
            Some(Operand::Immediate(_)) => 11,
            _ => 7,
        },
        Lds => 7,
        Var | Buffer | Org => 0,
        other => {
            return Err(UaError::Codegen(CodegenError::UnsupportedOpcode {
                opcode: other.mnemonic().to_string(),
                line: pos.line,
            }))
        }
    };
    Ok(size)
}
