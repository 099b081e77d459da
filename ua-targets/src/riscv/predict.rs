//! Pass 1 instruction sizing for RV64I+M (spec.md §4.4). Fixed 4-byte
//! words, variable word count — the same shape as the ARM predictors,
//! but RISC-V's native `ANDI`/`ORI`/`XORI`/shift-immediate forms mean
//! fewer opcodes need the scratch-register fallback than on ARM/AArch64.

use ua_core::prelude::*;

pub fn fits_32(v: i64) -> bool {
    (i32::MIN as i64..=i32::MAX as i64).contains(&v)
}

fn check_32(v: i64, line: u32) -> Result<(), UaError> {
    if fits_32(v) {
        Ok(())
    } else {
        Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
            value: v,
            detail: "RISC-V immediates in this dialect must fit in 32 bits".to_string(),
            line,
        }))
    }
}

/// RV64I's `ADDI`/`ANDI`/`ORI`/`XORI`/`SLTI` immediate field: signed
/// 12-bit, `-2048..=2047`.
pub fn fits_i12(v: i64) -> bool {
    (-2048..=2047).contains(&v)
}

/// Whether a single `ADDI x0, x0, v` suffices, vs. `LUI` + `ADDI`.
pub fn fits_addi_alone(v: i64) -> bool {
    fits_i12(v)
}

fn ldi_size(v: i64, line: u32) -> Result<u64, UaError> {
    check_32(v, line)?;
    Ok(if fits_addi_alone(v) { 4 } else { 8 })
}

pub fn predict_size(instr: &Instruction) -> Result<u64, UaError> {
    let Instruction::Op { opcode, operands, pos, .. } = instr else {
        return Ok(0);
    };
    use Opcode::*;
    let size = match opcode {
        Nop => 4,
        Hlt | Ret => 4,
        Push | Pop => 8,
        Inc | Dec | Not => 4,
        Bswap => 136, // software byte-reverse; see emit.rs
        Ebreak | Fence => 4,
        Ldi => ldi_size(imm_or_zero(operands), pos.line)?,
        Mov => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)?,
            _ => 4,
        },
        Add => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) if fits_i12(*v) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)? + 4,
            _ => 4,
        },
        Sub | Cmp => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) if fits_i12(v.checked_neg().unwrap_or(i64::MAX)) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)? + 4,
            _ => 4,
        },
        And | Or | Xor => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) if fits_i12(*v) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)? + 4,
            _ => 4,
        },
        Mul | Div => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)? + 4,
            _ => 4,
        },
        Shl | Shr => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
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
            _ => 4,
        },
        Jmp | Call => 4,
        Jz | Jnz | Jl | Jg => 4,
        Int => {
            let v = match operands.first() {
                Some(Operand::Immediate(v)) => *v,
                _ => 0,
            };
            ldi_size(v, pos.line)? + 4
        }
        Sys => 4,
        Load | Store | Loadb | Storeb | Get => 12,
        Set => match operands.get(1) {
            Some(Operand::Immediate(_)) => 20,
            _ => 12,
        },
        Lds => 8,
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

fn imm_or_zero(operands: &[Operand]) -> i64 {
    match operands.get(1) {
        Some(Operand::Immediate(v)) => *v,
        _ => 0,
    }
}
