//! Pass 1 instruction sizing for ARMv7-A (spec.md §4.4). Every instruction
//! is a 4-byte word; what varies is how many words an operand shape needs.

use ua_core::prelude::*;

pub fn fits_32(v: i64) -> bool {
    (i32::MIN as i64..=u32::MAX as i64).contains(&v)
}

fn check_32(v: i64, line: u32) -> Result<(), UaError> {
    if fits_32(v) {
        Ok(())
    } else {
        Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
            value: v,
            detail: "ARM immediates must fit in 32 bits".to_string(),
            line,
        }))
    }
}

/// Whether `v`'s top 16 bits (as a 32-bit pattern) are zero, i.e. a single
/// `MOVW` suffices without a following `MOVT` (spec.md §4.4: "`MOVW` alone
/// when the upper 16 bits are zero").
pub fn fits_movw_alone(v: i64) -> bool {
    ((v as u32) >> 16) == 0
}

/// 4 bytes (`MOVW`) or 8 (`MOVW`+`MOVT`), deterministic from the literal's
/// magnitude.
fn ldi_size(v: i64, line: u32) -> Result<u64, UaError> {
    check_32(v, line)?;
    Ok(if fits_movw_alone(v) { 4 } else { 8 })
}

/// This dialect's simplified ALU-immediate encoder only uses rotate 0, so
/// it covers `0..=255` directly; anything wider falls back to materializing
/// the literal into the scratch register first.
fn fits_rotate0_imm8(v: i64) -> bool {
    (0..=255).contains(&v)
}

fn alu_imm_size(v: i64, line: u32) -> Result<u64, UaError> {
    if fits_rotate0_imm8(v) {
        Ok(4)
    } else {
        Ok(ldi_size(v, line)? + 4)
    }
}

pub fn predict_size(instr: &Instruction) -> Result<u64, UaError> {
    let Instruction::Op { opcode, operands, pos, .. } = instr else {
        return Ok(0);
    };
    use Opcode::*;
    let size = match opcode {
        Nop => 4,
        Hlt | Ret => 4,
        Push | Pop => 4,
        Inc | Dec => 4,
        Not | Bswap => 4,
        Wfi | Dmb => 4,
        Ldi => ldi_size(imm_or_zero(operands), pos.line)?,
        Mov => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)?,
            _ => 4,
        },
        Add | Sub | And | Or | Xor | Cmp => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => alu_imm_size(*v, pos.line)?,
            _ => 4,
        },
        Mul | Div => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => ldi_size(*v, pos.line)? + 4,
            _ => 4,
        },
        Shl | Shr => match operands.get(1) {
            Some(Operand::Immediate(v)) if !(0..=31).contains(v) => {
                return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                    value: *v,
                    detail: "shift amount must be 0..31".to_string(),
                    line: pos.line,
                }))
            }
            _ => 4,
        },
        Jmp | Call => 4,
        Jz | Jnz | Jl | Jg => 4,
        Int => 4,
        // address-bearing forms: the target's value isn't known until
        // pass 1 finishes, so these always reserve the full two-word
        // address materialization (spec.md §4.4: ARM "materializes the
        // variable's absolute address into a scratch register").
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
