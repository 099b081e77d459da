//! Pass 1 instruction sizing for AArch64 (spec.md §4.4). Same shape as the
//! ARMv7-A predictor: fixed 4-byte words, variable word count.

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
            detail: "AArch64 immediates in this dialect must fit in 32 bits".to_string(),
            line,
        }))
    }
}

/// Whether a single `MOVZ` suffices without a following `MOVK` (spec.md
/// §4.4: "AArch64 uses a sequence of `MOVZ`/`MOVK` as needed").
pub fn fits_movz_alone(v: i64) -> bool {
    ((v as u32) >> 16) == 0
}

fn ldi_size(v: i64, line: u32) -> Result<u64, UaError> {
    check_32(v, line)?;
    Ok(if fits_movz_alone(v) { 4 } else { 8 })
}

fn fits_imm12(v: i64) -> bool {
    (0..=4095).contains(&v)
}

fn alu_imm_size(v: i64, line: u32) -> Result<u64, UaError> {
    if fits_imm12(v) {
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
        Add | Sub | Cmp => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
            Some(Operand::Immediate(v)) => alu_imm_size(*v, pos.line)?,
            _ => 4,
        },
        And | Or | Xor => match operands.get(1) {
            Some(Operand::Register(_)) => 4,
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
                8 // materialize the shift amount into a scratch register, then a register-form shift
            }
            _ => 4,
        },
        Jmp | Call => 4,
        Jz | Jnz | Jl | Jg => 4,
        Int => 4,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn op(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction::Op {
            opcode,
            operands,
            pos: SourcePos { line: 1, col: 1 },
            call_args: None,
        }
    }

    #[test]
    fn nop_is_one_word() {
        assert_eq!(predict_size(&op(Opcode::Nop, vec![])).unwrap(), 4);
    }

    #[test]
    fn ldi_fits_movz_alone_for_small_values() {
        let i = op(Opcode::Ldi, vec![Operand::Register(0), Operand::Immediate(5)]);
        assert_eq!(predict_size(&i).unwrap(), 4);
    }

    #[test]
    fn ldi_needs_movk_for_values_above_16_bits() {
        let i = op(Opcode::Ldi, vec![Operand::Register(0), Operand::Immediate(0x1_2345)]);
        assert_eq!(predict_size(&i).unwrap(), 8);
    }

    #[test]
    fn ldi_rejects_values_that_do_not_fit_32_bits() {
        let i = op(
            Opcode::Ldi,
            vec![Operand::Register(0), Operand::Immediate(u32::MAX as i64 + 1)],
        );
        assert!(predict_size(&i).is_err());
    }

    #[test]
    fn add_immediate_uses_imm12_form_when_it_fits() {
        let small = op(Opcode::Add, vec![Operand::Register(0), Operand::Immediate(100)]);
        assert_eq!(predict_size(&small).unwrap(), 4);
        let wide = op(Opcode::Add, vec![Operand::Register(0), Operand::Immediate(5000)]);
        assert_eq!(predict_size(&wide).unwrap(), 8);
    }

    #[test]
    fn shift_rejects_amount_outside_0_to_63() {
        let i = op(Opcode::Shl, vec![Operand::Register(0), Operand::Immediate(64)]);
        assert!(predict_size(&i).is_err());
    }
}
