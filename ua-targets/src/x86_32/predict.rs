//! Pass 1 instruction sizing for IA-32 (spec.md §4.4). No REX prefixes and
//! no 64-bit scratch loads: every immediate must itself fit in 32 bits,
//! since there is no wider load to fall back on.

use ua_core::prelude::*;

pub fn fits_i8(v: i64) -> bool {
    (-128..=127).contains(&v)
}

pub fn fits_i32(v: i64) -> bool {
    (i32::MIN as i64..=i32::MAX as i64).contains(&v)
}

fn check_i32(v: i64, line: u32) -> Result<(), UaError> {
    if fits_i32(v) {
        Ok(())
    } else {
        Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
            value: v,
            detail: "IA-32 immediates must fit in 32 bits".to_string(),
            line,
        }))
    }
}

fn alu_imm_size(v: i64, line: u32) -> Result<u64, UaError> {
    if fits_i8(v) {
        Ok(3)
    } else {
        check_i32(v, line)?;
        Ok(6)
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
        Pusha | Popa => 1,
        Inc | Dec => 1,
        Not | Bswap => 2,
        Ldi => {
            if let Some(Operand::Immediate(v)) = operands.get(1) {
                check_i32(*v, pos.line)?;
            }
            5
        }
        Mov => match operands.get(1) {
            Some(Operand::Register(_)) => 2,
            Some(Operand::Immediate(v)) => {
                check_i32(*v, pos.line)?;
                5
            }
            _ => 2,
        },
        Add | Sub | And | Or | Xor | Cmp => match operands.get(1) {
            Some(Operand::Register(_)) => 2,
            Some(Operand::Immediate(v)) => alu_imm_size(*v, pos.line)?,
            _ => 2,
        },
        Mul => match operands.get(1) {
            Some(Operand::Register(_)) => 3,
            Some(Operand::Immediate(v)) => {
                check_i32(*v, pos.line)?;
                6
            }
            _ => 3,
        },
        Div => match operands.get(1) {
            Some(Operand::Register(_)) => 9,
            Some(Operand::Immediate(v)) => {
                check_i32(*v, pos.line)?;
                14
            }
            _ => 9,
        },
        Shl | Shr => match operands.get(1) {
            Some(Operand::Register(_)) => 2,
            Some(Operand::Immediate(v)) => {
                if !(0..=31).contains(v) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: *v,
                        detail: "shift amount must be 0..31".to_string(),
                        line: pos.line,
                    }));
                }
                3
            }
            _ => 2,
        },
        Jmp | Call => 5,
        Jz | Jnz | Jl | Jg => 6,
        Cpuid | Rdtsc | Sys => 2,
        Int => 2,
        Load | Store | Loadb | Storeb | Get => 6,
        Set => match operands.get(1) {
            Some(Operand::Immediate(_)) => 10,
            _ => 6,
        },
        Lds => 6,
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
    fn nop_is_one_byte() {
        assert_eq!(predict_size(&op(Opcode::Nop, vec![])).unwrap(), 1);
    }

    #[test]
    fn ldi_is_five_bytes_opcode_plus_imm32() {
        let i = op(Opcode::Ldi, vec![Operand::Register(0), Operand::Immediate(10)]);
        assert_eq!(predict_size(&i).unwrap(), 5);
    }

    #[test]
    fn ldi_rejects_immediate_wider_than_32_bits() {
        let i = op(
            Opcode::Ldi,
            vec![Operand::Register(0), Operand::Immediate(i32::MAX as i64 + 1)],
        );
        assert!(matches!(
            predict_size(&i),
            Err(UaError::Codegen(CodegenError::ImmediateOutOfRange { .. }))
        ));
    }

    #[test]
    fn alu_immediate_picks_short_form_only_when_it_fits_i8() {
        let small = op(Opcode::Add, vec![Operand::Register(0), Operand::Immediate(5)]);
        assert_eq!(predict_size(&small).unwrap(), 3);
        let large = op(Opcode::Add, vec![Operand::Register(0), Operand::Immediate(1000)]);
        assert_eq!(predict_size(&large).unwrap(), 6);
    }

    #[test]
    fn shift_rejects_amount_outside_0_to_31() {
        let i = op(Opcode::Shl, vec![Operand::Register(0), Operand::Immediate(32)]);
        assert!(predict_size(&i).is_err());
    }
}
