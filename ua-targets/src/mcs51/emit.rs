//! Pass 2 emission for the 8051/MCS-51 target: walks the IR once more,
//! appends the predicted byte count for each instruction, and records a
//! fixup wherever a label reference's final address isn't known yet.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::*;
use crate::common::{imm_value, label_name, reg_index, Layout};

pub fn emit(
    ir: &[Instruction],
    layout: &Layout,
    window: &RangeInclusive<u8>,
) -> Result<(CodeBuffer, FixupTable), UaError> {
    let mut code = CodeBuffer::new();
    let mut fixups = FixupTable::new();

    for instr in ir {
        let Instruction::Op { opcode, operands, pos, .. } = instr else {
            continue;
        };
        let line = pos.line;
        let reg = |operand: &Operand| -> Result<u8, UaError> {
            let r = reg_index(operand).expect("shape guarantees a register operand");
            ua_core::emitter::check_register_window(r, window, line)?;
            Ok(r)
        };
        let indirect_reg = |operand: &Operand| -> Result<u8, UaError> {
            let r = reg(operand)?;
            if r > 1 {
                return Err(UaError::Codegen(CodegenError::Mcs51IndirectRegister { reg: r, line }));
            }
            Ok(r)
        };

        use Opcode::*;
        match opcode {
            Nop => code.push(OP_NOP),
            Ret => code.push(OP_RET),
            Reti => code.push(OP_RETI),
            Sys => code.push(OP_SYS),
            Inc => code.push(BASE_INC + reg(&operands[0])?),
            Dec => code.push(BASE_DEC + reg(&operands[0])?),
            Not => {
                code.push(OP_NOT);
                code.push(reg(&operands[0])?);
            }
            Setb => {
                code.push(OP_SETB);
                code.push(reg(&operands[0])?);
            }
            Clr => {
                code.push(OP_CLR);
                code.push(reg(&operands[0])?);
            }
            Push => {
                code.push(OP_PUSH);
                code.push(reg(&operands[0])?);
            }
            Pop => {
                code.push(OP_POP);
                code.push(reg(&operands[0])?);
            }
            Int => {
                code.push(OP_INT);
                code.push(imm_value(&operands[0]) as u8);
            }
            Mov => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(OP_MOV_REG);
                        code.push((dst << 4) | src);
                    }
                    Operand::Immediate(v) => {
                        code.push(BASE_MOV_IMM + dst);
                        code.push(*v as u8);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Ldi => {
                let dst = reg(&operands[0])?;
                code.push(BASE_MOV_IMM + dst);
                code.push(imm_value(&operands[1]) as u8);
            }
            Add | Sub | And | Or | Xor | Shl | Shr => {
                let dst = reg(&operands[0])?;
                let (reg_op, imm_op) = alu_opcodes(*opcode);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(reg_op);
                        code.push((dst << 4) | src);
                    }
                    Operand::Immediate(v) => {
                        code.push(imm_op);
                        code.push(dst);
                        code.push(*v as u8);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Cmp | Cjne => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(BASE_CJNE_REG + dst);
                        code.push(src);
                        code.push(0);
                    }
                    Operand::Immediate(v) => {
                        code.push(BASE_CJNE_IMM + dst);
                        code.push(*v as u8);
                        code.push(0);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Load | Get => {
                let dst = indirect_reg(&operands[0])?;
                code.push(BASE_LOAD + dst);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[1]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Loadb => {
                let dst = indirect_reg(&operands[0])?;
                code.push(BASE_LOADB + dst);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[1]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Store => {
                let src = indirect_reg(&operands[1])?;
                code.push(BASE_STORE + src);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Storeb => {
                let src = indirect_reg(&operands[1])?;
                code.push(BASE_STOREB + src);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(BASE_STORE + src);
                        let site = code.reserve_zeroed(2);
                        fixups.push(Fixup {
                            label: name,
                            site_offset: site as u64,
                            instr_addr: (site - 1) as u64,
                            line,
                            kind: FixupKind::Mcs51Rel { long: true },
                        });
                    }
                    Operand::Immediate(v) => {
                        code.push(OP_SET_IMM);
                        let site = code.reserve_zeroed(2);
                        code.push(*v as u8);
                        fixups.push(Fixup {
                            label: name,
                            site_offset: site as u64,
                            instr_addr: (site - 1) as u64,
                            line,
                            kind: FixupKind::Mcs51Rel { long: true },
                        });
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Lds => {
                let dst = reg(&operands[0])?;
                code.push(BASE_LDS + dst);
                code.reserve_zeroed(4);
                // String addresses are resolved directly: the table is
                // complete after pass 1, and there is no displacement
                // arithmetic, only a literal 32-bit address to fill in.
                let addr = match &operands[1] {
                    Operand::StringLit(s) => {
                        let idx = layout
                            .strings
                            .iter()
                            .position(|existing| existing == s.as_str())
                            .expect("string was interned during pass 1");
                        layout.string_addr(idx)
                    }
                    _ => unreachable!("shape guarantees a string literal"),
                };
                let offset = code.len() - 4;
                code.patch(offset, &(addr as u32).to_le_bytes());
            }
            Jmp => {
                code.push(OP_LJMP);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Call => {
                code.push(OP_LCALL);
                let site = code.reserve_zeroed(2);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site - 1) as u64,
                    line,
                    kind: FixupKind::Mcs51Rel { long: true },
                });
            }
            Jz | Jnz | Jl | Jg => {
                code.push(match opcode {
                    Jz => OP_JZ,
                    Jnz => OP_JNZ,
                    Jl => OP_JC,
                    Jg => OP_JNC,
                    _ => unreachable!(),
                });
                let site = code.reserve_zeroed(1);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64 - 1,
                    line,
                    kind: FixupKind::Mcs51Rel { long: false },
                });
            }
            Djnz => {
                let dst = reg(&operands[0])?;
                code.push(BASE_DJNZ + dst);
                let site = code.reserve_zeroed(1);
                fixups.push(Fixup {
                    label: label_name(&operands[1]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64 - 1,
                    line,
                    kind: FixupKind::Mcs51Rel { long: false },
                });
            }
            Hlt => {
                // No native halt: loop on self, same as the teacher's
                // emulators treat an illegal-opcode trap as a spin.
                code.push(OP_SJMP);
                code.push(0xFE);
            }
            Var | Buffer | Org => {}
            other => {
                return Err(UaError::Codegen(CodegenError::UnsupportedOpcode {
                    opcode: other.mnemonic().to_string(),
                    line,
                }))
            }
        }
    }

    Ok((code, fixups))
}

fn alu_opcodes(opcode: Opcode) -> (u8, u8) {
    use Opcode::*;
    match opcode {
        Add => (OP_ADD_REG, OP_ADD_IMM),
        Sub => (OP_SUB_REG, OP_SUB_IMM),
        And => (OP_AND_REG, OP_AND_IMM),
        Or => (OP_OR_REG, OP_OR_IMM),
        Xor => (OP_XOR_REG, OP_XOR_IMM),
        Shl => (OP_SHL_REG, OP_SHL_IMM),
        Shr => (OP_SHR_REG, OP_SHR_IMM),
        _ => unreachable!("caller only passes ALU opcodes"),
    }
}
