//! Pass 2 emission for RV64I+M (spec.md §4.4): straight bit-composition
//! of each instruction form, the same way the ARM/AArch64 emitters build
//! their words. UA `R0..R7` map onto `a0..a7` (`x10..x17`); `CMP` has no
//! native counterpart on an ISA with no flags register, so it lowers to
//! a `SUB` whose result lands in a dedicated scratch register (`FLAGS`)
//! that the following `Jz`/`Jnz`/`Jl`/`Jg` compares against `x0`.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::predict::fits_addi_alone;
use super::{FLAGS, SCRATCH1, SCRATCH2};
use crate::common::{imm_value, label_name, reg_index, Layout};

fn ua_reg(r: u8) -> u8 {
    r + 10 // a0..a7
}

fn r_type(funct7: u32, rs2: u8, rs1: u8, funct3: u32, rd: u8, opcode: u32) -> u32 {
    (funct7 << 25) | ((rs2 as u32) << 20) | ((rs1 as u32) << 15) | (funct3 << 12) | ((rd as u32) << 7) | opcode
}

fn i_type(imm12: i32, rs1: u8, funct3: u32, rd: u8, opcode: u32) -> u32 {
    (((imm12 as u32) & 0xFFF) << 20) | ((rs1 as u32) << 15) | (funct3 << 12) | ((rd as u32) << 7) | opcode
}

fn s_type(imm12: i32, rs2: u8, rs1: u8, funct3: u32, opcode: u32) -> u32 {
    let imm = imm12 as u32 & 0xFFF;
    (((imm >> 5) & 0x7F) << 25) | ((rs2 as u32) << 20) | ((rs1 as u32) << 15) | (funct3 << 12) | ((imm & 0x1F) << 7) | opcode
}

fn u_type(imm20: u32, rd: u8, opcode: u32) -> u32 {
    (imm20 << 12) | ((rd as u32) << 7) | opcode
}

const OP_LUI: u32 = 0b0110111;
const OP_JAL: u32 = 0b1101111;
const OP_BRANCH: u32 = 0b1100011;
const OP_LOAD: u32 = 0b0000011;
const OP_STORE: u32 = 0b0100011;
const OP_IMM: u32 = 0b0010011;
const OP_REG: u32 = 0b0110011;

fn addi(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b000, rd, OP_IMM)
}

fn andi(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b111, rd, OP_IMM)
}

fn ori(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b110, rd, OP_IMM)
}

fn xori(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b100, rd, OP_IMM)
}

fn shift_imm(funct6: u32, funct3: u32, rd: u8, rs1: u8, shamt: u8) -> u32 {
    (funct6 << 26) | ((shamt as u32 & 0x3F) << 20) | ((rs1 as u32) << 15) | (funct3 << 12) | ((rd as u32) << 7) | OP_IMM
}

fn reg_op(funct7: u32, funct3: u32, rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(funct7, rs2, rs1, funct3, rd, OP_REG)
}

fn lui(rd: u8, imm20: u32) -> u32 {
    u_type(imm20 & 0xFFFFF, rd, OP_LUI)
}

fn ld(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b011, rd, OP_LOAD)
}

fn lb(rd: u8, rs1: u8, imm12: i32) -> u32 {
    i_type(imm12, rs1, 0b000, rd, OP_LOAD)
}

fn sd(rs1: u8, rs2: u8, imm12: i32) -> u32 {
    s_type(imm12, rs2, rs1, 0b011, OP_STORE)
}

fn sb(rs1: u8, rs2: u8, imm12: i32) -> u32 {
    s_type(imm12, rs2, rs1, 0b000, OP_STORE)
}

fn jal(rd: u8) -> u32 {
    u_type(0, rd, 0) | OP_JAL
}

fn branch_template(funct3: u32, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, funct3, 0, OP_BRANCH)
}

const NOP: u32 = 0x0000_0013; // ADDI x0, x0, 0
const ECALL: u32 = 0x0000_0073;
const EBREAK: u32 = 0x0010_0073;
const FENCE_IORW: u32 = 0x0FF0_000F;
const RET: u32 = 0x0000_8067; // JALR x0, 0(x1)

/// Splits a 32-bit value into the `(upper20, lower12)` halves that
/// `LUI`+`ADDI` combine back into `v` (`ADDI` sign-extends its immediate,
/// so the upper half is rounded to compensate — the standard RISC-V `li`
/// decomposition).
fn split_li(v: i64) -> (u32, i32) {
    let v32 = v as i32 as u32;
    let lower = (v32 & 0xFFF) as i32 as i32;
    let lower = ((lower << 20) >> 20) as i32; // sign-extend 12 bits
    let upper = v32.wrapping_sub(lower as u32) >> 12;
    (upper, lower)
}

fn load_const(code: &mut CodeBuffer, rd: u8, v: i64) {
    if fits_addi_alone(v) {
        code.extend(&addi(rd, 0, v as i32).to_le_bytes());
    } else {
        let (upper, lower) = split_li(v);
        code.extend(&lui(rd, upper).to_le_bytes());
        code.extend(&addi(rd, rd, lower).to_le_bytes());
    }
}

/// Address materialization is always the full `LUI+ADDI` pair (8 bytes),
/// regardless of the label's eventual magnitude, for the same pass-1
/// circular-sizing reason ARM/AArch64 always use `MOVW+MOVT`/`MOVZ+MOVK`
/// for label addresses: the address isn't known until pass 1 finishes.
fn load_addr_fixup(code: &mut CodeBuffer, fixups: &mut FixupTable, rd: u8, label: &str, line: u32) {
    let hi_site = code.len();
    code.extend(&lui(rd, 0).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: hi_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::RiscvRel { slot: RiscvSlot::Hi20 },
    });
    let lo_site = code.len();
    code.extend(&addi(rd, rd, 0).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: lo_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::RiscvRel { slot: RiscvSlot::Lo12 },
    });
}

/// Software byte-reverse of a 64-bit register: this dialect targets the
/// RV64I+M base ISA, which has no `REV8` (that's the `Zbb` extension), so
/// `BSWAP` is emulated with eight shift/mask/shift/or quads.
fn bswap(code: &mut CodeBuffer, rd: u8) {
    code.extend(&addi(SCRATCH1, rd, 0).to_le_bytes()); // copy original into scratch1
    code.extend(&addi(rd, 0, 0).to_le_bytes()); // zero the accumulator
    for i in 0..8u8 {
        code.extend(&shift_imm(0, 0b101, SCRATCH2, SCRATCH1, i * 8).to_le_bytes()); // srli
        code.extend(&andi(SCRATCH2, SCRATCH2, 0xFF).to_le_bytes());
        code.extend(&shift_imm(0, 0b001, SCRATCH2, SCRATCH2, (7 - i) * 8).to_le_bytes()); // slli
        code.extend(&reg_op(0, 0b110, rd, rd, SCRATCH2).to_le_bytes()); // or
    }
}

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
            Ok(ua_reg(r))
        };

        use Opcode::*;
        match opcode {
            Nop => code.extend(&NOP.to_le_bytes()),
            Hlt | Ret => code.extend(&RET.to_le_bytes()),
            Ebreak => code.extend(&EBREAK.to_le_bytes()),
            Fence => code.extend(&FENCE_IORW.to_le_bytes()),
            Push => {
                let r = reg(&operands[0])?;
                code.extend(&addi(2, 2, -8).to_le_bytes());
                code.extend(&sd(2, r, 0).to_le_bytes());
            }
            Pop => {
                let r = reg(&operands[0])?;
                code.extend(&ld(r, 2, 0).to_le_bytes());
                code.extend(&addi(2, 2, 8).to_le_bytes());
            }
            Inc => {
                let r = reg(&operands[0])?;
                code.extend(&addi(r, r, 1).to_le_bytes());
            }
            Dec => {
                let r = reg(&operands[0])?;
                code.extend(&addi(r, r, -1).to_le_bytes());
            }
            Not => {
                let r = reg(&operands[0])?;
                code.extend(&xori(r, r, -1).to_le_bytes());
            }
            Bswap => {
                let r = reg(&operands[0])?;
                bswap(&mut code, r);
            }
            Ldi => {
                let dst = reg(&operands[0])?;
                load_const(&mut code, dst, imm_value(&operands[1]));
            }
            Mov => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&addi(dst, src, 0).to_le_bytes());
                    }
                    Operand::Immediate(v) => load_const(&mut code, dst, *v),
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Add => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0, 0b000, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) if fits_addi_alone(*v) => {
                        code.extend(&addi(dst, dst, *v as i32).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&reg_op(0, 0b000, dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Sub | Cmp => {
                let dst = reg(&operands[0])?;
                let target = if matches!(opcode, Cmp) { FLAGS } else { dst };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0b0100000, 0b000, target, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) if fits_addi_alone(v.wrapping_neg()) => {
                        code.extend(&addi(target, dst, v.wrapping_neg() as i32).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&reg_op(0b0100000, 0b000, target, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            And | Or | Xor => {
                let dst = reg(&operands[0])?;
                let imm_op: fn(u8, u8, i32) -> u32 = match opcode {
                    And => andi,
                    Or => ori,
                    Xor => xori,
                    _ => unreachable!(),
                };
                let funct3 = match opcode {
                    And => 0b111,
                    Or => 0b110,
                    Xor => 0b100,
                    _ => unreachable!(),
                };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0, funct3, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) if fits_addi_alone(*v) => {
                        code.extend(&imm_op(dst, dst, *v as i32).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&reg_op(0, funct3, dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Mul => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0b0000001, 0b000, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&reg_op(0b0000001, 0b000, dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Div => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0b0000001, 0b100, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&reg_op(0b0000001, 0b100, dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Shl | Shr => {
                let dst = reg(&operands[0])?;
                let funct3 = if matches!(opcode, Shl) { 0b001 } else { 0b101 };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&reg_op(0, funct3, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        code.extend(&shift_imm(0, funct3, dst, dst, *v as u8).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Int => {
                let v = imm_value(&operands[0]);
                load_const(&mut code, SCRATCH1, v);
                code.extend(&ECALL.to_le_bytes());
            }
            Sys => code.extend(&ECALL.to_le_bytes()),
            Load | Get => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&ld(dst, SCRATCH1, 0).to_le_bytes());
            }
            Loadb => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&lb(dst, SCRATCH1, 0).to_le_bytes());
            }
            Store => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&sd(SCRATCH1, src, 0).to_le_bytes());
            }
            Storeb => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&sb(SCRATCH1, src, 0).to_le_bytes());
            }
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        code.extend(&sd(SCRATCH1, src, 0).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        load_const(&mut code, SCRATCH2, *v);
                        code.extend(&sd(SCRATCH1, SCRATCH2, 0).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Lds => {
                let dst = reg(&operands[0])?;
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
                if addr > i32::MAX as u64 {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: addr as i64,
                        detail: "string address exceeds 32 bits".to_string(),
                        line,
                    }));
                }
                let (upper, lower) = split_li(addr as i64);
                code.extend(&lui(dst, upper).to_le_bytes());
                code.extend(&addi(dst, dst, lower).to_le_bytes());
            }
            Jmp => {
                let site = code.len();
                code.extend(&jal(0).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::RiscvRel { slot: RiscvSlot::Branch { jtype: true } },
                });
            }
            Call => {
                let site = code.len();
                code.extend(&jal(1).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::RiscvRel { slot: RiscvSlot::Branch { jtype: true } },
                });
            }
            Jz | Jnz | Jl | Jg => {
                let funct3 = match opcode {
                    Jz => 0b000,  // BEQ flags, x0
                    Jnz => 0b001, // BNE flags, x0
                    Jl => 0b100,  // BLT flags, x0
                    Jg => 0b100,  // BLT x0, flags (operand order swapped below)
                    _ => unreachable!(),
                };
                let site = code.len();
                let word = if matches!(opcode, Jg) {
                    branch_template(funct3, 0, FLAGS)
                } else {
                    branch_template(funct3, FLAGS, 0)
                };
                code.extend(&word.to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::RiscvRel { slot: RiscvSlot::Branch { jtype: false } },
                });
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
