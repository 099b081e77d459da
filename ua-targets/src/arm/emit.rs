//! Pass 2 emission for ARMv7-A (spec.md §4.4). Every word is built by
//! composing the A32 instruction fields directly rather than by opcode
//! table lookup, since ARM's encoding is bit-field driven rather than
//! byte-sequence driven the way x86's and the 8051 dialect's are.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::predict::{fits_32, fits_movw_alone};
use super::{SCRATCH1, SCRATCH2};
use crate::common::{imm_value, label_name, reg_index, Layout};

const COND_AL: u32 = 0xE;

fn dp(opcode: u8, s: bool, i: bool, rn: u8, rd: u8, op2: u32) -> u32 {
    (COND_AL << 28)
        | ((i as u32) << 25)
        | ((opcode as u32) << 21)
        | ((s as u32) << 20)
        | ((rn as u32) << 16)
        | ((rd as u32) << 12)
        | (op2 & 0xFFF)
}

fn dp_reg(opcode: u8, s: bool, rn: u8, rd: u8, rm: u8) -> u32 {
    dp(opcode, s, false, rn, rd, rm as u32)
}

fn dp_imm8(opcode: u8, s: bool, rn: u8, rd: u8, imm8: u8) -> u32 {
    dp(opcode, s, true, rn, rd, imm8 as u32)
}

fn movw(rd: u8, imm16: u16) -> u32 {
    let imm4 = ((imm16 >> 12) & 0xF) as u32;
    let imm12 = (imm16 & 0xFFF) as u32;
    (COND_AL << 28) | (0x30 << 20) | (imm4 << 16) | ((rd as u32) << 12) | imm12
}

fn movt(rd: u8, imm16: u16) -> u32 {
    let imm4 = ((imm16 >> 12) & 0xF) as u32;
    let imm12 = (imm16 & 0xFFF) as u32;
    (COND_AL << 28) | (0x34 << 20) | (imm4 << 16) | ((rd as u32) << 12) | imm12
}

fn shift_imm(rd: u8, rm: u8, shift_type: u8, amount: u8) -> u32 {
    let op2 = ((amount as u32 & 0x1F) << 7) | ((shift_type as u32 & 0x3) << 5) | (rm as u32);
    dp(0xD, false, false, 0, rd, op2)
}

fn shift_reg(rd: u8, rm: u8, shift_type: u8, rs: u8) -> u32 {
    let op2 = ((rs as u32 & 0xF) << 8) | ((shift_type as u32 & 0x3) << 5) | (1 << 4) | (rm as u32);
    dp(0xD, false, false, 0, rd, op2)
}

fn mul(rd: u8, rm: u8, rs: u8) -> u32 {
    (COND_AL << 28) | ((rd as u32) << 16) | ((rs as u32) << 8) | (0x9 << 4) | (rm as u32)
}

fn sdiv(rd: u8, rn: u8, rm: u8) -> u32 {
    (COND_AL << 28) | (0x71 << 20) | ((rd as u32) << 16) | (0xF << 12) | ((rm as u32) << 8) | (0x1 << 4) | (rn as u32)
}

fn rev(rd: u8, rm: u8) -> u32 {
    (COND_AL << 28) | (0x6B << 20) | (0xF << 16) | ((rd as u32) << 12) | (0xF << 8) | (0x3 << 4) | (rm as u32)
}

fn push(rt: u8) -> u32 {
    (COND_AL << 28) | (0x52D << 12) | 4 | ((rt as u32) << 12)
}

fn pop(rt: u8) -> u32 {
    (COND_AL << 28) | (0x49D << 12) | 4 | ((rt as u32) << 12)
}

fn ldr_str(rt: u8, rn: u8, load: bool, byte: bool) -> u32 {
    // [Rn, #0], pre-indexed, no writeback.
    let l = load as u32;
    let b = byte as u32;
    (COND_AL << 28) | (0x5 << 24) | (1 << 23) | (b << 22) | ((rn as u32) << 16) | ((rt as u32) << 12) | (l << 20)
}

fn bx_lr() -> u32 {
    (COND_AL << 28) | (0x12FFF1 << 4) | 14
}

fn svc(imm24: u32) -> u32 {
    (0xF << 28) | (0xF << 24) | (imm24 & 0xFF_FFFF)
}

const NOP: u32 = 0xE320F000;
const WFI: u32 = 0xE320F003;
const DMB: u32 = 0xF57FF05F;

/// Always-two-word address materialization: the value isn't known until
/// the fixup pass, so a `MOVW`+`MOVT` pair is reserved with zero
/// placeholders and a pair of fixups recorded against it.
fn load_addr_fixup(code: &mut CodeBuffer, fixups: &mut FixupTable, rd: u8, label: &str, line: u32) {
    let lo_site = code.len();
    code.extend(&movw(rd, 0).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: lo_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::ArmRel { slot: ArmSlot::Lo16 },
    });
    let hi_site = code.len();
    code.extend(&movt(rd, 0).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: hi_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::ArmRel { slot: ArmSlot::Hi16 },
    });
}

/// Conditionally one or two words, matching `predict::ldi_size`: used for
/// literal immediates known at parse time, never for label addresses.
fn load_const(code: &mut CodeBuffer, rd: u8, v: i64) {
    let bits = v as u32;
    code.extend(&movw(rd, (bits & 0xFFFF) as u16).to_le_bytes());
    if !fits_movw_alone(v) {
        code.extend(&movt(rd, (bits >> 16) as u16).to_le_bytes());
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
            Ok(r)
        };

        use Opcode::*;
        match opcode {
            Nop => code.extend(&NOP.to_le_bytes()),
            Hlt | Ret => code.extend(&bx_lr().to_le_bytes()),
            Wfi => code.extend(&WFI.to_le_bytes()),
            Dmb => code.extend(&DMB.to_le_bytes()),
            Push => code.extend(&push(reg(&operands[0])?).to_le_bytes()),
            Pop => code.extend(&pop(reg(&operands[0])?).to_le_bytes()),
            Inc => {
                let r = reg(&operands[0])?;
                code.extend(&dp_imm8(0x4, false, r, r, 1).to_le_bytes());
            }
            Dec => {
                let r = reg(&operands[0])?;
                code.extend(&dp_imm8(0x2, false, r, r, 1).to_le_bytes());
            }
            Not => {
                let r = reg(&operands[0])?;
                code.extend(&dp_reg(0xF, false, 0, r, r).to_le_bytes());
            }
            Bswap => {
                let r = reg(&operands[0])?;
                code.extend(&rev(r, r).to_le_bytes());
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
                        code.extend(&dp_reg(0xD, false, 0, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => load_const(&mut code, dst, *v),
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Add | Sub | And | Or | Xor | Cmp => {
                let dst = reg(&operands[0])?;
                let opc = alu_opcode(*opcode);
                let (s, rd) = if matches!(opcode, Cmp) { (true, 0) } else { (false, dst) };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&dp_reg(opc, s, dst, rd, src).to_le_bytes());
                    }
                    Operand::Immediate(v) if (0..=255).contains(v) => {
                        code.extend(&dp_imm8(opc, s, dst, rd, *v as u8).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&dp_reg(opc, s, dst, rd, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Mul => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&mul(dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&mul(dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Div => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&sdiv(dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&sdiv(dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Shl | Shr => {
                let dst = reg(&operands[0])?;
                let shift_type = if matches!(opcode, Shl) { 0 } else { 1 };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&shift_reg(dst, dst, shift_type, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        code.extend(&shift_imm(dst, dst, shift_type, *v as u8).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Int => code.extend(&svc(imm_value(&operands[0]) as u32).to_le_bytes()),
            Load | Get => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&ldr_str(dst, SCRATCH1, true, false).to_le_bytes());
            }
            Loadb => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&ldr_str(dst, SCRATCH1, true, true).to_le_bytes());
            }
            Store => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&ldr_str(src, SCRATCH1, false, false).to_le_bytes());
            }
            Storeb => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&ldr_str(src, SCRATCH1, false, true).to_le_bytes());
            }
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        code.extend(&ldr_str(src, SCRATCH1, false, false).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        // Unconditionally two words, matching predict.rs's
                        // fixed 20-byte budget for `SET name, imm`.
                        let bits = *v as u32;
                        code.extend(&movw(SCRATCH2, (bits & 0xFFFF) as u16).to_le_bytes());
                        code.extend(&movt(SCRATCH2, (bits >> 16) as u16).to_le_bytes());
                        code.extend(&ldr_str(SCRATCH2, SCRATCH1, false, false).to_le_bytes());
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
                if !fits_32(addr as i64) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: addr as i64,
                        detail: "string address exceeds 32 bits".to_string(),
                        line,
                    }));
                }
                code.extend(&movw(dst, (addr & 0xFFFF) as u16).to_le_bytes());
                code.extend(&movt(dst, ((addr >> 16) & 0xFFFF) as u16).to_le_bytes());
            }
            Jmp | Call => {
                let link = matches!(opcode, Call);
                let site = code.len();
                code.extend(&branch_template(None, link).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 24 } },
                });
            }
            Jz | Jnz | Jl | Jg => {
                let cond = match opcode {
                    Jz => 0x0,  // EQ
                    Jnz => 0x1, // NE
                    Jl => 0xB,  // LT (signed)
                    Jg => 0xC,  // GT (signed)
                    _ => unreachable!(),
                };
                let site = code.len();
                code.extend(&branch_template(Some(cond), false).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 24 } },
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

fn alu_opcode(opcode: Opcode) -> u8 {
    use Opcode::*;
    match opcode {
        Add => 0x4,
        Sub => 0x2,
        And => 0x0,
        Or => 0xC,
        Xor => 0x1,
        Cmp => 0xA,
        _ => unreachable!("caller only passes ALU opcodes"),
    }
}

/// `B`/`BL` (unconditional) or `B.cond` template with a zero 24-bit
/// displacement; `cond` of `None` means `AL`.
fn branch_template(cond: Option<u8>, link: bool) -> u32 {
    let c = cond.unwrap_or(0xE) as u32;
    (c << 28) | (0x5 << 25) | ((link as u32) << 24)
}
