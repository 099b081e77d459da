//! Pass 2 emission for AArch64 (spec.md §4.4), built the same
//! bit-composition way as the ARMv7-A emitter but against the A64
//! encoding tables.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::predict::{fits_32, fits_movz_alone};
use super::{SCRATCH1, SCRATCH2};
use crate::common::{imm_value, label_name, reg_index, Layout};

fn movz(rd: u8, imm16: u16, hw: u32) -> u32 {
    (1 << 31) | (0b10 << 29) | (0x25 << 23) | (hw << 21) | ((imm16 as u32) << 5) | rd as u32
}

fn movk(rd: u8, imm16: u16, hw: u32) -> u32 {
    (1 << 31) | (0b11 << 29) | (0x25 << 23) | (hw << 21) | ((imm16 as u32) << 5) | rd as u32
}

fn add_sub(op: u32, s: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    (1 << 31) | (op << 30) | (s << 29) | (0x0B << 24) | ((rm as u32) << 16) | ((rn as u32) << 5) | rd as u32
}

fn add_sub_imm(op: u32, s: u32, rd: u8, rn: u8, imm12: u16) -> u32 {
    (1 << 31) | (op << 30) | (s << 29) | (0x11 << 24) | ((imm12 as u32 & 0xFFF) << 10) | ((rn as u32) << 5) | rd as u32
}

fn logical(opc: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    (1 << 31) | (opc << 29) | (0x0A << 24) | ((rm as u32) << 16) | ((rn as u32) << 5) | rd as u32
}

fn mul(rd: u8, rn: u8, rm: u8) -> u32 {
    (1 << 31) | (0xD8 << 21) | ((rm as u32) << 16) | (31 << 10) | ((rn as u32) << 5) | rd as u32
}

fn sdiv(rd: u8, rn: u8, rm: u8) -> u32 {
    (1 << 31) | (0xD6 << 21) | ((rm as u32) << 16) | (0x03 << 10) | ((rn as u32) << 5) | rd as u32
}

fn shift_reg(lsl: bool, rd: u8, rn: u8, rm: u8) -> u32 {
    let op6: u32 = if lsl { 0x08 } else { 0x09 };
    (1 << 31) | (0xD6 << 21) | ((rm as u32) << 16) | (op6 << 10) | ((rn as u32) << 5) | rd as u32
}

fn mov_reg(rd: u8, rm: u8) -> u32 {
    0xAA0003E0 | ((rm as u32) << 16) | rd as u32
}

fn mvn_reg(rd: u8, rm: u8) -> u32 {
    0xAA2003E0 | ((rm as u32) << 16) | rd as u32
}

fn rev64(rd: u8, rn: u8) -> u32 {
    0xDAC00C00 | ((rn as u32) << 5) | rd as u32
}

fn ldst_imm(byte: bool, load: bool, rt: u8, rn: u8) -> u32 {
    let top: u32 = if byte { 0x39 } else { 0xF9 };
    let opc = load as u32;
    (top << 24) | (opc << 22) | ((rn as u32) << 5) | rt as u32
}

fn branch(link: bool) -> u32 {
    ((link as u32) << 31) | (0x05 << 26)
}

fn bcond(cond: u8) -> u32 {
    (0x54 << 24) | (cond as u32)
}

fn svc(imm16: u16) -> u32 {
    (0x6A0 << 21) | ((imm16 as u32) << 5) | 1
}

const NOP: u32 = 0xD503201F;
const RET: u32 = 0xD65F03C0;
const WFI: u32 = 0xD503203F;
const DMB: u32 = 0xD5033FBF;

fn load_addr_fixup(code: &mut CodeBuffer, fixups: &mut FixupTable, rd: u8, label: &str, line: u32) {
    let lo_site = code.len();
    code.extend(&movz(rd, 0, 0).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: lo_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::ArmRel { slot: ArmSlot::Lo16 },
    });
    let hi_site = code.len();
    code.extend(&movk(rd, 0, 1).to_le_bytes());
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: hi_site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::ArmRel { slot: ArmSlot::Hi16 },
    });
}

fn load_const(code: &mut CodeBuffer, rd: u8, v: i64) {
    let bits = v as u32;
    code.extend(&movz(rd, (bits & 0xFFFF) as u16, 0).to_le_bytes());
    if !fits_movz_alone(v) {
        code.extend(&movk(rd, (bits >> 16) as u16, 1).to_le_bytes());
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
            Hlt | Ret => code.extend(&RET.to_le_bytes()),
            Wfi => code.extend(&WFI.to_le_bytes()),
            Dmb => code.extend(&DMB.to_le_bytes()),
            Push => {
                let r = reg(&operands[0])?;
                code.extend(&ldst_pre(true, r, 31, -16).to_le_bytes());
            }
            Pop => {
                let r = reg(&operands[0])?;
                code.extend(&ldst_post(false, r, 31, 16).to_le_bytes());
            }
            Inc => {
                let r = reg(&operands[0])?;
                code.extend(&add_sub_imm(0, 0, r, r, 1).to_le_bytes());
            }
            Dec => {
                let r = reg(&operands[0])?;
                code.extend(&add_sub_imm(1, 0, r, r, 1).to_le_bytes());
            }
            Not => {
                let r = reg(&operands[0])?;
                code.extend(&mvn_reg(r, r).to_le_bytes());
            }
            Bswap => {
                let r = reg(&operands[0])?;
                code.extend(&rev64(r, r).to_le_bytes());
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
                        code.extend(&mov_reg(dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => load_const(&mut code, dst, *v),
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Add | Sub | Cmp => {
                let dst = reg(&operands[0])?;
                let op = if matches!(opcode, Sub | Cmp) { 1 } else { 0 };
                let (s, rd) = if matches!(opcode, Cmp) { (1, 31) } else { (0, dst) };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&add_sub(op, s, rd, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) if (0..=4095).contains(v) => {
                        code.extend(&add_sub_imm(op, s, rd, dst, *v as u16).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&add_sub(op, s, rd, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            And | Or | Xor => {
                let dst = reg(&operands[0])?;
                let opc = match opcode {
                    And => 0,
                    Or => 1,
                    Xor => 2,
                    _ => unreachable!(),
                };
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&logical(opc, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_const(&mut code, SCRATCH1, *v);
                        code.extend(&logical(opc, dst, dst, SCRATCH1).to_le_bytes());
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
                let lsl = matches!(opcode, Shl);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.extend(&shift_reg(lsl, dst, dst, src).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        // This dialect always materializes the shift amount
                        // into a scratch register rather than decoding
                        // `UBFM`'s bitfield-immediate form.
                        code.extend(&movz(SCRATCH1, *v as u16, 0).to_le_bytes());
                        code.extend(&shift_reg(lsl, dst, dst, SCRATCH1).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Int => code.extend(&svc(imm_value(&operands[0]) as u16).to_le_bytes()),
            Load | Get => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&ldst_imm(false, true, dst, SCRATCH1).to_le_bytes());
            }
            Loadb => {
                let dst = reg(&operands[0])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[1]), line);
                code.extend(&ldst_imm(true, true, dst, SCRATCH1).to_le_bytes());
            }
            Store => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&ldst_imm(false, false, src, SCRATCH1).to_le_bytes());
            }
            Storeb => {
                let src = reg(&operands[1])?;
                load_addr_fixup(&mut code, &mut fixups, SCRATCH1, label_name(&operands[0]), line);
                code.extend(&ldst_imm(true, false, src, SCRATCH1).to_le_bytes());
            }
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        code.extend(&ldst_imm(false, false, src, SCRATCH1).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        load_addr_fixup(&mut code, &mut fixups, SCRATCH1, &name, line);
                        let bits = *v as u32;
                        code.extend(&movz(SCRATCH2, (bits & 0xFFFF) as u16, 0).to_le_bytes());
                        code.extend(&movk(SCRATCH2, (bits >> 16) as u16, 1).to_le_bytes());
                        code.extend(&ldst_imm(false, false, SCRATCH2, SCRATCH1).to_le_bytes());
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
                code.extend(&movz(dst, (addr & 0xFFFF) as u16, 0).to_le_bytes());
                code.extend(&movk(dst, ((addr >> 16) & 0xFFFF) as u16, 1).to_le_bytes());
            }
            Jmp | Call => {
                let link = matches!(opcode, Call);
                let site = code.len();
                code.extend(&branch(link).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 26 } },
                });
            }
            Jz | Jnz | Jl | Jg => {
                let cond = match opcode {
                    Jz => 0x0,
                    Jnz => 0x1,
                    Jl => 0xB,
                    Jg => 0xC,
                    _ => unreachable!(),
                };
                let site = code.len();
                code.extend(&bcond(cond).to_le_bytes());
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: site as u64,
                    line,
                    kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 19 } },
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

/// `STR Xt, [Xn, #simm]!` pre-indexed, used only for `PUSH` with `simm`
/// negative (stack grows down).
fn ldst_pre(store_is_push: bool, rt: u8, rn: u8, simm9: i32) -> u32 {
    let _ = store_is_push;
    let imm9 = (simm9 & 0x1FF) as u32;
    (0xF8 << 24) | (imm9 << 12) | (0b11 << 10) | ((rn as u32) << 5) | rt as u32
}

/// `LDR Xt, [Xn], #simm` post-indexed, used only for `POP`.
fn ldst_post(_load: bool, rt: u8, rn: u8, simm9: i32) -> u32 {
    let imm9 = (simm9 & 0x1FF) as u32;
    (0xF8 << 24) | (1 << 22) | (imm9 << 12) | (0b01 << 10) | ((rn as u32) << 5) | rt as u32
}

#[cfg(test)]
mod tests {
    use ua_core::prelude::*;

    use crate::arm64::Arm64Emitter;

    #[test]
    fn small_literal_needs_only_movz() {
        let ir = ua_core::parse::parse("LDI R0, 5\nHLT\n").unwrap();
        let bytes = Arm64Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(bytes.len(), 8); // one MOVZ + RET
    }

    #[test]
    fn wide_literal_needs_movz_and_movk() {
        let ir = ua_core::parse::parse("LDI R0, 0x12345678\nHLT\n").unwrap();
        let bytes = Arm64Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(bytes.len(), 12); // MOVZ + MOVK + RET
    }

    #[test]
    fn nop_encodes_the_real_a64_hint_nop() {
        let ir = ua_core::parse::parse("NOP\nHLT\n").unwrap();
        let bytes = Arm64Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(&bytes[..4], &NOP.to_le_bytes());
    }
}
