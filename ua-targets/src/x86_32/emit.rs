//! Pass 2 emission for IA-32 (spec.md §4.4): the same instruction shapes
//! as the 64-bit emitter, minus REX prefixes, with memory operands
//! addressed as flat 32-bit absolute addresses instead of RIP-relative.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::predict::{fits_i32, fits_i8};
use super::SCRATCH;
use crate::common::{imm_value, label_name, reg_index, Layout};

fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 7) << 3) | (rm & 7)
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
            Nop => code.push(0x90),
            Hlt | Ret => code.push(0xC3),
            Pusha => code.push(0x60),
            Popa => code.push(0x61),
            Push => code.push(0x50 + reg(&operands[0])?),
            Pop => code.push(0x58 + reg(&operands[0])?),
            Inc => code.push(0x40 + reg(&operands[0])?),
            Dec => code.push(0x48 + reg(&operands[0])?),
            Not => {
                let dst = reg(&operands[0])?;
                code.push(0xF7);
                code.push(modrm(0b11, 2, dst));
            }
            Bswap => {
                let dst = reg(&operands[0])?;
                code.push(0x0F);
                code.push(0xC8 + dst);
            }
            Ldi => {
                let dst = reg(&operands[0])?;
                code.push(0xB8 + dst);
                code.extend(&(imm_value(&operands[1]) as i32).to_le_bytes());
            }
            Mov => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(0x89);
                        code.push(modrm(0b11, src, dst));
                    }
                    Operand::Immediate(v) => {
                        code.push(0xB8 + dst);
                        code.extend(&(*v as i32).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Add | Sub | And | Or | Xor | Cmp => {
                let dst = reg(&operands[0])?;
                let (op_rr, digit) = alu_opcodes(*opcode);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(op_rr);
                        code.push(modrm(0b11, src, dst));
                    }
                    Operand::Immediate(v) => emit_alu_imm(&mut code, dst, digit, *v),
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Mul => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        code.push(0x0F);
                        code.push(0xAF);
                        code.push(modrm(0b11, dst, src));
                    }
                    Operand::Immediate(v) => {
                        code.push(0x69);
                        code.push(modrm(0b11, dst, dst));
                        code.extend(&(*v as i32).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Div => {
                let dst = reg(&operands[0])?;
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        emit_div_sequence(&mut code, dst, src);
                    }
                    Operand::Immediate(v) => {
                        code.push(0xB8 + SCRATCH);
                        code.extend(&(*v as i32).to_le_bytes());
                        emit_div_sequence(&mut code, dst, SCRATCH);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Shl | Shr => {
                let dst = reg(&operands[0])?;
                let digit = if matches!(opcode, Shl) { 4 } else { 5 };
                match &operands[1] {
                    Operand::Register(_) => {
                        code.push(0xD3);
                        code.push(modrm(0b11, digit, dst));
                    }
                    Operand::Immediate(v) => {
                        code.push(0xC1);
                        code.push(modrm(0b11, digit, dst));
                        code.push(*v as u8);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Cpuid => {
                code.push(0x0F);
                code.push(0xA2);
            }
            Rdtsc => {
                code.push(0x0F);
                code.push(0x31);
            }
            Sys => {
                code.push(0x0F);
                code.push(0x05);
            }
            Int => {
                code.push(0xCD);
                code.push(imm_value(&operands[0]) as u8);
            }
            Load | Get => emit_abs_mem(&mut code, &mut fixups, true, reg(&operands[0])?, label_name(&operands[1]), line),
            Store => emit_abs_mem(&mut code, &mut fixups, false, reg(&operands[1])?, label_name(&operands[0]), line),
            Loadb => emit_abs_mem(&mut code, &mut fixups, true, reg(&operands[0])?, label_name(&operands[1]), line),
            Storeb => emit_abs_mem(&mut code, &mut fixups, false, reg(&operands[1])?, label_name(&operands[0]), line),
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        emit_abs_mem(&mut code, &mut fixups, false, src, &name, line);
                    }
                    Operand::Immediate(v) => {
                        code.push(0xC7);
                        code.push(modrm(0b00, 0, 0b101));
                        let site = code.reserve_zeroed(4);
                        code.extend(&(*v as i32).to_le_bytes());
                        fixups.push(Fixup {
                            label: name,
                            site_offset: site as u64,
                            instr_addr: 0,
                            line,
                            kind: FixupKind::X86Rel { width: 4 },
                        });
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Lds => {
                let dst = reg(&operands[0])?;
                code.push(0x8D);
                code.push(modrm(0b00, dst, 0b101));
                let site = code.reserve_zeroed(4);
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
                code.patch(site, &(addr as i32).to_le_bytes());
            }
            Jmp | Call => {
                code.push(if matches!(opcode, Jmp) { 0xE9 } else { 0xE8 });
                let site = code.reserve_zeroed(4);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site + 4) as u64,
                    line,
                    kind: FixupKind::X86Rel { width: 4 },
                });
            }
            Jz | Jnz | Jl | Jg => {
                code.push(0x0F);
                code.push(match opcode {
                    Jz => 0x84,
                    Jnz => 0x85,
                    Jl => 0x8C,
                    Jg => 0x8F,
                    _ => unreachable!(),
                });
                let site = code.reserve_zeroed(4);
                fixups.push(Fixup {
                    label: label_name(&operands[0]).to_string(),
                    site_offset: site as u64,
                    instr_addr: (site + 4) as u64,
                    line,
                    kind: FixupKind::X86Rel { width: 4 },
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

fn alu_opcodes(opcode: Opcode) -> (u8, u8) {
    use Opcode::*;
    match opcode {
        Add => (0x01, 0),
        Or => (0x09, 1),
        And => (0x21, 4),
        Sub => (0x29, 5),
        Xor => (0x31, 6),
        Cmp => (0x39, 7),
        _ => unreachable!("caller only passes ALU opcodes"),
    }
}

fn emit_alu_imm(code: &mut CodeBuffer, dst: u8, digit: u8, v: i64) {
    if fits_i8(v) {
        code.push(0x83);
        code.push(modrm(0b11, digit, dst));
        code.push(v as i8 as u8);
    } else {
        debug_assert!(fits_i32(v), "predict_size already range-checked this immediate");
        code.push(0x81);
        code.push(modrm(0b11, digit, dst));
        code.extend(&(v as i32).to_le_bytes());
    }
}

/// The 9-byte save/sign-extend/divide/restore sequence (spec.md §4.4);
/// `src` is either a UA register or the scratch register.
fn emit_div_sequence(code: &mut CodeBuffer, dst: u8, src: u8) {
    code.push(0x52); // push edx
    code.push(0x89);
    code.push(modrm(0b11, dst, 0)); // mov eax, dst
    code.push(0x99); // cdq
    code.push(0xF7);
    code.push(modrm(0b11, 7, src)); // idiv src
    code.push(0x89);
    code.push(modrm(0b11, 0, dst)); // mov dst, eax
    code.push(0x5A); // pop edx
}

/// Flat 32-bit absolute memory access used by `LOAD`/`STORE`/`LOADB`/
/// `STOREB`/`GET`/register-form `SET` (spec.md §4.4). `load` selects
/// direction; IA-32's byte-sized opcodes reuse the same modrm shape.
fn emit_abs_mem(
    code: &mut CodeBuffer,
    fixups: &mut FixupTable,
    load: bool,
    reg: u8,
    label: &str,
    line: u32,
) {
    code.push(if load { 0x8B } else { 0x89 });
    code.push(modrm(0b00, reg, 0b101));
    let site = code.reserve_zeroed(4);
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: site as u64,
        instr_addr: 0,
        line,
        kind: FixupKind::X86Rel { width: 4 },
    });
}

#[cfg(test)]
mod tests {
    use ua_core::prelude::*;

    use crate::x86_32::X86_32Emitter;

    #[test]
    fn ldi_and_hlt_encode_expected_bytes() {
        let ir = ua_core::parse::parse("LDI R0, 10\nHLT\n").unwrap();
        let bytes = X86_32Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(bytes, vec![0xB8, 0x0A, 0x00, 0x00, 0x00, 0xC3]);
    }

    #[test]
    fn mov_register_to_register_uses_modrm_form() {
        let ir = ua_core::parse::parse("MOV R1, R0\nHLT\n").unwrap();
        let bytes = X86_32Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(&bytes[..2], &[0x89, 0xC1]);
    }

    #[test]
    fn add_with_small_immediate_uses_three_byte_form() {
        let ir = ua_core::parse::parse("ADD R0, 5\nHLT\n").unwrap();
        let bytes = X86_32Emitter.assemble(&ir).unwrap().code.into_vec();
        assert_eq!(&bytes[..3], &[0x83, 0xC0, 0x05]);
    }
}
