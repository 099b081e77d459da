//! Pass 2 emission for x86-64 (spec.md §4.4). UA registers R0..R7 map
//! directly onto the 3-bit ModRM/SIB register field for rax,rcx,rdx,rbx,
//! rsp,rbp,rsi,rdi; the internal scratch register (r15) is reached only
//! through the REX extension bits and never collides with a UA register.

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use super::*;
use crate::common::{imm_value, label_name, reg_index, Layout};
use super::predict::{fits_i32, fits_i8};

/// A physical register reference: a 3-bit ModRM field plus whether the
/// extension bit (REX.R/X/B, depending on which field it lands in) must be
/// set. UA registers never need the extension bit; only the scratch
/// register does.
#[derive(Clone, Copy)]
struct Phys {
    field: u8,
    ext: bool,
}

fn ua(r: u8) -> Phys {
    Phys { field: r, ext: false }
}

fn scratch() -> Phys {
    Phys { field: SCRATCH, ext: true }
}

fn modrm(md: u8, reg: Phys, rm: Phys) -> u8 {
    (md << 6) | ((reg.field & 7) << 3) | (rm.field & 7)
}

/// REX prefix: `w` selects the 64-bit operand size, `ext_reg`/`ext_rm`
/// request the REX.R/REX.B bits for the ModRM `reg`/`rm` fields.
fn rex(w: bool, ext_reg: bool, ext_rm: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((ext_reg as u8) << 2) | (ext_rm as u8)
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
            Push => code.push(0x50 + reg(&operands[0])?),
            Pop => code.push(0x58 + reg(&operands[0])?),
            Inc => {
                let dst = ua(reg(&operands[0])?);
                code.push(rex(true, false, dst.ext));
                code.push(0xFF);
                code.push(modrm(0b11, ua(0), dst));
            }
            Dec => {
                let dst = ua(reg(&operands[0])?);
                code.push(rex(true, false, dst.ext));
                code.push(0xFF);
                code.push(modrm(0b11, ua(1), dst));
            }
            Not => {
                let dst = ua(reg(&operands[0])?);
                code.push(rex(true, false, dst.ext));
                code.push(0xF7);
                code.push(modrm(0b11, ua(2), dst));
            }
            Bswap => {
                let dst = reg(&operands[0])?;
                code.push(rex(true, false, false));
                code.push(0x0F);
                code.push(0xC8 + dst);
            }
            Ldi => {
                let dst = ua(reg(&operands[0])?);
                code.push(rex(true, false, dst.ext));
                code.push(0xC7);
                code.push(modrm(0b11, ua(0), dst));
                code.extend(&(imm_value(&operands[1]) as i32).to_le_bytes());
            }
            Mov => {
                let dst = ua(reg(&operands[0])?);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = ua(reg(&operands[1])?);
                        code.push(rex(true, src.ext, dst.ext));
                        code.push(0x89);
                        code.push(modrm(0b11, src, dst));
                    }
                    Operand::Immediate(v) => {
                        code.push(rex(true, false, dst.ext));
                        code.push(0xC7);
                        code.push(modrm(0b11, ua(0), dst));
                        code.extend(&(*v as i32).to_le_bytes());
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Add | Sub | And | Or | Xor | Cmp => {
                let dst = ua(reg(&operands[0])?);
                let (op_rr, digit) = alu_opcodes(*opcode);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = ua(reg(&operands[1])?);
                        code.push(rex(true, src.ext, dst.ext));
                        code.push(op_rr);
                        code.push(modrm(0b11, src, dst));
                    }
                    Operand::Immediate(v) => emit_alu_imm(&mut code, dst, digit, *v),
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Mul => {
                let dst = ua(reg(&operands[0])?);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = ua(reg(&operands[1])?);
                        code.push(rex(true, dst.ext, src.ext));
                        code.push(0x0F);
                        code.push(0xAF);
                        code.push(modrm(0b11, dst, src));
                    }
                    Operand::Immediate(v) if fits_i32(*v) => {
                        code.push(rex(true, dst.ext, dst.ext));
                        code.push(0x69);
                        code.push(modrm(0b11, dst, dst));
                        code.extend(&(*v as i32).to_le_bytes());
                    }
                    Operand::Immediate(v) => {
                        let scr = scratch();
                        code.push(rex(true, false, scr.ext));
                        code.push(0xC7);
                        code.push(modrm(0b11, ua(0), scr));
                        code.extend(&(*v as i32).to_le_bytes());
                        code.push(rex(true, dst.ext, scr.ext));
                        code.push(0x0F);
                        code.push(0xAF);
                        code.push(modrm(0b11, dst, scr));
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Div => {
                let dst = ua(reg(&operands[0])?);
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = ua(reg(&operands[1])?);
                        emit_div_sequence(&mut code, dst, src);
                    }
                    Operand::Immediate(v) => {
                        let scr = scratch();
                        code.push(rex(true, false, scr.ext));
                        code.push(0xC7);
                        code.push(modrm(0b11, ua(0), scr));
                        code.extend(&(*v as i32).to_le_bytes());
                        emit_div_sequence(&mut code, dst, scr);
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Shl | Shr => {
                let dst = ua(reg(&operands[0])?);
                let digit = if matches!(opcode, Shl) { ua(4) } else { ua(5) };
                match &operands[1] {
                    Operand::Register(_) => {
                        // Variable shift counts always come from CL on real
                        // x86; the UA register naming the count is assumed
                        // to already hold it there (matches the ISA's own
                        // constraint rather than inventing one).
                        code.push(rex(true, false, dst.ext));
                        code.push(0xD3);
                        code.push(modrm(0b11, digit, dst));
                    }
                    Operand::Immediate(v) => {
                        code.push(rex(true, false, dst.ext));
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
            Load | Get => emit_rip_mem(&mut code, &mut fixups, true, true, reg(&operands[0])?, label_name(&operands[1]), line),
            Store => emit_rip_mem(&mut code, &mut fixups, true, false, reg(&operands[1])?, label_name(&operands[0]), line),
            Loadb => emit_rip_mem(&mut code, &mut fixups, false, true, reg(&operands[0])?, label_name(&operands[1]), line),
            Storeb => emit_rip_mem(&mut code, &mut fixups, false, false, reg(&operands[1])?, label_name(&operands[0]), line),
            Set => {
                let name = label_name(&operands[0]).to_string();
                match &operands[1] {
                    Operand::Register(_) => {
                        let src = reg(&operands[1])?;
                        emit_rip_mem(&mut code, &mut fixups, true, false, src, &name, line);
                    }
                    Operand::Immediate(v) => {
                        code.push(rex(true, false, false));
                        code.push(0xC7);
                        code.push(modrm(0b00, ua(0), ua(0b101)));
                        let site = code.reserve_zeroed(4);
                        code.extend(&(*v as i32).to_le_bytes());
                        fixups.push(Fixup {
                            label: name,
                            site_offset: site as u64,
                            instr_addr: (site + 4 + 4) as u64,
                            line,
                            kind: FixupKind::X86Rel { width: 4 },
                        });
                    }
                    _ => unreachable!("shape guarantees register or immediate"),
                }
            }
            Lds => {
                let dst = ua(reg(&operands[0])?);
                code.push(rex(true, false, false));
                code.push(0x8D);
                code.push(modrm(0b00, dst, ua(0b101)));
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

fn alu_opcodes(opcode: Opcode) -> (u8, Phys) {
    use Opcode::*;
    match opcode {
        Add => (0x01, ua(0)),
        Or => (0x09, ua(1)),
        And => (0x21, ua(4)),
        Sub => (0x29, ua(5)),
        Xor => (0x31, ua(6)),
        Cmp => (0x39, ua(7)),
        _ => unreachable!("caller only passes ALU opcodes"),
    }
}

fn emit_alu_imm(code: &mut CodeBuffer, dst: Phys, digit: Phys, v: i64) {
    if fits_i8(v) {
        code.push(rex(true, false, dst.ext));
        code.push(0x83);
        code.push(modrm(0b11, digit, dst));
        code.push(v as i8 as u8);
    } else if fits_i32(v) {
        code.push(rex(true, false, dst.ext));
        code.push(0x81);
        code.push(modrm(0b11, digit, dst));
        code.extend(&(v as i32).to_le_bytes());
    } else {
        let scr = scratch();
        code.push(rex(true, false, scr.ext));
        code.push(0xB8 + (scr.field & 7));
        code.extend(&v.to_le_bytes());
        // The op's own opcode byte doubles as the Group-1 register-form
        // opcode one below its immediate-form counterpart (0x01 vs 0x81
        // etc. all share digit field semantics); reuse alu_opcodes's (op,
        // digit) pair to look up the register-form opcode via the digit.
        let op_rr = reg_form_opcode(digit);
        code.push(rex(true, scr.ext, dst.ext));
        code.push(op_rr);
        code.push(modrm(0b11, scr, dst));
    }
}

fn reg_form_opcode(digit: Phys) -> u8 {
    match digit.field {
        0 => 0x01, // ADD
        1 => 0x09, // OR
        4 => 0x21, // AND
        5 => 0x29, // SUB
        6 => 0x31, // XOR
        7 => 0x39, // CMP
        _ => unreachable!("alu_opcodes only ever returns these digits"),
    }
}

/// The 13-byte save/sign-extend/divide/restore sequence spec.md §4.4
/// describes; `src` is either a UA register or the scratch register
/// (when the caller already materialized an immediate divisor there).
fn emit_div_sequence(code: &mut CodeBuffer, dst: Phys, src: Phys) {
    code.push(0x52); // push rdx
    code.push(rex(true, dst.ext, false));
    code.push(0x89);
    code.push(modrm(0b11, dst, ua(0))); // mov rax, dst
    code.push(0x48);
    code.push(0x99); // cqo
    code.push(rex(true, false, src.ext));
    code.push(0xF7);
    code.push(modrm(0b11, ua(7), src)); // idiv src
    code.push(rex(true, false, dst.ext));
    code.push(0x89);
    code.push(modrm(0b11, ua(0), dst)); // mov dst, rax
    code.push(0x5A); // pop rdx
}

/// RIP-relative memory access used by `LOAD`/`STORE`/`LOADB`/`STOREB`/`GET`/
/// register-form `SET` (spec.md §4.4: "x86-64 uses a single RIP-relative
/// instruction"). `wide` selects the 64-bit or byte-sized opcode; `load`
/// selects direction (register <- memory, or memory <- register).
fn emit_rip_mem(
    code: &mut CodeBuffer,
    fixups: &mut FixupTable,
    wide: bool,
    load: bool,
    reg: u8,
    label: &str,
    line: u32,
) {
    let r = ua(reg);
    code.push(rex(wide, r.ext, false));
    code.push(match (wide, load) {
        (true, true) => 0x8B,
        (true, false) => 0x89,
        (false, true) => 0x8A,
        (false, false) => 0x88,
    });
    code.push(modrm(0b00, r, ua(0b101)));
    let site = code.reserve_zeroed(4);
    fixups.push(Fixup {
        label: label.to_string(),
        site_offset: site as u64,
        instr_addr: (site + 4) as u64,
        line,
        kind: FixupKind::X86Rel { width: 4 },
    });
}
