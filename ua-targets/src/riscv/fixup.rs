//! Pass 3 fixup patching for RV64I+M (spec.md §4.4). Branch/jump
//! fixups use `target - instr_addr` directly — RISC-V's PC-relative
//! immediates have no ARM-style `+8` bias — encoded as a B-type (13-bit
//! signed, `±4KiB`) or J-type (21-bit signed, `±1MiB`) field depending on
//! which kind of instruction recorded the fixup. `LUI+ADDI` address-load
//! fixups carry no displacement at all: they patch in the two halves of
//! the absolute target value itself.

use ua_core::prelude::*;

use crate::common::Layout;

pub fn patch(code: &mut CodeBuffer, fixups: &FixupTable, layout: &Layout) -> Result<(), UaError> {
    for fixup in fixups.iter() {
        let target = layout.resolve(&fixup.label).ok_or_else(|| {
            UaError::Codegen(CodegenError::UndefinedLabel {
                name: fixup.label.clone(),
                line: fixup.line,
            })
        })?;

        let FixupKind::RiscvRel { slot } = fixup.kind else {
            unreachable!("RISC-V only ever records RiscvRel fixups, got {:?}", fixup.kind);
        };

        match slot {
            RiscvSlot::Branch { jtype } => {
                let disp = target as i64 - fixup.instr_addr as i64;
                if disp % 2 != 0 {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: "RISC-V branch target must be halfword-aligned".to_string(),
                        line: fixup.line,
                    }));
                }
                let (bits, detail) = if jtype {
                    (21, "RISC-V jump displacement must fit a 21-bit signed field (±1MiB)")
                } else {
                    (13, "RISC-V branch displacement must fit a 13-bit signed field (±4KiB)")
                };
                let half_range = 1i64 << (bits - 1);
                if !(-half_range..half_range).contains(&disp) {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: detail.to_string(),
                        line: fixup.line,
                    }));
                }

                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                let imm = disp as u32;
                if jtype {
                    // J-type: imm[20|10:1|11|19:12] packed into bits 31:12.
                    let b20 = (imm >> 20) & 0x1;
                    let b10_1 = (imm >> 1) & 0x3FF;
                    let b11 = (imm >> 11) & 0x1;
                    let b19_12 = (imm >> 12) & 0xFF;
                    word |= (b20 << 31) | (b10_1 << 21) | (b11 << 20) | (b19_12 << 12);
                } else {
                    // B-type: imm[12|10:5] in bits 31:25, imm[4:1|11] in bits 11:7.
                    let b12 = (imm >> 12) & 0x1;
                    let b10_5 = (imm >> 5) & 0x3F;
                    let b4_1 = (imm >> 1) & 0xF;
                    let b11 = (imm >> 11) & 0x1;
                    word |= (b12 << 31) | (b10_5 << 25) | (b4_1 << 8) | (b11 << 7);
                }
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
            RiscvSlot::Hi20 => {
                if target > i32::MAX as u64 {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: target as i64,
                        detail: "RISC-V absolute address exceeds 32 bits".to_string(),
                        line: fixup.line,
                    }));
                }
                let (upper, _) = split_li(target as i64);
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                word |= upper << 12;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
            RiscvSlot::Lo12 => {
                if target > i32::MAX as u64 {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: target as i64,
                        detail: "RISC-V absolute address exceeds 32 bits".to_string(),
                        line: fixup.line,
                    }));
                }
                let (_, lower) = split_li(target as i64);
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                word |= ((lower as u32) & 0xFFF) << 20;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
        }
    }
    Ok(())
}

/// Mirrors `emit.rs`'s `split_li`: the upper 20 bits of `v`, rounded to
/// compensate for the paired `ADDI`'s sign-extended lower 12 bits.
fn split_li(v: i64) -> (u32, i32) {
    let v32 = v as i32 as u32;
    let lower = (v32 & 0xFFF) as i32;
    let lower = (lower << 20) >> 20;
    let upper = v32.wrapping_sub(lower as u32) >> 12;
    (upper, lower)
}
