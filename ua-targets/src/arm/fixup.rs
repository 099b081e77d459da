//! Pass 3 fixup patching for ARMv7-A (spec.md §4.4). Branch displacements
//! use `(target - (instr_addr + 8)) >> 2` — ARM's classic "PC is two
//! instructions ahead of the one executing" rule — encoded as a 24-bit
//! signed field OR'd into the stored `B`/`BL`/`B.cond` template.
//! `MOVW`/`MOVT` address-load fixups need no PC-relative arithmetic: each
//! just inserts its 16-bit slice of the absolute target address.

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

        let FixupKind::ArmRel { slot } = fixup.kind else {
            unreachable!("ARM only ever records ArmRel fixups, got {:?}", fixup.kind);
        };

        match slot {
            ArmSlot::Branch { .. } => {
                let origin = fixup.instr_addr as i64 + 8;
                let disp = target as i64 - origin;
                if disp % 4 != 0 {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: "ARM branch target must be word-aligned".to_string(),
                        line: fixup.line,
                    }));
                }
                let imm24 = disp >> 2;
                if !(-(1 << 23)..(1 << 23)).contains(&imm24) {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: "ARM branch displacement must fit a 24-bit signed field".to_string(),
                        line: fixup.line,
                    }));
                }
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                word |= (imm24 as u32) & 0x00FF_FFFF;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
            ArmSlot::Lo16 | ArmSlot::Hi16 => {
                if !(0..=u32::MAX as u64).contains(&target) {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: target as i64,
                        detail: "ARM absolute address exceeds 32 bits".to_string(),
                        line: fixup.line,
                    }));
                }
                let half = match slot {
                    ArmSlot::Lo16 => (target & 0xFFFF) as u16,
                    ArmSlot::Hi16 => ((target >> 16) & 0xFFFF) as u16,
                    ArmSlot::Branch { .. } => unreachable!(),
                };
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                let imm4 = ((half >> 12) & 0xF) as u32;
                let imm12 = (half & 0xFFF) as u32;
                word |= (imm4 << 16) | imm12;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
        }
    }
    Ok(())
}
