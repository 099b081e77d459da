//! Pass 3 fixup patching for AArch64 (spec.md §4.4). Unlike ARMv7-A,
//! AArch64's PC-relative branch encodings measure displacement from the
//! instruction's own address with no `+8` bias. `B`/`BL` carry a 26-bit
//! signed word-displacement field; `B.cond` carries a narrower 19-bit
//! field. `MOVZ`/`MOVK` address-load fixups insert a 16-bit slice of the
//! absolute target into the template's `imm16` field at bits 20:5.

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
            unreachable!("AArch64 only ever records ArmRel fixups, got {:?}", fixup.kind);
        };

        match slot {
            ArmSlot::Branch { bits } => {
                let disp = target as i64 - fixup.instr_addr as i64;
                if disp % 4 != 0 {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: "AArch64 branch target must be word-aligned".to_string(),
                        line: fixup.line,
                    }));
                }
                let field = disp >> 2;
                let half_range = 1i64 << (bits - 1);
                if !(-half_range..half_range).contains(&field) {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: format!("AArch64 branch displacement must fit a {bits}-bit signed field"),
                        line: fixup.line,
                    }));
                }
                let mask = (1u32 << bits) - 1;
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                let shift = if bits == 19 { 5 } else { 0 };
                word |= ((field as u32) & mask) << shift;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
            ArmSlot::Lo16 | ArmSlot::Hi16 => {
                if target > u32::MAX as u64 {
                    return Err(UaError::Codegen(CodegenError::ImmediateOutOfRange {
                        value: target as i64,
                        detail: "AArch64 absolute address exceeds 32 bits".to_string(),
                        line: fixup.line,
                    }));
                }
                let half = match slot {
                    ArmSlot::Lo16 => (target & 0xFFFF) as u32,
                    ArmSlot::Hi16 => ((target >> 16) & 0xFFFF) as u32,
                    ArmSlot::Branch { .. } => unreachable!(),
                };
                let mut word = u32::from_le_bytes(
                    code.as_slice()[fixup.site_offset as usize..fixup.site_offset as usize + 4]
                        .try_into()
                        .expect("fixup site is 4 bytes"),
                );
                word |= half << 5;
                code.patch(fixup.site_offset as usize, &word.to_le_bytes());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_with_symbol(name: &str, addr: u64) -> Layout {
        let mut symbols = SymbolTable::new();
        symbols.define(name, addr).unwrap();
        Layout {
            code_size: 0,
            symbols,
            variables: VariableTable::new(),
            buffers: BufferTable::new(),
            strings: StringTable::new(),
            word_size: 8,
        }
    }

    #[test]
    fn branch_19_bit_field_shifts_into_bit_5() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 19 } },
        });
        let layout = layout_with_symbol("target", 16);
        patch(&mut code, &fixups, &layout).unwrap();
        let word = u32::from_le_bytes(code.as_slice().try_into().unwrap());
        assert_eq!((word >> 5) & 0x7FFFF, 4); // 16 bytes / 4 = field value 4
    }

    #[test]
    fn rejects_misaligned_branch_target() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 26 } },
        });
        let layout = layout_with_symbol("target", 2);
        assert!(matches!(
            patch(&mut code, &fixups, &layout),
            Err(UaError::Codegen(CodegenError::BranchOutOfRange { .. }))
        ));
    }

    #[test]
    fn rejects_branch_displacement_exceeding_field_width() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::ArmRel { slot: ArmSlot::Branch { bits: 19 } },
        });
        // 19-bit field covers +-2^18 words == +-1048576 bytes.
        let layout = layout_with_symbol("target", 1_048_580);
        assert!(matches!(
            patch(&mut code, &fixups, &layout),
            Err(UaError::Codegen(CodegenError::BranchOutOfRange { .. }))
        ));
    }

    #[test]
    fn lo16_hi16_insert_the_right_16_bit_window() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 8]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::ArmRel { slot: ArmSlot::Lo16 },
        });
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 4,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::ArmRel { slot: ArmSlot::Hi16 },
        });
        let layout = layout_with_symbol("target", 0xABCD_1234);
        patch(&mut code, &fixups, &layout).unwrap();
        let lo = u32::from_le_bytes(code.as_slice()[0..4].try_into().unwrap());
        let hi = u32::from_le_bytes(code.as_slice()[4..8].try_into().unwrap());
        assert_eq!((lo >> 5) & 0xFFFF, 0x1234);
        assert_eq!((hi >> 5) & 0xFFFF, 0xABCD);
    }
}
