//! Pass 3: resolve every fixup recorded in pass 2 against the completed
//! symbol table and patch the placeholder bytes (spec.md §4.4).

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

        match fixup.kind {
            FixupKind::Mcs51Rel { long: true } => {
                if target > 0xFFFF {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: target as i64,
                        detail: "8051 absolute address exceeds 16 bits".to_string(),
                        line: fixup.line,
                    }));
                }
                code.patch(fixup.site_offset as usize, &(target as u16).to_be_bytes());
            }
            FixupKind::Mcs51Rel { long: false } => {
                let origin = fixup.instr_addr as i64 + 2;
                let disp = target as i64 - origin;
                if !(-128..=127).contains(&disp) {
                    return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                        displacement: disp,
                        detail: "8051 short relative branch must fit a signed byte".to_string(),
                        line: fixup.line,
                    }));
                }
                code.patch(fixup.site_offset as usize, &[(disp as i8) as u8]);
            }
            other => unreachable!("mcs51 only ever records Mcs51Rel fixups, got {other:?}"),
        }
    }
    Ok(())
}
