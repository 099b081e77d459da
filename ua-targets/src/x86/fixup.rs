//! Pass 3 fixup patching for x86-64 (spec.md §4.4): `target - instr_addr`,
//! where `instr_addr` was recorded at emission time as the address the
//! processor's instruction pointer holds once the full instruction
//! (including any trailing immediate past the displacement) has been
//! fetched — "the displacement is relative to the end of the instruction".

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

        let FixupKind::X86Rel { width } = fixup.kind else {
            unreachable!("x86 only ever records X86Rel fixups, got {:?}", fixup.kind);
        };
        debug_assert_eq!(width, 4, "every x86 fixup site this emitter records is 32-bit");

        let disp = target as i64 - fixup.instr_addr as i64;
        if !(i32::MIN as i64..=i32::MAX as i64).contains(&disp) {
            return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                displacement: disp,
                detail: "x86-64 rel32 displacement must fit a signed 32-bit value".to_string(),
                line: fixup.line,
            }));
        }
        code.patch(fixup.site_offset as usize, &(disp as i32).to_le_bytes());
    }
    Ok(())
}
