//! Pass 3 fixup patching for IA-32 (spec.md §4.4). `Jmp`/`Call`/`Jcc`
//! record `instr_addr` as the end of the 32-bit relative displacement
//! field, same as the 64-bit emitter. `Load`/`Store`/`Loadb`/`Storeb`/
//! `Get`/`Set` address memory as a flat absolute disp32 rather than
//! RIP-relative, so those fixups are recorded with `instr_addr: 0` —
//! `target - 0` is just the absolute address.

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
            unreachable!("x86_32 only ever records X86Rel fixups, got {:?}", fixup.kind);
        };
        debug_assert_eq!(width, 4, "every x86_32 fixup site this emitter records is 32-bit");

        let disp = target as i64 - fixup.instr_addr as i64;
        if !(i32::MIN as i64..=i32::MAX as i64).contains(&disp) {
            return Err(UaError::Codegen(CodegenError::BranchOutOfRange {
                displacement: disp,
                detail: "IA-32 rel32/abs32 field must fit a signed 32-bit value".to_string(),
                line: fixup.line,
            }));
        }
        code.patch(fixup.site_offset as usize, &(disp as i32).to_le_bytes());
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
            word_size: 4,
        }
    }

    #[test]
    fn patches_in_range_displacement() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 4,
            line: 1,
            kind: FixupKind::X86Rel { width: 4 },
        });
        let layout = layout_with_symbol("target", 104);
        patch(&mut code, &fixups, &layout).unwrap();
        assert_eq!(code.as_slice(), &100i32.to_le_bytes());
    }

    #[test]
    fn rejects_displacement_exceeding_i32() {
        let mut code = CodeBuffer::new();
        code.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "target".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 1,
            kind: FixupKind::X86Rel { width: 4 },
        });
        let layout = layout_with_symbol("target", i32::MAX as u64 + 100);
        assert!(matches!(
            patch(&mut code, &fixups, &layout),
            Err(UaError::Codegen(CodegenError::BranchOutOfRange { .. }))
        ));
    }

    #[test]
    fn undefined_label_is_reported() {
        let code_buf = &mut CodeBuffer::new();
        code_buf.extend(&[0u8; 4]);
        let mut fixups = FixupTable::new();
        fixups.push(Fixup {
            label: "missing".to_string(),
            site_offset: 0,
            instr_addr: 0,
            line: 7,
            kind: FixupKind::X86Rel { width: 4 },
        });
        let layout = layout_with_symbol("other", 0);
        assert!(matches!(
            patch(code_buf, &fixups, &layout),
            Err(UaError::Codegen(CodegenError::UndefinedLabel { .. }))
        ));
    }
}
