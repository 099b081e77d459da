//! The IA-32 (32-bit x86) emitter. No REX prefixes exist in protected
//! mode, so UA registers R0..R6 map directly onto eax,ecx,edx,ebx,esp,
//! ebp,esi; edi is reserved as the internal scratch register a handful of
//! multi-instruction sequences need (spec.md §4.4), the same role r15
//! plays for the 64-bit emitter. Memory operands use flat 32-bit absolute
//! addressing rather than RIP-relative, since IA-32 has no instruction
//! pointer register to address relative to.

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

pub(crate) const SCRATCH: u8 = 7; // edi; one past the UA-visible window.

pub struct X86_32Emitter;

impl Default for X86_32Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl X86_32Emitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for X86_32Emitter {
    fn arch(&self) -> Arch {
        Arch::X86_32
    }

    fn register_window(&self) -> RangeInclusive<u8> {
        0..=6
    }

    fn assemble(&self, ir: &[Instruction]) -> Result<AssembledImage, UaError> {
        let layout = pass1(ir, 4, predict::predict_size)?;
        let (mut code, fixups) = emit::emit(ir, &layout, &self.register_window())?;
        fixup::patch(&mut code, &fixups, &layout)?;
        code.extend(&layout.data_section());
        Ok(AssembledImage {
            code,
            entry_hint: 0,
        })
    }
}
