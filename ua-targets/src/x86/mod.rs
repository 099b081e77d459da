//! The x86-64 emitter. Registers R0..R7 map directly onto the ModRM/SIB
//! register encoding for rax,rcx,rdx,rbx,rsp,rbp,rsi,rdi (spec.md §8,
//! Scenario A); R8..R15 (reached only via the REX.B extension bit) never
//! appear in the UA register window and are reserved for the scratch
//! sequences `DIV`/oversized immediates need.

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

/// Physical scratch register (r15) used by multi-instruction sequences.
/// Encoded with REX.B since it is outside the 3-bit ModRM field a plain
/// REX.W prefix reaches.
pub(crate) const SCRATCH: u8 = 7; // rm field value; REX.B supplies the 8th bit.

pub(crate) const REX_W: u8 = 0x48;
pub(crate) const REX_WB: u8 = 0x49;

pub struct X86Emitter {
    window: RangeInclusive<u8>,
}

impl Default for X86Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl X86Emitter {
    pub fn new() -> Self {
        Self { window: 0..=7 }
    }

    /// The original x86-64 Phase-5 emitter's narrower register window
    /// (spec.md §9, Open Question i).
    pub fn x86_64_phase5() -> Self {
        Self { window: 0..=3 }
    }
}

impl Emitter for X86Emitter {
    fn arch(&self) -> Arch {
        Arch::X86
    }

    fn register_window(&self) -> RangeInclusive<u8> {
        self.window.clone()
    }

    fn assemble(&self, ir: &[Instruction]) -> Result<AssembledImage, UaError> {
        let layout = pass1(ir, 8, predict::predict_size)?;
        let (mut code, fixups) = emit::emit(ir, &layout, &self.window)?;
        fixup::patch(&mut code, &fixups, &layout)?;
        code.extend(&layout.data_section());
        Ok(AssembledImage {
            code,
            entry_hint: 0,
        })
    }
}
