//! The ARMv7-A emitter (spec.md §4.4): real A32 data-processing, branch,
//! and load/store encodings, unconditionally executed (`cond` field always
//! `AL`/`0xE`) since this dialect has no conditional-execution opcodes of
//! its own — only `JZ`/`JNZ`/`JL`/`JG`, which lower to an unconditional
//! `CMP` followed by a conditionally-executed `B.cond`.
//!
//! UA registers R0..R7 map directly onto `r0..r7`. Two registers outside
//! that window serve as scratch: `r12` (`IP`, ARM's intra-procedure-call
//! scratch register) for single-register sequences, and `r11` (`FP`) as a
//! second scratch for the rare two-value sequences (`SET name, imm`
//! materializes both the variable's address and the immediate before the
//! store).

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

pub(crate) const SCRATCH1: u8 = 12; // r12 / IP
pub(crate) const SCRATCH2: u8 = 11; // r11 / FP

pub struct ArmEmitter;

impl Default for ArmEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for ArmEmitter {
    fn arch(&self) -> Arch {
        Arch::Arm
    }

    fn register_window(&self) -> RangeInclusive<u8> {
        0..=7
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
