//! The AArch64 emitter (spec.md §4.4): real A64 instruction encodings,
//! built the same bit-composition way as the ARMv7-A emitter. UA
//! registers R0..R7 map onto `x0..x7`. `x16`/`x17` (`IP0`/`IP1`, AArch64's
//! own intra-procedure-call scratch register pair) serve the same role
//! `r12`/`r11` play for ARMv7-A.

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

pub(crate) const SCRATCH1: u8 = 16; // x16 / IP0
pub(crate) const SCRATCH2: u8 = 17; // x17 / IP1

pub struct Arm64Emitter;

impl Default for Arm64Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arm64Emitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for Arm64Emitter {
    fn arch(&self) -> Arch {
        Arch::Arm64
    }

    fn register_window(&self) -> RangeInclusive<u8> {
        0..=7
    }

    fn assemble(&self, ir: &[Instruction]) -> Result<AssembledImage, UaError> {
        let layout = pass1(ir, 8, predict::predict_size)?;
        let (mut code, fixups) = emit::emit(ir, &layout, &self.register_window())?;
        fixup::patch(&mut code, &fixups, &layout)?;
        code.extend(&layout.data_section());
        Ok(AssembledImage {
            code,
            entry_hint: 0,
        })
    }
}
