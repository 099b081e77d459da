//! The RV64I+M emitter (spec.md §4.4). UA registers R0..R7 map onto
//! `a0..a7` (`x10..x17`), RISC-V's own argument-register window — the
//! same registers a real syscall ABI would use for its arguments, which
//! is why `INT`'s register-materialized interrupt number lives outside
//! this window rather than aliasing it.

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

pub(crate) const SCRATCH1: u8 = 31; // x31 / t6
pub(crate) const SCRATCH2: u8 = 30; // x30 / t5
pub(crate) const FLAGS: u8 = 29; // x29 / t4 — holds the result of the last CMP

pub struct RiscvEmitter;

impl Default for RiscvEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl RiscvEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for RiscvEmitter {
    fn arch(&self) -> Arch {
        Arch::Riscv
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
