//! The 8051/MCS-51 emitter: 8-bit registers, byte-addressed data, absolute
//! long jumps/calls, short relative conditional branches (spec.md §4.4).

pub mod emit;
pub mod fixup;
pub mod predict;

use std::ops::RangeInclusive;

use ua_core::prelude::*;

use crate::common::pass1;

// Opcode bytes. This is an invented encoding for the hardware-neutral
// dialect's 8051 lowering, not the real 8051 opcode map; register indices
// 0..7 are baked into the low bits where the real ISA does the same
// (`INC Rn`, `MOV Rn,#data`, direct-addressed loads/stores).
pub(crate) const OP_NOP: u8 = 0x00;
pub(crate) const OP_LJMP: u8 = 0x02;
pub(crate) const OP_LCALL: u8 = 0x12;
pub(crate) const OP_RET: u8 = 0x22;
pub(crate) const OP_RETI: u8 = 0x32;
pub(crate) const OP_JC: u8 = 0x40;
pub(crate) const OP_JNC: u8 = 0x50;
pub(crate) const OP_JZ: u8 = 0x60;
pub(crate) const OP_JNZ: u8 = 0x70;
pub(crate) const OP_SJMP: u8 = 0x80;
pub(crate) const OP_INT: u8 = 0xA5;
pub(crate) const OP_SYS: u8 = 0xA6;
pub(crate) const OP_SET_IMM: u8 = 0xA8;
pub(crate) const OP_MOV_REG: u8 = 0xC8;
pub(crate) const OP_PUSH: u8 = 0xC0;
pub(crate) const OP_POP: u8 = 0xD0;
pub(crate) const OP_CLR: u8 = 0xC2;
pub(crate) const OP_SETB: u8 = 0xD2;
pub(crate) const OP_NOT: u8 = 0xE4;
pub(crate) const OP_ADD_REG: u8 = 0x28;
pub(crate) const OP_ADD_IMM: u8 = 0x29;
pub(crate) const OP_SUB_REG: u8 = 0x98;
pub(crate) const OP_SUB_IMM: u8 = 0x99;
pub(crate) const OP_AND_REG: u8 = 0x58;
pub(crate) const OP_AND_IMM: u8 = 0x59;
pub(crate) const OP_OR_REG: u8 = 0x48;
pub(crate) const OP_OR_IMM: u8 = 0x49;
pub(crate) const OP_XOR_REG: u8 = 0x68;
pub(crate) const OP_XOR_IMM: u8 = 0x69;
pub(crate) const OP_SHL_REG: u8 = 0x88;
pub(crate) const OP_SHL_IMM: u8 = 0x89;
pub(crate) const OP_SHR_REG: u8 = 0x8C;
pub(crate) const OP_SHR_IMM: u8 = 0x8D;

pub(crate) const BASE_INC: u8 = 0x08;
pub(crate) const BASE_DEC: u8 = 0x18;
pub(crate) const BASE_MOV_IMM: u8 = 0x78;
pub(crate) const BASE_LOAD: u8 = 0x90;
pub(crate) const BASE_STORE: u8 = 0xA0;
pub(crate) const BASE_LOADB: u8 = 0xB0;
pub(crate) const BASE_CJNE_IMM: u8 = 0xB8;
pub(crate) const BASE_DJNZ: u8 = 0xD8;
pub(crate) const BASE_CJNE_REG: u8 = 0xE8;
pub(crate) const BASE_LDS: u8 = 0xF8;
pub(crate) const BASE_STOREB: u8 = 0xF0;

pub struct Mcs51Emitter;

impl Default for Mcs51Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Mcs51Emitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for Mcs51Emitter {
    fn arch(&self) -> Arch {
        Arch::Mcs51
    }

    fn register_window(&self) -> RangeInclusive<u8> {
        0..=7
    }

    fn assemble(&self, ir: &[Instruction]) -> Result<AssembledImage, UaError> {
        let layout = pass1(ir, 1, predict::predict_size)?;
        let (mut code, fixups) = emit::emit(ir, &layout, &self.register_window())?;
        fixup::patch(&mut code, &fixups, &layout)?;
        code.extend(&layout.data_section());
        Ok(AssembledImage {
            code,
            entry_hint: 0,
        })
    }
}
