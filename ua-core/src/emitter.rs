//! The `Emitter` trait every per-architecture backend implements (spec.md
//! §4.4): a self-contained two-pass (address assignment, then emission +
//! fixup patching) assembler over the shared IR.

use std::ops::RangeInclusive;

use crate::codebuf::CodeBuffer;
use crate::diag::{CodegenError, UaError};
use crate::ir::{Arch, Instruction};

/// Output of a full assemble: the finished code buffer plus the register
/// window actually enforced, kept around for diagnostics/tests.
pub struct AssembledImage {
    pub code: CodeBuffer,
    pub entry_hint: u64,
}

/// Implemented once per target architecture. `ua-targets` provides the six
/// concrete emitters; `ua-cli` and `ua-conformance` only ever see this
/// trait, never the per-architecture internals.
pub trait Emitter {
    fn arch(&self) -> Arch;

    /// The inclusive register index range this instance accepts. Default
    /// is the target's full window; `ua_targets::x86::x86_64_phase5()`
    /// constructs an instance with a narrower one (spec.md §4.4, Open
    /// Question on register windows, resolved in the expanded design).
    fn register_window(&self) -> RangeInclusive<u8>;

    /// Run the full three-pass pipeline (predict-size, emit + record
    /// fixups, patch fixups) and append variable/buffer/string data
    /// sections, per the contract in spec.md §4.4.
    fn assemble(&self, ir: &[Instruction]) -> Result<AssembledImage, UaError>;
}

pub(crate) fn check_register_window(
    reg: u8,
    window: &RangeInclusive<u8>,
    line: u32,
) -> Result<(), UaError> {
    if window.contains(&reg) {
        Ok(())
    } else {
        Err(UaError::Codegen(CodegenError::RegisterOutOfWindow {
            reg,
            window: format!("R{}..=R{}", window.start(), window.end()),
            line,
        }))
    }
}
