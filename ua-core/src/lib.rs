//! `ua-core`: the hardware-neutral assembly pipeline — preprocessor,
//! parser, IR, opcode-compliance gate, shared side tables, code buffer,
//! the `Emitter` trait, and the JIT runner. Per-architecture emitters live
//! in the sibling `ua-targets` crate; the CLI front-end lives in `ua-cli`.

pub mod codebuf;
pub mod compliance;
pub mod diag;
pub mod emitter;
pub mod ir;
pub mod jit;
pub mod parse;
pub mod preprocess;
pub mod shapes;
pub mod tables;

/// Common imports for downstream crates, mirroring the teacher's own
/// `prelude` module.
pub mod prelude {
    pub use crate::codebuf::CodeBuffer;
    pub use crate::diag::{Category, CodegenError, Diagnostic, Location, UaError};
    pub use crate::emitter::{AssembledImage, Emitter};
    pub use crate::ir::{
        Arch, BoundedString, CallArg, Instruction, Operand, OperandType, Opcode, SourcePos, Sys,
    };
    pub use crate::tables::{
        ArmSlot, Buffer, BufferTable, Fixup, FixupKind, FixupTable, RiscvSlot, StringTable, SymbolTable,
        Variable, VariableTable,
    };
}
