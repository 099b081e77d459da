//! `ua-targets`: the six per-architecture code emitters (spec.md §4.4),
//! built on the shared pass-1 traversal in [`common`]. Each submodule is
//! self-contained: `mod.rs` wires up the [`ua_core::emitter::Emitter`]
//! impl, `predict.rs` sizes instructions, `emit.rs` encodes them, and
//! `fixup.rs` patches the displacements/addresses recorded along the way.

pub mod arm;
pub mod arm64;
pub mod common;
pub mod mcs51;
pub mod riscv;
pub mod x86;
pub mod x86_32;

pub use arm::ArmEmitter;
pub use arm64::Arm64Emitter;
pub use mcs51::Mcs51Emitter;
pub use riscv::RiscvEmitter;
pub use x86::X86Emitter;
pub use x86_32::X86_32Emitter;
