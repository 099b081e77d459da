//! The architecture-neutral instruction sequence produced by the parser.
//!
//! Mirrors the teacher's `cpu::state` snapshot types in spirit: plain data,
//! no behavior. Everything downstream (compliance gate, per-architecture
//! emitters) consumes this shape without knowing how it was parsed.

use std::fmt;

/// Maximum length of a label, variable, or buffer identifier, NUL-terminated
/// within this capacity (spec.md §3).
pub const MAX_IDENT_LEN: usize = 63;

/// Maximum length of a string literal payload (excluding the NUL terminator).
pub const MAX_STRING_LEN: usize = 255;

/// Maximum number of parameters a function definition may declare.
pub const MAX_PARAMS: usize = 8;

/// Maximum number of operands an opcode instance may carry.
pub const MAX_OPERANDS: usize = 3;

/// A bounded identifier: owned, capacity-checked at construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundedString(String);

impl BoundedString {
    pub fn new(s: impl Into<String>, cap: usize) -> Result<Self, IrError> {
        let s = s.into();
        if s.len() > cap {
            return Err(IrError::IdentTooLong {
                name: s,
                max: cap,
            });
        }
        Ok(Self(s))
    }

    pub fn ident(s: impl Into<String>) -> Result<Self, IrError> {
        Self::new(s, MAX_IDENT_LEN)
    }

    pub fn string_lit(s: impl Into<String>) -> Result<Self, IrError> {
        Self::new(s, MAX_STRING_LEN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("identifier `{name}` exceeds the maximum length of {max}")]
    IdentTooLong { name: String, max: usize },
}

/// Source position attached to every opcode instance, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
}

/// A tagged operand value (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Register index 0..15.
    Register(u8),
    /// Signed 64-bit immediate.
    Immediate(i64),
    /// Reference to a label, variable, or buffer name.
    LabelRef(BoundedString),
    /// A string literal (only valid as the operand of `LDS`).
    StringLit(BoundedString),
}

impl Operand {
    pub fn type_of(&self) -> OperandType {
        match self {
            Operand::Register(_) => OperandType::Register,
            Operand::Immediate(_) => OperandType::Immediate,
            Operand::LabelRef(_) => OperandType::LabelRef,
            Operand::StringLit(_) => OperandType::StringLit,
        }
    }
}

/// The declared operand-type set an opcode's grammar entry may require.
/// `RegisterOrImmediate` matches either at parse time; `StringLit` is only
/// ever produced for `LDS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandType {
    Register,
    Immediate,
    LabelRef,
    StringLit,
    RegisterOrImmediate,
}

impl OperandType {
    pub fn accepts(self, actual: OperandType) -> bool {
        match self {
            OperandType::RegisterOrImmediate => {
                matches!(actual, OperandType::Register | OperandType::Immediate)
            }
            other => other == actual,
        }
    }
}

/// A textual call argument captured verbatim for `CALL name(args...)`
/// syntax (spec.md §3, §4.2).
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    Register(u8),
    Immediate(i64),
    Ident(BoundedString),
}

/// The closed opcode enumeration (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Data
    Mov,
    Ldi,
    Load,
    Store,
    Loadb,
    Storeb,
    Lds,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    // Bitwise
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    // Control
    Cmp,
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jg,
    Call,
    Ret,
    // Stack
    Push,
    Pop,
    // System
    Int,
    Sys,
    Hlt,
    Nop,
    // Variables
    Var,
    Set,
    Get,
    Buffer,
    // Architecture-specific
    Cpuid,
    Rdtsc,
    Bswap,
    Pusha,
    Popa,
    Djnz,
    Cjne,
    Setb,
    Clr,
    Reti,
    Wfi,
    Dmb,
    Ebreak,
    Fence,
    // Directive
    Org,
}

impl Opcode {
    /// Case-insensitive mnemonic lookup (spec.md §6: "case-insensitive
    /// mnemonics").
    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match s.to_ascii_uppercase().as_str() {
            "MOV" => Mov,
            "LDI" => Ldi,
            "LOAD" => Load,
            "STORE" => Store,
            "LOADB" => Loadb,
            "STOREB" => Storeb,
            "LDS" => Lds,
            "ADD" => Add,
            "SUB" => Sub,
            "MUL" => Mul,
            "DIV" => Div,
            "INC" => Inc,
            "DEC" => Dec,
            "AND" => And,
            "OR" => Or,
            "XOR" => Xor,
            "NOT" => Not,
            "SHL" => Shl,
            "SHR" => Shr,
            "CMP" => Cmp,
            "JMP" => Jmp,
            "JZ" => Jz,
            "JNZ" => Jnz,
            "JL" => Jl,
            "JG" => Jg,
            "CALL" => Call,
            "RET" => Ret,
            "PUSH" => Push,
            "POP" => Pop,
            "INT" => Int,
            "SYS" => Sys,
            "HLT" => Hlt,
            "NOP" => Nop,
            "VAR" => Var,
            "SET" => Set,
            "GET" => Get,
            "BUFFER" => Buffer,
            "CPUID" => Cpuid,
            "RDTSC" => Rdtsc,
            "BSWAP" => Bswap,
            "PUSHA" => Pusha,
            "POPA" => Popa,
            "DJNZ" => Djnz,
            "CJNE" => Cjne,
            "SETB" => Setb,
            "CLR" => Clr,
            "RETI" => Reti,
            "WFI" => Wfi,
            "DMB" => Dmb,
            "EBREAK" => Ebreak,
            "FENCE" => Fence,
            "ORG" => Org,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Mov => "MOV",
            Ldi => "LDI",
            Load => "LOAD",
            Store => "STORE",
            Loadb => "LOADB",
            Storeb => "STOREB",
            Lds => "LDS",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Inc => "INC",
            Dec => "DEC",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Not => "NOT",
            Shl => "SHL",
            Shr => "SHR",
            Cmp => "CMP",
            Jmp => "JMP",
            Jz => "JZ",
            Jnz => "JNZ",
            Jl => "JL",
            Jg => "JG",
            Call => "CALL",
            Ret => "RET",
            Push => "PUSH",
            Pop => "POP",
            Int => "INT",
            Sys => "SYS",
            Hlt => "HLT",
            Nop => "NOP",
            Var => "VAR",
            Set => "SET",
            Get => "GET",
            Buffer => "BUFFER",
            Cpuid => "CPUID",
            Rdtsc => "RDTSC",
            Bswap => "BSWAP",
            Pusha => "PUSHA",
            Popa => "POPA",
            Djnz => "DJNZ",
            Cjne => "CJNE",
            Setb => "SETB",
            Clr => "CLR",
            Reti => "RETI",
            Wfi => "WFI",
            Dmb => "DMB",
            Ebreak => "EBREAK",
            Fence => "FENCE",
            Org => "ORG",
        }
    }

    /// All opcodes, for table-completeness checks (spec.md §8, property 8).
    pub fn all() -> &'static [Opcode] {
        use Opcode::*;
        &[
            Mov, Ldi, Load, Store, Loadb, Storeb, Lds, Add, Sub, Mul, Div, Inc, Dec, And, Or, Xor,
            Not, Shl, Shr, Cmp, Jmp, Jz, Jnz, Jl, Jg, Call, Ret, Push, Pop, Int, Sys, Hlt, Nop,
            Var, Set, Get, Buffer, Cpuid, Rdtsc, Bswap, Pusha, Popa, Djnz, Cjne, Setb, Clr, Reti,
            Wfi, Dmb, Ebreak, Fence, Org,
        ]
    }

    /// Whether this opcode is a conditional or unconditional branch whose
    /// single label operand is PC-relative (used by emitters to decide
    /// whether to record a fixup).
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Jl | Opcode::Jg | Opcode::Call
        )
    }
}

/// One element of the IR: either a label/function definition, or an opcode
/// instance (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    LabelDef {
        name: BoundedString,
        /// `Some(params)` when this is a function definition
        /// (`name(p1, p2, ...):`); `None` for a plain label.
        params: Option<Vec<BoundedString>>,
        pos: SourcePos,
    },
    Op {
        opcode: Opcode,
        operands: Vec<Operand>,
        pos: SourcePos,
        /// Captured textual argument list for `CALL`'s function-call syntax.
        call_args: Option<Vec<CallArg>>,
    },
}

impl Instruction {
    pub fn pos(&self) -> SourcePos {
        match self {
            Instruction::LabelDef { pos, .. } => *pos,
            Instruction::Op { pos, .. } => *pos,
        }
    }
}

/// Target CPU architecture (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    Mcs51,
    X86,
    X86_32,
    Arm,
    Arm64,
    Riscv,
}

impl Arch {
    pub fn from_flag(s: &str) -> Option<Arch> {
        Some(match s {
            "mcs51" => Arch::Mcs51,
            "x86" => Arch::X86,
            "x86_32" | "ia32" => Arch::X86_32,
            "arm" => Arch::Arm,
            "arm64" | "aarch64" => Arch::Arm64,
            "riscv" | "rv64" => Arch::Riscv,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::Mcs51 => "mcs51",
            Arch::X86 => "x86",
            Arch::X86_32 => "x86_32",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Riscv => "riscv",
        }
    }

    /// Natural word size in bytes, used to lay out the variable table
    /// (spec.md §3).
    pub fn word_size(self) -> usize {
        match self {
            Arch::Mcs51 => 1,
            Arch::X86_32 | Arch::Arm => 4,
            Arch::X86 | Arch::Arm64 | Arch::Riscv => 8,
        }
    }
}

/// Target OS context (spec.md §6). Absence means `Baremetal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sys {
    Baremetal,
    Win32,
    Linux,
    Macos,
}

impl Sys {
    pub fn from_flag(s: &str) -> Option<Sys> {
        Some(match s {
            "baremetal" => Sys::Baremetal,
            "win32" => Sys::Win32,
            "linux" => Sys::Linux,
            "macos" | "darwin" => Sys::Macos,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Sys::Baremetal => "baremetal",
            Sys::Win32 => "win32",
            Sys::Linux => "linux",
            Sys::Macos => "macos",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_roundtrip_is_case_insensitive() {
        for &op in Opcode::all() {
            let m = op.mnemonic();
            assert_eq!(Opcode::from_mnemonic(&m.to_ascii_lowercase()), Some(op));
            assert_eq!(Opcode::from_mnemonic(m), Some(op));
        }
    }

    #[test]
    fn operand_type_register_or_immediate_accepts_both() {
        assert!(OperandType::RegisterOrImmediate.accepts(OperandType::Register));
        assert!(OperandType::RegisterOrImmediate.accepts(OperandType::Immediate));
        assert!(!OperandType::RegisterOrImmediate.accepts(OperandType::LabelRef));
    }

    #[test]
    fn bounded_string_rejects_overlong_identifiers() {
        let long = "x".repeat(MAX_IDENT_LEN + 1);
        assert!(BoundedString::ident(long).is_err());
    }

    #[test]
    fn arch_from_flag_handles_aliases() {
        assert_eq!(Arch::from_flag("ia32"), Some(Arch::X86_32));
        assert_eq!(Arch::from_flag("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::from_flag("rv64"), Some(Arch::Riscv));
        assert_eq!(Sys::from_flag("darwin"), Some(Sys::Macos));
    }
}
