//! Per-emitter side tables built during pass 1 and consumed during passes
//! 2/3 (spec.md §3): symbol table, fixup records, variable/buffer/string
//! tables. These are owned by a single assembler invocation and discarded
//! once the code buffer is produced.

use std::collections::HashMap;

use itertools::Itertools;

use crate::ir::BoundedString;

/// Label name -> byte offset from the start of the code image. Variables
/// and buffers are added here too once their data-section address is
/// known (spec.md §3: "address equal to `code_size + offset_in_data`").
#[derive(Debug, Default)]
pub struct SymbolTable {
    offsets: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Err` on redefinition; the caller turns this into
    /// `CodegenError::DuplicateLabel`.
    pub fn define(&mut self, name: &str, offset: u64) -> Result<(), ()> {
        if self.offsets.contains_key(name) {
            return Err(());
        }
        self.offsets.insert(name.to_string(), offset);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.offsets.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }
}

/// Discriminates how a fixup's displacement must be computed and encoded,
/// since each ISA derives it from a different origin and width (spec.md
/// §3's "discriminator fields").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixupKind {
    /// x86/x86-64: `target - (offset_of_displacement + width)`, signed
    /// little-endian, `width` bytes (4 normally, 1 for short `JZ`/`JNZ`
    /// forms where the emitter chooses the short encoding).
    X86Rel { width: u8 },
    /// ARM/AArch64: `(target - (instruction_addr + 8)) >> 2` (ARM) or
    /// `(target - instruction_addr) >> 2` (AArch64), encoded in the low
    /// bits of the instruction word. `slot` distinguishes a branch
    /// displacement fixup from the two halves of a `MOVW+MOVT`/`MOVZ+MOVK`
    /// absolute-address load, which each patch a different 16-bit window
    /// of the same target value into a separate instruction.
    ArmRel { slot: ArmSlot },
    /// RISC-V: `slot` distinguishes a PC-relative branch/jump
    /// displacement (`target - instruction_addr`, B-type or J-type) from
    /// the two halves of a `LUI+ADDI` absolute-address load, which patch
    /// in the target's value directly rather than a displacement from it.
    RiscvRel { slot: RiscvSlot },
    /// 8051: either an 8-bit signed relative (`SJMP`-style) or a 16-bit
    /// absolute long jump, chosen by range at emission time.
    Mcs51Rel { long: bool },
}

/// Which piece of a RISC-V instruction sequence a `RiscvRel` fixup
/// patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiscvSlot {
    /// A PC-relative branch/jump displacement: B-type (`±4KiB`, 13-bit
    /// signed, conditional `Jz`/`Jnz`/`Jl`/`Jg`) when `jtype` is `false`,
    /// J-type (`±1MiB`, 21-bit signed, `Jmp`/`Call`) when `true`.
    Branch { jtype: bool },
    /// `LUI`'s `imm20`: the upper 20 bits of the absolute target address,
    /// rounded to compensate for the following `ADDI`'s sign extension.
    Hi20,
    /// The paired `ADDI`'s `imm12`: the low, sign-extended 12 bits of the
    /// absolute target address.
    Lo12,
}

/// Which 16-bit window of a target address an ARM/AArch64 fixup patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmSlot {
    /// A word-aligned branch displacement of the given immediate-field
    /// width: 24 bits for ARM's `B`/`BL`/`B.cond` (they share one format),
    /// 26 bits for AArch64's `B`/`BL`, 19 bits for AArch64's `B.cond`.
    Branch { bits: u8 },
    /// Bits `[15:0]` of an absolute address, into a `MOVW`/`MOVZ` imm16.
    Lo16,
    /// Bits `[31:16]` of an absolute address, into a `MOVT`/`MOVK` imm16.
    Hi16,
}

/// A site in the code buffer whose bytes depend on a not-yet-resolved
/// symbol (spec.md §3).
#[derive(Clone, Debug)]
pub struct Fixup {
    pub label: String,
    /// Byte offset in the code buffer where the placeholder lives.
    pub site_offset: u64,
    /// Byte address of the instruction containing the site.
    pub instr_addr: u64,
    pub line: u32,
    pub kind: FixupKind,
}

#[derive(Debug, Default)]
pub struct FixupTable {
    entries: Vec<Fixup>,
}

impl FixupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fixup: Fixup) {
        self.entries.push(fixup);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixup> {
        self.entries.iter()
    }
}

/// A named word-sized cell with optional initial value (spec.md §3).
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: BoundedString,
    pub init: i64,
}

#[derive(Debug, Default)]
pub struct VariableTable {
    entries: Vec<Variable>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: BoundedString, init: i64) -> Result<usize, ()> {
        if self.entries.iter().any(|v| v.name == name) {
            return Err(());
        }
        let index = self.entries.len();
        self.entries.push(Variable { name, init });
        Ok(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|v| v.name.as_str() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }

    /// Total byte size of the section, given the target's word size.
    pub fn total_bytes(&self, word_size: usize) -> u64 {
        (self.entries.len() * word_size) as u64
    }
}

/// A named zero-filled region of declared byte length (spec.md §3).
#[derive(Clone, Debug)]
pub struct Buffer {
    pub name: BoundedString,
    pub len: u64,
}

#[derive(Debug, Default)]
pub struct BufferTable {
    entries: Vec<Buffer>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: BoundedString, len: u64) -> Result<usize, ()> {
        if self.entries.iter().any(|b| b.name == name) {
            return Err(());
        }
        let index = self.entries.len();
        self.entries.push(Buffer { name, len });
        Ok(index)
    }

    pub fn offset_of(&self, name: &str) -> Option<u64> {
        let mut acc = 0u64;
        for b in &self.entries {
            if b.name.as_str() == name {
                return Some(acc);
            }
            acc += b.len;
        }
        None
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|b| b.len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.entries.iter()
    }
}

/// Ordered, deduplicated list of NUL-terminated string literals collected
/// from `LDS` operands (spec.md §3: "duplicates are coalesced").
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `s` if not already present; return its stable index either
    /// way, coalescing duplicates via a lookup map (the `itertools`-style
    /// dedup this table performs incrementally rather than as a bulk pass).
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    pub fn offset_of(&self, index: usize) -> u64 {
        self.entries[..index].iter().map(|s| s.len() as u64 + 1).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|s| s.len() as u64 + 1).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Distinct strings in first-seen order, for diagnostics/dumping.
    pub fn unique_sorted(&self) -> Vec<&str> {
        self.entries.iter().map(String::as_str).unique().sorted().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_rejects_redefinition() {
        let mut t = SymbolTable::new();
        assert!(t.define("start", 0).is_ok());
        assert!(t.define("start", 4).is_err());
        assert_eq!(t.resolve("start"), Some(0));
    }

    #[test]
    fn variable_table_assigns_stable_indices() {
        let mut t = VariableTable::new();
        t.declare(BoundedString::ident("a").unwrap(), 1).unwrap();
        t.declare(BoundedString::ident("b").unwrap(), 2).unwrap();
        assert_eq!(t.index_of("a"), Some(0));
        assert_eq!(t.index_of("b"), Some(1));
        assert_eq!(t.total_bytes(8), 16);
    }

    #[test]
    fn buffer_table_computes_prefix_offsets() {
        let mut t = BufferTable::new();
        t.declare(BoundedString::ident("x").unwrap(), 16).unwrap();
        t.declare(BoundedString::ident("y").unwrap(), 32).unwrap();
        assert_eq!(t.offset_of("x"), Some(0));
        assert_eq!(t.offset_of("y"), Some(16));
        assert_eq!(t.total_bytes(), 48);
    }

    #[test]
    fn string_table_coalesces_duplicates() {
        let mut t = StringTable::new();
        let a = t.intern("hello");
        let b = t.intern("world");
        let c = t.intern("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(t.total_bytes(), "hello".len() as u64 + 1 + "world".len() as u64 + 1);
    }
}
