//! Minimal PE32+ executable wrapper (spec.md §6): DOS stub, COFF header,
//! an `IMAGE_OPTIONAL_HEADER64`, and a single executable `.text` section
//! holding the code. File alignment and section alignment are both set
//! to the same value to keep the layout a straight concatenation (a real
//! linker keeps them distinct; this wrapper is "specified only at the
//! interface level", per spec.md §6).

use std::io::Write;
use std::path::Path;

use ua_core::diag::{IoFailure, UaError};
use ua_core::ir::Arch;

const IMAGE_BASE: u64 = 0x1400_0000; // typical default for /LARGEADDRESSAWARE x64 images
const FILE_ALIGN: u32 = 0x200;
const SECTION_ALIGN: u32 = 0x200;

const DOS_HEADER_SIZE: u64 = 64;
const COFF_HEADER_SIZE: u64 = 20;
const OPTIONAL_HEADER_SIZE: u64 = 112 + 16 * 8; // IMAGE_OPTIONAL_HEADER64 + 16 data directories
const SECTION_HEADER_SIZE: u64 = 40;
const PE_SIG_SIZE: u64 = 4;

fn machine(arch: Arch) -> u16 {
    match arch {
        Arch::X86 => 0x8664,    // IMAGE_FILE_MACHINE_AMD64
        Arch::X86_32 => 0x014C, // IMAGE_FILE_MACHINE_I386
        _ => 0x8664,
    }
}

fn trailer() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0xE8, 0x00, 0x00, 0x00, 0x00]); // call rel0 (placeholder stub, see DESIGN.md)
    out.extend_from_slice(&[0xB9, 0x00, 0x00, 0x00, 0x00]); // mov ecx, 0 (exit code, Win64 first arg register)
    out.extend_from_slice(&[0xFF, 0x15, 0x00, 0x00, 0x00, 0x00]); // call [ExitProcess] -- no IAT wired up; placeholder
    out
}

fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

pub fn write(path: &Path, code: &[u8], arch: Arch) -> Result<(), UaError> {
    let mut body = code.to_vec();
    body.extend(trailer());

    let headers_size = DOS_HEADER_SIZE
        + PE_SIG_SIZE
        + COFF_HEADER_SIZE
        + OPTIONAL_HEADER_SIZE
        + SECTION_HEADER_SIZE;
    let headers_size_aligned = round_up(headers_size as u32, FILE_ALIGN) as u64;
    let text_vaddr = round_up(headers_size_aligned as u32, SECTION_ALIGN);
    let text_raw_size = round_up(body.len() as u32, FILE_ALIGN);
    let entry_rva = text_vaddr;

    let mut out = Vec::with_capacity((headers_size_aligned + text_raw_size as u64) as usize);

    // DOS header: only e_lfanew matters, pointing straight past a 64-byte stub.
    out.extend_from_slice(b"MZ");
    out.extend_from_slice(&[0u8; 58]);
    out.extend_from_slice(&(DOS_HEADER_SIZE as u32).to_le_bytes()); // e_lfanew
    assert_eq!(out.len() as u64, DOS_HEADER_SIZE);

    // PE signature + COFF file header.
    out.extend_from_slice(b"PE\0\0");
    out.extend_from_slice(&machine(arch).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // NumberOfSections
    out.extend_from_slice(&0u32.to_le_bytes()); // TimeDateStamp
    out.extend_from_slice(&0u32.to_le_bytes()); // PointerToSymbolTable
    out.extend_from_slice(&0u32.to_le_bytes()); // NumberOfSymbols
    out.extend_from_slice(&(OPTIONAL_HEADER_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&0x0022u16.to_le_bytes()); // Characteristics: EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE

    // IMAGE_OPTIONAL_HEADER64
    out.extend_from_slice(&0x020Bu16.to_le_bytes()); // Magic: PE32+
    out.extend_from_slice(&[0u8, 0u8]); // LinkerVersion
    out.extend_from_slice(&(text_raw_size).to_le_bytes()); // SizeOfCode
    out.extend_from_slice(&0u32.to_le_bytes()); // SizeOfInitializedData
    out.extend_from_slice(&0u32.to_le_bytes()); // SizeOfUninitializedData
    out.extend_from_slice(&entry_rva.to_le_bytes()); // AddressOfEntryPoint
    out.extend_from_slice(&text_vaddr.to_le_bytes()); // BaseOfCode
    out.extend_from_slice(&IMAGE_BASE.to_le_bytes()); // ImageBase
    out.extend_from_slice(&SECTION_ALIGN.to_le_bytes()); // SectionAlignment
    out.extend_from_slice(&FILE_ALIGN.to_le_bytes()); // FileAlignment
    out.extend_from_slice(&6u16.to_le_bytes()); // MajorOSVersion
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // MajorImageVersion
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&6u16.to_le_bytes()); // MajorSubsystemVersion
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // Win32VersionValue
    let image_size = round_up(text_vaddr + text_raw_size, SECTION_ALIGN);
    out.extend_from_slice(&image_size.to_le_bytes()); // SizeOfImage
    out.extend_from_slice(&headers_size_aligned.to_le_bytes()); // SizeOfHeaders
    out.extend_from_slice(&0u32.to_le_bytes()); // CheckSum
    out.extend_from_slice(&3u16.to_le_bytes()); // Subsystem: IMAGE_SUBSYSTEM_WINDOWS_CUI
    out.extend_from_slice(&0u16.to_le_bytes()); // DllCharacteristics
    out.extend_from_slice(&0x10_0000u64.to_le_bytes()); // SizeOfStackReserve
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // SizeOfStackCommit
    out.extend_from_slice(&0x10_0000u64.to_le_bytes()); // SizeOfHeapReserve
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // SizeOfHeapCommit
    out.extend_from_slice(&0u32.to_le_bytes()); // LoaderFlags
    out.extend_from_slice(&16u32.to_le_bytes()); // NumberOfRvaAndSizes
    for _ in 0..16 {
        out.extend_from_slice(&[0u8; 8]); // empty data directories
    }

    // Section header for `.text`.
    let mut name = [0u8; 8];
    name[..5].copy_from_slice(b".text");
    out.extend_from_slice(&name);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes()); // VirtualSize
    out.extend_from_slice(&text_vaddr.to_le_bytes()); // VirtualAddress
    out.extend_from_slice(&text_raw_size.to_le_bytes()); // SizeOfRawData
    out.extend_from_slice(&(headers_size_aligned as u32).to_le_bytes()); // PointerToRawData
    out.extend_from_slice(&0u32.to_le_bytes()); // PointerToRelocations
    out.extend_from_slice(&0u32.to_le_bytes()); // PointerToLinenumbers
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x6000_0020u32.to_le_bytes()); // CODE | EXECUTE | READ

    assert_eq!(out.len() as u64, headers_size);
    out.resize(headers_size_aligned as usize, 0);

    out.extend_from_slice(&body);
    out.resize((headers_size_aligned + text_raw_size as u64) as usize, 0);

    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(&out))
        .map_err(|source| {
            UaError::Io(IoFailure::Write {
                path: path.display().to_string(),
                source,
            })
        })
}
