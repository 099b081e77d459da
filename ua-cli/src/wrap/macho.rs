//! Minimal Mach-O 64-bit executable wrapper (spec.md §6), for `arm64`
//! targeting `macos`. One `LC_SEGMENT_64` covering the whole file plus an
//! `LC_MAIN` pointing at the user's code, matching the modern (post
//! `LC_UNIXTHREAD`) entry-point convention.

use std::io::Write;
use std::path::Path;

use ua_core::diag::{IoFailure, UaError};

const BASE_ADDR: u64 = 0x1_0000_0000;
const MH_MAGIC_64: u32 = 0xFEED_FACF;
const CPU_TYPE_ARM64: u32 = 0x0100_000C;
const CPU_SUBTYPE_ARM64_ALL: u32 = 0;
const MH_EXECUTE: u32 = 2;
const LC_SEGMENT_64: u32 = 0x19;
const LC_MAIN: u32 = 0x8000_0028;

const MH_HEADER_SIZE: u64 = 32;
const SEGMENT_CMD_SIZE: u64 = 72;
const MAIN_CMD_SIZE: u64 = 24;
const HEADER_SIZE: u64 = MH_HEADER_SIZE + SEGMENT_CMD_SIZE + MAIN_CMD_SIZE;

fn trailer() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0xE8, 0x00, 0x00, 0x00, 0x00]); // call rel0 (placeholder stub, see DESIGN.md)
    out.extend_from_slice(&[0x00, 0x00, 0x80, 0xD2]); // mov x0, #0   (aarch64, exit code 0)
    out.extend_from_slice(&[0x10, 0x00, 0x80, 0xD2]); // mov x16, #1  (SYS_exit on Darwin)
    out.extend_from_slice(&[0x01, 0x10, 0x00, 0xD4]); // svc #0x80
    out
}

fn segname(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    for (i, b) in name.bytes().take(16).enumerate() {
        buf[i] = b;
    }
    buf
}

pub fn write(path: &Path, code: &[u8]) -> Result<(), UaError> {
    let mut body = code.to_vec();
    body.extend(trailer());
    let file_size = HEADER_SIZE + body.len() as u64;

    let mut out = Vec::with_capacity(file_size as usize);

    // mach_header_64
    out.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
    out.extend_from_slice(&CPU_TYPE_ARM64.to_le_bytes());
    out.extend_from_slice(&CPU_SUBTYPE_ARM64_ALL.to_le_bytes());
    out.extend_from_slice(&MH_EXECUTE.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes()); // ncmds
    out.extend_from_slice(&((SEGMENT_CMD_SIZE + MAIN_CMD_SIZE) as u32).to_le_bytes()); // sizeofcmds
    out.extend_from_slice(&0u32.to_le_bytes()); // flags
    out.extend_from_slice(&0u32.to_le_bytes()); // reserved
    assert_eq!(out.len() as u64, MH_HEADER_SIZE);

    // LC_SEGMENT_64 "__TEXT": maps the entire file, RWX, no sections.
    out.extend_from_slice(&LC_SEGMENT_64.to_le_bytes());
    out.extend_from_slice(&(SEGMENT_CMD_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&segname("__TEXT"));
    out.extend_from_slice(&BASE_ADDR.to_le_bytes()); // vmaddr
    out.extend_from_slice(&file_size.to_le_bytes()); // vmsize
    out.extend_from_slice(&0u64.to_le_bytes()); // fileoff
    out.extend_from_slice(&file_size.to_le_bytes()); // filesize
    out.extend_from_slice(&7i32.to_le_bytes()); // maxprot RWX
    out.extend_from_slice(&7i32.to_le_bytes()); // initprot RWX
    out.extend_from_slice(&0u32.to_le_bytes()); // nsects
    out.extend_from_slice(&0u32.to_le_bytes()); // flags
    assert_eq!(out.len() as u64, MH_HEADER_SIZE + SEGMENT_CMD_SIZE);

    // LC_MAIN: entry point is the file offset of the user's code, relative
    // to the start of __TEXT.
    out.extend_from_slice(&LC_MAIN.to_le_bytes());
    out.extend_from_slice(&(MAIN_CMD_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&HEADER_SIZE.to_le_bytes()); // entryoff
    out.extend_from_slice(&0u64.to_le_bytes()); // stacksize (default)
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
