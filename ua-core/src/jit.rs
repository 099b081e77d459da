//! JIT execution (spec.md §5): map an anonymous RWX page, copy the code
//! buffer into it, call it as `() -> i64`, read the result, unmap.
//!
//! Only meaningful for `-arch x86 --run` (spec.md §6); emitters destined
//! for JIT use must lower `HLT` to `RET` so the mapped region ends in a
//! valid return.

use crate::diag::{ResourceError, UaError};

/// Map `code` into an executable page, invoke it, and return the value in
/// the host's first return register (RAX on x86-64).
///
/// # Safety
/// `code` must be a sequence of valid x86-64 machine instructions ending
/// in `RET`; calling arbitrary bytes as a function is inherently unsafe.
pub unsafe fn run(code: &[u8]) -> Result<i64, UaError> {
    if code.is_empty() {
        return Err(UaError::Resource(ResourceError::AllocationFailure {
            what: "cannot JIT an empty code buffer".to_string(),
        }));
    }

    let page_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
    let map_len = code.len().div_ceil(page_size) * page_size;

    let addr = libc::mmap(
        std::ptr::null_mut(),
        map_len,
        libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if addr == libc::MAP_FAILED {
        return Err(UaError::Resource(ResourceError::AllocationFailure {
            what: "anonymous RWX mmap failed".to_string(),
        }));
    }

    std::ptr::copy_nonoverlapping(code.as_ptr(), addr as *mut u8, code.len());

    let func: extern "C" fn() -> i64 = std::mem::transmute(addr);
    let result = func();

    libc::munmap(addr, map_len);
    Ok(result)
}

#[cfg(all(test, target_arch = "x86_64", any(target_os = "linux", target_os = "macos")))]
mod tests {
    use super::*;

    #[test]
    fn executes_a_trivial_return_sequence() {
        // mov eax, 42 ; ret
        let code: [u8; 6] = [0xB8, 42, 0, 0, 0, 0xC3];
        let result = unsafe { run(&code) }.unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn rejects_empty_code() {
        let err = unsafe { run(&[]) };
        assert!(matches!(err, Err(UaError::Resource(_))));
    }
}
