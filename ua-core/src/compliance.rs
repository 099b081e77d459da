//! Opcode-compliance gate (spec.md §4.3): a static table maps each opcode
//! to the architectures and systems that support it; the gate scans the IR
//! once and reports every violation before assembly proceeds.

use crate::diag::{Category, Diagnostic, Location, UaError};
use crate::ir::{Arch, Instruction, Opcode, Sys};

const ALL_ARCHES: &[Arch] = &[
    Arch::Mcs51,
    Arch::X86,
    Arch::X86_32,
    Arch::Arm,
    Arch::Arm64,
    Arch::Riscv,
];

const ALL_SYS: &[Sys] = &[Sys::Baremetal, Sys::Win32, Sys::Linux, Sys::Macos];

/// The architecture set an opcode is permitted on. Opcodes not named here
/// belong to the core MVIS and run everywhere.
fn arches_for(op: Opcode) -> &'static [Arch] {
    use Opcode::*;
    match op {
        Cpuid | Rdtsc => &[Arch::X86, Arch::X86_32],
        Pusha | Popa => &[Arch::X86_32],
        Djnz | Cjne | Setb | Clr | Reti => &[Arch::Mcs51],
        Wfi | Dmb => &[Arch::Arm, Arch::Arm64],
        Ebreak | Fence => &[Arch::Riscv],
        Bswap => &[Arch::X86, Arch::X86_32, Arch::Arm, Arch::Arm64, Arch::Riscv],
        _ => ALL_ARCHES,
    }
}

/// The OS-context set an opcode is permitted in. No opcode in the closed
/// enumeration restricts by system; every opcode is universal here, but the
/// gate still checks it so a future system-specific opcode costs nothing.
fn systems_for(_op: Opcode) -> &'static [Sys] {
    ALL_SYS
}

fn permitted_names(arches: &[Arch]) -> String {
    arches
        .iter()
        .map(|a| a.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scan `ir` for opcodes whose compliance bits exclude `arch`/`sys`.
/// Returns every violation; an empty vector means the IR is clean.
pub fn check(ir: &[Instruction], arch: Arch, sys: Sys) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for instr in ir {
        let Instruction::Op { opcode, pos, .. } = instr else {
            continue;
        };
        let arches = arches_for(*opcode);
        if !arches.contains(&arch) {
            diags.push(Diagnostic::new(
                Category::Compliance,
                Some(Location::new("", pos.line, 0)),
                format!(
                    "opcode `{}` is not supported on `{}` (permitted: {})",
                    opcode.mnemonic(),
                    arch.name(),
                    permitted_names(arches)
                ),
            ));
            continue;
        }
        let systems = systems_for(*opcode);
        if !systems.contains(&sys) {
            diags.push(Diagnostic::new(
                Category::Compliance,
                Some(Location::new("", pos.line, 0)),
                format!(
                    "opcode `{}` is not supported under `{}`",
                    opcode.mnemonic(),
                    sys.name()
                ),
            ));
        }
    }
    diags
}

/// Run the gate and turn any violation into a fatal `UaError::Compliance`.
pub fn gate(ir: &[Instruction], arch: Arch, sys: Sys) -> Result<(), UaError> {
    let diags = check(ir, arch, sys);
    if diags.is_empty() {
        Ok(())
    } else {
        Err(UaError::Compliance(diags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, SourcePos};

    fn op(opcode: Opcode) -> Instruction {
        Instruction::Op {
            opcode,
            operands: Vec::<Operand>::new(),
            pos: SourcePos { line: 1, col: 1 },
            call_args: None,
        }
    }

    #[test]
    fn universal_opcode_passes_everywhere() {
        let ir = vec![op(Opcode::Nop)];
        for &arch in ALL_ARCHES {
            assert!(check(&ir, arch, Sys::Baremetal).is_empty());
        }
    }

    #[test]
    fn arch_specific_opcode_rejected_elsewhere() {
        let ir = vec![op(Opcode::Cjne)];
        assert!(check(&ir, Arch::Mcs51, Sys::Baremetal).is_empty());
        let diags = check(&ir, Arch::X86, Sys::Baremetal);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, Category::Compliance);
    }

    #[test]
    fn pusha_restricted_to_32_bit_x86() {
        let ir = vec![op(Opcode::Pusha)];
        assert!(check(&ir, Arch::X86_32, Sys::Linux).is_empty());
        assert!(!check(&ir, Arch::X86, Sys::Linux).is_empty());
        assert!(!check(&ir, Arch::Arm, Sys::Linux).is_empty());
    }

    #[test]
    fn gate_aggregates_every_violation() {
        let ir = vec![op(Opcode::Cjne), op(Opcode::Wfi), op(Opcode::Ebreak)];
        match gate(&ir, Arch::X86, Sys::Linux) {
            Err(UaError::Compliance(diags)) => assert_eq!(diags.len(), 3),
            other => panic!("expected aggregated compliance error, got {other:?}"),
        }
    }
}
