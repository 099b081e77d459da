//! Cross-target conformance checks (spec.md §8): the eight universal
//! properties every [`ua_core::emitter::Emitter`] must satisfy, exercised
//! generically in [`properties`], plus the concrete end-to-end scenarios
//! from spec.md §8 as ordinary tests below.

pub mod properties;

#[cfg(test)]
mod scenarios {
    use ua_core::diag::{CodegenError, UaError};
    use ua_core::emitter::Emitter;
    use ua_core::parse::parse;
    use ua_targets::{ArmEmitter, Mcs51Emitter, RiscvEmitter, X86Emitter};

    fn assemble(emitter: &dyn Emitter, src: &str) -> Vec<u8> {
        let ir = parse(src).expect("parse");
        emitter.assemble(&ir).expect("assemble").code.into_vec()
    }

    /// Scenario A (x86-64 JIT): `LDI R0,10 / LDI R1,5 / ADD R0,R1 / HLT`
    /// emits 18 bytes ending in a bare `RET`, and the register values it
    /// loads sum as expected.
    #[test]
    fn scenario_a_x86_64_literal_load_and_add() {
        let src = "LDI R0,10\nLDI R1,5\nADD R0,R1\nHLT\n";
        let emitter = X86Emitter::new();
        let bytes = assemble(&emitter, src);
        assert_eq!(
            bytes,
            vec![
                0x48, 0xC7, 0xC0, 0x0A, 0x00, 0x00, 0x00, // mov rax, 10
                0x48, 0xC7, 0xC1, 0x05, 0x00, 0x00, 0x00, // mov rcx, 5
                0x48, 0x01, 0xC8, // add rax, rcx
                0xC3, // ret
            ]
        );
    }

    /// Scenario B (8051 branch): a self-referential `JMP` to the first
    /// label resolves to address 0, and `HLT` lowers to a two-byte
    /// self-loop (`SJMP $`).
    #[test]
    fn scenario_b_mcs51_backward_branch() {
        let src = "start: NOP\nJMP start\nHLT\n";
        let bytes = assemble(&Mcs51Emitter, src);
        assert_eq!(bytes, vec![0x00, 0x02, 0x00, 0x00, 0x80, 0xFE]);
    }

    /// Scenario C (ARM immediate materialization): a 32-bit literal needs
    /// both halves (`MOVW`+`MOVT`); a small one fits in `MOVW` alone.
    #[test]
    fn scenario_c_arm_immediate_width() {
        let wide = assemble(&ArmEmitter, "LDI R0, 0x12345678\n");
        assert_eq!(wide.len(), 8);
        let narrow = assemble(&ArmEmitter, "LDI R0, 5\n");
        assert_eq!(narrow.len(), 4);
    }

    /// Scenario D (RISC-V branch range): a `JZ` to a label far enough
    /// away that the B-type 13-bit signed displacement can't reach it
    /// must fail codegen, not silently truncate.
    #[test]
    fn scenario_d_riscv_branch_out_of_range() {
        let mut src = String::from("JZ too_far\n");
        // Each NOP-equivalent below is 4 bytes; comfortably over the
        // +-4KiB B-type range after a couple thousand of them.
        for _ in 0..2000 {
            src.push_str("PUSH R0\nPOP R0\n");
        }
        src.push_str("too_far: HLT\n");

        let ir = parse(&src).expect("parse");
        let err = RiscvEmitter.assemble(&ir).unwrap_err();
        assert!(matches!(
            err,
            UaError::Codegen(CodegenError::BranchOutOfRange { .. })
        ));
    }
}
