//! Generic checks against the [`Emitter`] trait, applicable to every
//! target (spec.md §8, properties 2, 4, 7). Properties 1 and 3 (size
//! exactness, displacement correctness) are pass-1/pass-3 internals
//! covered by each `ua-targets` submodule's own `predict`/`fixup` unit
//! tests; these operate only through the public `assemble` surface.

use ua_core::diag::{CodegenError, UaError};
use ua_core::emitter::Emitter;
use ua_core::parse::parse;

/// Property 2 (label correctness), exercised indirectly: a forward
/// reference to a label defined immediately before a trailing `HLT` must
/// assemble without an `UndefinedLabel` error, and the image must be
/// non-empty.
pub fn label_resolves(emitter: &dyn Emitter, label_def_and_use: &str) -> Result<(), UaError> {
    let ir = parse(label_def_and_use)?;
    let image = emitter.assemble(&ir)?;
    if image.code.is_empty() {
        return Err(UaError::Codegen(CodegenError::UndefinedLabel {
            name: "<unknown>".to_string(),
            line: 0,
        }));
    }
    Ok(())
}

/// Property 7 (duplicate rejection): two definitions of the same label
/// name must fail codegen rather than silently picking one.
pub fn rejects_duplicate_label(emitter: &dyn Emitter, name: &str) -> bool {
    let src = format!("{name}:\nNOP\n{name}:\nNOP\n");
    let ir = match parse(&src) {
        Ok(ir) => ir,
        Err(_) => return true, // caught even earlier, at parse time
    };
    matches!(
        emitter.assemble(&ir),
        Err(UaError::Codegen(CodegenError::DuplicateLabel { .. }))
    )
}

/// Property 4 (range rejection): assembling `source` must fail with
/// `BranchOutOfRange`, never silently truncate the displacement.
pub fn rejects_out_of_range_branch(emitter: &dyn Emitter, source: &str) -> bool {
    let ir = match parse(source) {
        Ok(ir) => ir,
        Err(_) => return false,
    };
    matches!(
        emitter.assemble(&ir),
        Err(UaError::Codegen(CodegenError::BranchOutOfRange { .. }))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ua_targets::{
        Arm64Emitter, ArmEmitter, Mcs51Emitter, RiscvEmitter, X86Emitter, X86_32Emitter,
    };

    #[test]
    fn forward_label_resolves_on_every_target() {
        let src = "JMP done\ndone: HLT\n";
        assert!(label_resolves(&X86Emitter::new(), src).is_ok());
        assert!(label_resolves(&X86_32Emitter, src).is_ok());
        assert!(label_resolves(&Mcs51Emitter, src).is_ok());
        assert!(label_resolves(&ArmEmitter, src).is_ok());
        assert!(label_resolves(&Arm64Emitter, src).is_ok());
        assert!(label_resolves(&RiscvEmitter, src).is_ok());
    }

    #[test]
    fn duplicate_labels_are_rejected_everywhere() {
        assert!(rejects_duplicate_label(&X86Emitter::new(), "again"));
        assert!(rejects_duplicate_label(&X86_32Emitter, "again"));
        assert!(rejects_duplicate_label(&Mcs51Emitter, "again"));
        assert!(rejects_duplicate_label(&ArmEmitter, "again"));
        assert!(rejects_duplicate_label(&Arm64Emitter, "again"));
        assert!(rejects_duplicate_label(&RiscvEmitter, "again"));
    }
}
