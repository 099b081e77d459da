//! The opcode shape table: arity and declared operand types per opcode
//! (spec.md §4.2). Drives both the parser's grammar and the invariant check
//! `operand_count == opcode's declared arity` (spec.md §3).

use crate::ir::{Opcode, OperandType};

/// `(arity, operand types)`. Unused slots in the 3-element array are never
/// read when `arity` is smaller.
pub struct Shape {
    pub arity: usize,
    pub operands: [OperandType; 3],
}

const REG: OperandType = OperandType::Register;
const IMM: OperandType = OperandType::Immediate;
const LBL: OperandType = OperandType::LabelRef;
const RI: OperandType = OperandType::RegisterOrImmediate;

fn shape(arity: usize, a: OperandType, b: OperandType, c: OperandType) -> Shape {
    Shape {
        arity,
        operands: [a, b, c],
    }
}

/// Look up the grammar shape for an opcode. `VAR`/`SET`/`GET`/`CALL` and
/// function definitions are handled out-of-table by the parser (spec.md
/// §4.2); they still appear here so the compliance gate and completeness
/// checks (spec.md §8, property 8) can address them uniformly.
pub fn shape_of(op: Opcode) -> Shape {
    use Opcode::*;
    match op {
        Mov => shape(2, REG, RI, REG),
        Ldi => shape(2, REG, IMM, REG),
        Load => shape(2, REG, LBL, REG),
        Store => shape(2, LBL, REG, REG),
        Loadb => shape(2, REG, LBL, REG),
        Storeb => shape(2, LBL, REG, REG),
        Lds => shape(2, REG, OperandType::StringLit, REG),
        Add | Sub | Mul | Div | And | Or | Xor | Shl | Shr => shape(2, REG, RI, REG),
        Inc | Dec | Not => shape(1, REG, REG, REG),
        Cmp => shape(2, REG, RI, REG),
        Jmp => shape(1, LBL, REG, REG),
        Jz | Jnz | Jl | Jg => shape(1, LBL, REG, REG),
        Call => shape(1, LBL, REG, REG),
        Ret => shape(0, REG, REG, REG),
        Push | Pop => shape(1, REG, REG, REG),
        Int => shape(1, IMM, REG, REG),
        Sys => shape(0, REG, REG, REG),
        Hlt | Nop => shape(0, REG, REG, REG),
        // VAR name [, init]: arity is variable (1 or 2); the parser special-
        // cases this, the gate accepts either.
        Var => shape(1, LBL, IMM, REG),
        Set => shape(2, LBL, RI, REG),
        Get => shape(2, REG, LBL, REG),
        Buffer => shape(2, LBL, IMM, REG),
        Cpuid => shape(0, REG, REG, REG),
        Rdtsc => shape(0, REG, REG, REG),
        Bswap => shape(1, REG, REG, REG),
        Pusha | Popa => shape(0, REG, REG, REG),
        Djnz => shape(2, REG, LBL, REG),
        Cjne => shape(2, REG, RI, REG),
        Setb | Clr => shape(1, REG, REG, REG),
        Reti => shape(0, REG, REG, REG),
        Wfi | Dmb => shape(0, REG, REG, REG),
        Ebreak | Fence => shape(0, REG, REG, REG),
        Org => shape(1, IMM, REG, REG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_shape() {
        for &op in Opcode::all() {
            let s = shape_of(op);
            assert!(s.arity <= 3);
        }
    }
}
