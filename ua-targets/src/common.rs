//! Shared pass-1 traversal and data-section layout, factored out of the
//! six per-architecture emitters since it does not vary by target: only
//! instruction sizing and encoding do (spec.md §4.4).

use ua_core::prelude::*;

/// Result of pass 1: code size plus the three data tables with their
/// offsets resolved relative to `code_size`.
pub struct Layout {
    pub code_size: u64,
    pub symbols: SymbolTable,
    pub variables: VariableTable,
    pub buffers: BufferTable,
    pub strings: StringTable,
    pub word_size: u64,
}

impl Layout {
    pub fn variable_addr(&self, index: usize) -> u64 {
        self.code_size + (index as u64) * self.word_size
    }

    pub fn variable_bytes(&self) -> u64 {
        self.variables.total_bytes(self.word_size as usize)
    }

    pub fn buffer_addr(&self, name: &str) -> Option<u64> {
        self.buffers
            .offset_of(name)
            .map(|off| self.code_size + self.variable_bytes() + off)
    }

    pub fn string_addr(&self, index: usize) -> u64 {
        self.code_size + self.variable_bytes() + self.buffers.total_bytes() + self.strings.offset_of(index)
    }

    /// Resolve any name (label, variable, or buffer) to an absolute
    /// code-image-relative address.
    pub fn resolve(&self, name: &str) -> Option<u64> {
        if let Some(addr) = self.symbols.resolve(name) {
            return Some(addr);
        }
        if let Some(idx) = self.variables.index_of(name) {
            return Some(self.variable_addr(idx));
        }
        self.buffer_addr(name)
    }

    /// The variable/buffer/string data section, in that order, per
    /// spec.md §3's placement rule.
    pub fn data_section(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for v in self.variables.iter() {
            let bytes = v.init.to_le_bytes();
            out.extend_from_slice(&bytes[..self.word_size as usize]);
        }
        for b in self.buffers.iter() {
            out.resize(out.len() + b.len as usize, 0);
        }
        for s in self.strings.iter() {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out
    }
}

pub fn label_name(operand: &Operand) -> &str {
    match operand {
        Operand::LabelRef(s) => s.as_str(),
        _ => "",
    }
}

pub fn imm_value(operand: &Operand) -> i64 {
    match operand {
        Operand::Immediate(v) => *v,
        _ => 0,
    }
}

pub fn reg_index(operand: &Operand) -> Option<u8> {
    match operand {
        Operand::Register(r) => Some(*r),
        _ => None,
    }
}

/// Run pass 1: walk `ir` once, populating the symbol/variable/buffer/
/// string tables and accumulating a running PC via `predict`. `predict`
/// is given the already-collected string table so `LDS`'s size can depend
/// on nothing but the operand shape (it never does, but the signature
/// keeps interning and sizing in the same traversal order as emission).
pub fn pass1<F>(ir: &[Instruction], word_size: u64, mut predict: F) -> Result<Layout, UaError>
where
    F: FnMut(&Instruction) -> Result<u64, UaError>,
{
    let mut symbols = SymbolTable::new();
    let mut variables = VariableTable::new();
    let mut buffers = BufferTable::new();
    let mut strings = StringTable::new();
    let mut pc = 0u64;

    for instr in ir {
        match instr {
            Instruction::LabelDef { name, pos, .. } => {
                symbols.define(name.as_str(), pc).map_err(|_| {
                    UaError::Codegen(CodegenError::DuplicateLabel {
                        name: name.to_string(),
                        line: pos.line,
                    })
                })?;
            }
            Instruction::Op {
                opcode: Opcode::Var,
                operands,
                pos,
                ..
            } => {
                let name = match &operands[0] {
                    Operand::LabelRef(n) => n.clone(),
                    _ => unreachable!("VAR's first operand is always a label"),
                };
                let init = operands.get(1).map(imm_value).unwrap_or(0);
                variables.declare(name.clone(), init).map_err(|_| {
                    UaError::Codegen(CodegenError::DuplicateVariable {
                        name: name.to_string(),
                        line: pos.line,
                    })
                })?;
            }
            Instruction::Op {
                opcode: Opcode::Buffer,
                operands,
                pos,
                ..
            } => {
                let name = match &operands[0] {
                    Operand::LabelRef(n) => n.clone(),
                    _ => unreachable!("BUFFER's first operand is always a label"),
                };
                let len = operands.get(1).map(imm_value).unwrap_or(0).max(0) as u64;
                buffers.declare(name.clone(), len).map_err(|_| {
                    UaError::Codegen(CodegenError::DuplicateVariable {
                        name: name.to_string(),
                        line: pos.line,
                    })
                })?;
            }
            Instruction::Op {
                opcode: Opcode::Lds,
                operands,
                ..
            } => {
                if let Some(Operand::StringLit(s)) = operands.get(1) {
                    strings.intern(s.as_str());
                }
                pc += predict(instr)?;
            }
            _ => {
                pc += predict(instr)?;
            }
        }
    }

    log::trace!("interned strings (deduped): {:?}", strings.unique_sorted());

    Ok(Layout {
        code_size: pc,
        symbols,
        variables,
        buffers,
        strings,
        word_size,
    })
}
