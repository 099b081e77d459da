//! Shared diagnostic reporting: the error taxonomy of spec.md §7, and the
//! pure `(kind, file, line, col, message) -> banner` formatter of Design
//! Note 9.
//!
//! Every fatal condition in the assembler is one of these variants. None of
//! them recover locally (spec.md §7: "no local recovery"); the top level
//! (`ua-cli`) turns any `Err` into a process exit.

use std::fmt;

use crate::ir::SourcePos;

/// The location a diagnostic refers to. `col` is `0` when only a line is
/// known (preprocessor/compliance errors never have column granularity).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    pub fn from_pos(file: impl Into<String>, pos: SourcePos) -> Self {
        Self::new(file, pos.line, pos.col)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col > 0 {
            write!(f, "{}:{}:{}", self.file, self.line, self.col)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// The category heading used in the banner (spec.md §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Io,
    Preprocessor,
    Syntax,
    Compliance,
    Codegen,
    Resource,
}

impl Category {
    fn heading(self) -> &'static str {
        match self {
            Category::Io => "I/O FAILURE",
            Category::Preprocessor => "PREPROCESSOR ERROR",
            Category::Syntax => "SYNTAX ERROR",
            Category::Compliance => "COMPLIANCE ERROR",
            Category::Codegen => "CODEGEN ERROR",
            Category::Resource => "RESOURCE EXHAUSTION",
        }
    }
}

/// One formatted diagnostic. `Compliance` errors are aggregated by the
/// caller (spec.md §7: "every violation is reported, then the run aborts")
/// by collecting several `Diagnostic`s before printing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: Category,
    pub location: Option<Location>,
    pub message: String,
    /// For syntax errors: the near-token context and expected production.
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn new(category: Category, location: Option<Location>, message: impl Into<String>) -> Self {
        Self {
            category,
            location,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Render the multi-line banner described in spec.md §7.
    pub fn banner(&self) -> String {
        let mut out = String::new();
        out.push_str("==== ");
        out.push_str(self.category.heading());
        out.push_str(" ====\n");
        if let Some(loc) = &self.location {
            out.push_str(&format!("  at {loc}\n"));
        }
        out.push_str(&format!("  {}\n", self.message));
        if let Some(ctx) = &self.context {
            out.push_str(&format!("  near: {ctx}\n"));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.banner())
    }
}

/// The unified error type threaded through every pipeline stage. Each
/// variant maps 1:1 onto a spec.md §7 category.
#[derive(Debug, thiserror::Error)]
pub enum UaError {
    #[error("{0}")]
    Io(IoFailure),
    #[error("{0}")]
    Preprocessor(PreprocessorError),
    #[error("{0}")]
    Syntax(SyntaxError),
    #[error("aggregated compliance errors")]
    Compliance(Vec<Diagnostic>),
    #[error("{0}")]
    Codegen(CodegenError),
    #[error("{0}")]
    Resource(ResourceError),
}

impl UaError {
    /// Render every diagnostic this error carries as banners, in order.
    pub fn banners(&self, file: &str) -> Vec<String> {
        match self {
            UaError::Io(e) => vec![Diagnostic::new(Category::Io, None, e.to_string()).banner()],
            UaError::Preprocessor(e) => vec![
                Diagnostic::new(Category::Preprocessor, Some(Location::new(file, e.line(), 0)), e.to_string())
                    .banner(),
            ],
            UaError::Syntax(e) => vec![
                Diagnostic::new(
                    Category::Syntax,
                    Some(Location::new(file, e.line(), e.col())),
                    e.to_string(),
                )
                .with_context(e.near().unwrap_or_default())
                .banner(),
            ],
            UaError::Compliance(diags) => diags.iter().map(Diagnostic::banner).collect(),
            UaError::Codegen(e) => vec![
                Diagnostic::new(Category::Codegen, Some(Location::new(file, e.line(), 0)), e.to_string())
                    .banner(),
            ],
            UaError::Resource(e) => {
                vec![Diagnostic::new(Category::Resource, None, e.to_string()).banner()]
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IoFailure {
    #[error("failed to read `{path}`: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to write `{path}`: {source}")]
    Write { path: String, source: std::io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessorError {
    #[error("unknown directive `{directive}`")]
    UnknownDirective { directive: String, line: u32 },
    #[error("unterminated @IF_ARCH/@IF_SYS block")]
    UnterminatedIf { line: u32 },
    #[error("@IMPORT recursion too deep (max {max})")]
    ImportTooDeep { max: u32, line: u32 },
    #[error("import path too long (max {max} bytes)")]
    PathTooLong { max: usize, line: u32 },
    #[error("unterminated quote in directive argument")]
    BadQuote { line: u32 },
    #[error("@ARCH_ONLY does not include target architecture `{arch}`")]
    ArchOnlyMismatch { arch: String, line: u32 },
    #[error("@SYS_ONLY does not include target system `{sys}`")]
    SysOnlyMismatch { sys: String, line: u32 },
    #[error("could not resolve import path `{path}`")]
    UnresolvedImport { path: String, line: u32 },
    #[error("conditional nesting exceeds the maximum depth of {max}")]
    NestingOverflow { max: u32, line: u32 },
    #[error("too many imported files (max {max})")]
    TooManyImports { max: u32, line: u32 },
}

impl PreprocessorError {
    pub fn line(&self) -> u32 {
        match self {
            PreprocessorError::UnknownDirective { line, .. }
            | PreprocessorError::UnterminatedIf { line }
            | PreprocessorError::ImportTooDeep { line, .. }
            | PreprocessorError::PathTooLong { line, .. }
            | PreprocessorError::BadQuote { line }
            | PreprocessorError::ArchOnlyMismatch { line, .. }
            | PreprocessorError::SysOnlyMismatch { line, .. }
            | PreprocessorError::UnresolvedImport { line, .. }
            | PreprocessorError::NestingOverflow { line, .. }
            | PreprocessorError::TooManyImports { line, .. } => *line,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    #[error("unknown opcode `{mnemonic}`")]
    UnknownOpcode {
        mnemonic: String,
        line: u32,
        col: u32,
    },
    #[error("unknown operand type for opcode `{opcode}`")]
    BadOperandType {
        opcode: String,
        line: u32,
        col: u32,
        near: String,
    },
    #[error("missing operand {index} for opcode `{opcode}`")]
    MissingOperand {
        opcode: String,
        index: usize,
        line: u32,
        col: u32,
    },
    #[error("extra tokens after operand list for opcode `{opcode}`")]
    ExtraTokens {
        opcode: String,
        line: u32,
        col: u32,
        near: String,
    },
    #[error("function definition `{name}` declares too many parameters (max {max})")]
    ParamOverflow {
        name: String,
        max: usize,
        line: u32,
        col: u32,
    },
}

impl SyntaxError {
    pub fn line(&self) -> u32 {
        match self {
            SyntaxError::UnknownOpcode { line, .. }
            | SyntaxError::BadOperandType { line, .. }
            | SyntaxError::MissingOperand { line, .. }
            | SyntaxError::ExtraTokens { line, .. }
            | SyntaxError::ParamOverflow { line, .. } => *line,
        }
    }

    pub fn col(&self) -> u32 {
        match self {
            SyntaxError::UnknownOpcode { col, .. }
            | SyntaxError::BadOperandType { col, .. }
            | SyntaxError::MissingOperand { col, .. }
            | SyntaxError::ExtraTokens { col, .. }
            | SyntaxError::ParamOverflow { col, .. } => *col,
        }
    }

    pub fn near(&self) -> Option<String> {
        match self {
            SyntaxError::BadOperandType { near, .. } | SyntaxError::ExtraTokens { near, .. } => {
                Some(near.clone())
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("register R{reg} is outside the emitter's window ({window})")]
    RegisterOutOfWindow {
        reg: u8,
        window: String,
        line: u32,
    },
    #[error("immediate {value} is out of range for this target ({detail})")]
    ImmediateOutOfRange {
        value: i64,
        detail: String,
        line: u32,
    },
    #[error("opcode `{opcode}` is not supported by this emitter")]
    UnsupportedOpcode { opcode: String, line: u32 },
    #[error("undefined label `{name}`")]
    UndefinedLabel { name: String, line: u32 },
    #[error("branch displacement {displacement} is out of range ({detail})")]
    BranchOutOfRange {
        displacement: i64,
        detail: String,
        line: u32,
    },
    #[error("duplicate label `{name}`")]
    DuplicateLabel { name: String, line: u32 },
    #[error("duplicate variable `{name}`")]
    DuplicateVariable { name: String, line: u32 },
    #[error("8051 indirect load/store requires R0 or R1, got R{reg}")]
    Mcs51IndirectRegister { reg: u8, line: u32 },
}

impl CodegenError {
    pub fn line(&self) -> u32 {
        match self {
            CodegenError::RegisterOutOfWindow { line, .. }
            | CodegenError::ImmediateOutOfRange { line, .. }
            | CodegenError::UnsupportedOpcode { line, .. }
            | CodegenError::UndefinedLabel { line, .. }
            | CodegenError::BranchOutOfRange { line, .. }
            | CodegenError::DuplicateLabel { line, .. }
            | CodegenError::DuplicateVariable { line, .. }
            | CodegenError::Mcs51IndirectRegister { line, .. } => *line,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("table overflow: {what}")]
    TableOverflow { what: String },
    #[error("allocation failure: {what}")]
    AllocationFailure { what: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_includes_category_and_location() {
        let d = Diagnostic::new(
            Category::Syntax,
            Some(Location::new("a.ua", 3, 5)),
            "unknown opcode `FOO`",
        );
        let banner = d.banner();
        assert!(banner.contains("SYNTAX ERROR"));
        assert!(banner.contains("a.ua:3:5"));
        assert!(banner.contains("unknown opcode"));
    }

    #[test]
    fn location_without_column_omits_it() {
        let loc = Location::new("a.ua", 7, 0);
        assert_eq!(loc.to_string(), "a.ua:7");
    }
}
