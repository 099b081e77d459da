//! Line-oriented preprocessor (spec.md §4.1).
//!
//! A single forward pass over the input text, recursing into `@IMPORT`ed
//! files. Directive lines are always replaced by a line of equal count so
//! that downstream line numbers in diagnostics line up with the original
//! input — `@ORG` is the one exception, since it lowers directly into a
//! pseudo-instruction line the parser consumes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::diag::{IoFailure, PreprocessorError, UaError};
use crate::ir::{Arch, Sys};

mod namespace;

pub use namespace::apply_namespace_prefix;

/// Reads source text given a path. `ua-cli` supplies a `std::fs`-backed
/// implementation; tests use an in-memory one so the preprocessor's
/// directive logic can be exercised without touching disk (spec.md §1:
/// "reading input files from disk" is an external collaborator).
pub trait SourceLoader {
    fn load(&self, path: &Path) -> std::io::Result<String>;
}

/// Configuration threaded through preprocessing: the selected target and
/// where the bundled `std_*`/`hw_*` library files live.
#[derive(Clone, Debug)]
pub struct PreprocessConfig {
    pub arch: Arch,
    pub sys: Sys,
    pub compiler_dir: PathBuf,
}

const MAX_IF_NESTING: u32 = 64;
const MAX_IMPORT_DEPTH: u32 = 32;
const MAX_IMPORTED_FILES: usize = 256;
const MAX_PATH_LEN: usize = 4096;

struct Ctx<'a, L: SourceLoader> {
    loader: &'a L,
    config: &'a PreprocessConfig,
    imported: HashSet<PathBuf>,
    import_count: usize,
}

/// Preprocess `main_path` (and everything it transitively imports) into a
/// single text the tokenizer/parser can consume.
pub fn preprocess<L: SourceLoader>(
    loader: &L,
    main_path: &Path,
    config: &PreprocessConfig,
) -> Result<String, UaError> {
    let mut ctx = Ctx {
        loader,
        config,
        imported: HashSet::new(),
        import_count: 0,
    };
    // Mark the main file as already-imported, guarding against self-@IMPORT.
    ctx.imported.insert(normalize_path(main_path));

    let mut deferred: Vec<String> = Vec::new();
    let main_text = ctx.process_file(main_path, 0, &mut deferred)?;

    let mut out = main_text;
    for chunk in deferred {
        out.push('\n');
        out.push_str(&chunk);
    }
    Ok(out)
}

impl<'a, L: SourceLoader> Ctx<'a, L> {
    fn process_file(
        &mut self,
        path: &Path,
        depth: u32,
        deferred: &mut Vec<String>,
    ) -> Result<String, UaError> {
        let source = self
            .loader
            .load(path)
            .map_err(|source| UaError::Io(IoFailure::Read {
                path: path.display().to_string(),
                source,
            }))?;
        self.process_text(&source, path, depth, deferred)
    }

    fn process_text(
        &mut self,
        source: &str,
        path: &Path,
        depth: u32,
        deferred: &mut Vec<String>,
    ) -> Result<String, UaError> {
        let dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut macros: HashMap<String, String> = HashMap::new();
        let mut out_lines: Vec<String> = Vec::new();
        let mut total: u32 = 0;
        let mut active: u32 = 0;
        let mut last_line = 0u32;

        for (idx, line) in source.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            last_line = line_no;
            let trimmed = line.trim_start();

            if let Some(rest) = trimmed.strip_prefix('@') {
                let currently_active = active == total;
                let (directive, args) = split_directive(rest);
                match directive.to_ascii_uppercase().as_str() {
                    "IF_ARCH" => {
                        total += 1;
                        if total > MAX_IF_NESTING {
                            return Err(UaError::Preprocessor(PreprocessorError::NestingOverflow {
                                max: MAX_IF_NESTING,
                                line: line_no,
                            }));
                        }
                        if currently_active && args.trim() == self.config.arch.name() {
                            active += 1;
                        }
                        out_lines.push(String::new());
                    }
                    "IF_SYS" => {
                        total += 1;
                        if total > MAX_IF_NESTING {
                            return Err(UaError::Preprocessor(PreprocessorError::NestingOverflow {
                                max: MAX_IF_NESTING,
                                line: line_no,
                            }));
                        }
                        if currently_active && args.trim() == self.config.sys.name() {
                            active += 1;
                        }
                        out_lines.push(String::new());
                    }
                    "ENDIF" => {
                        if total == 0 {
                            return Err(UaError::Preprocessor(PreprocessorError::UnterminatedIf {
                                line: line_no,
                            }));
                        }
                        if active == total {
                            active -= 1;
                        }
                        total -= 1;
                        out_lines.push(String::new());
                    }
                    "IMPORT" if currently_active => {
                        let imported_text =
                            self.handle_import(args.trim(), &dir, depth, line_no, deferred)?;
                        if let Some(inline) = imported_text {
                            out_lines.push(inline);
                        } else {
                            out_lines.push(String::new());
                        }
                    }
                    "IMPORT" => out_lines.push(String::new()),
                    "DEFINE" if currently_active => {
                        let mut parts = args.trim().splitn(2, char::is_whitespace);
                        let name = parts.next().unwrap_or("").trim().to_string();
                        let value = parts.next().unwrap_or("").trim().to_string();
                        if !name.is_empty() {
                            macros.insert(name, value);
                        }
                        out_lines.push(String::new());
                    }
                    "DEFINE" => out_lines.push(String::new()),
                    "ARCH_ONLY" if currently_active => {
                        let list: Vec<&str> = args.split(',').map(str::trim).collect();
                        if !list.iter().any(|a| *a == self.config.arch.name()) {
                            return Err(UaError::Preprocessor(PreprocessorError::ArchOnlyMismatch {
                                arch: self.config.arch.name().to_string(),
                                line: line_no,
                            }));
                        }
                        out_lines.push(String::new());
                    }
                    "ARCH_ONLY" => out_lines.push(String::new()),
                    "SYS_ONLY" if currently_active => {
                        let list: Vec<&str> = args.split(',').map(str::trim).collect();
                        if !list.iter().any(|s| *s == self.config.sys.name()) {
                            return Err(UaError::Preprocessor(PreprocessorError::SysOnlyMismatch {
                                sys: self.config.sys.name().to_string(),
                                line: line_no,
                            }));
                        }
                        out_lines.push(String::new());
                    }
                    "SYS_ONLY" => out_lines.push(String::new()),
                    "DUMMY" if currently_active => {
                        if args.trim().is_empty() {
                            log::warn!("@DUMMY at {}:{}", path.display(), line_no);
                        } else {
                            log::warn!("@DUMMY at {}:{}: {}", path.display(), line_no, args.trim());
                        }
                        out_lines.push(String::new());
                    }
                    "DUMMY" => out_lines.push(String::new()),
                    "ORG" if currently_active => {
                        out_lines.push(format!("ORG {}", args.trim()));
                    }
                    "ORG" => out_lines.push(String::new()),
                    other => {
                        if currently_active {
                            return Err(UaError::Preprocessor(PreprocessorError::UnknownDirective {
                                directive: other.to_string(),
                                line: line_no,
                            }));
                        }
                        out_lines.push(String::new());
                    }
                }
                continue;
            }

            if active == total {
                out_lines.push(namespace::substitute_macros(line, &macros));
            } else {
                out_lines.push(String::new());
            }
        }

        if total != 0 {
            return Err(UaError::Preprocessor(PreprocessorError::UnterminatedIf {
                line: last_line,
            }));
        }

        Ok(out_lines.join("\n"))
    }

    fn handle_import(
        &mut self,
        raw_path: &str,
        current_dir: &Path,
        depth: u32,
        line_no: u32,
        deferred: &mut Vec<String>,
    ) -> Result<Option<String>, UaError> {
        let raw_path = raw_path.trim_matches('"');
        if raw_path.len() > MAX_PATH_LEN {
            return Err(UaError::Preprocessor(PreprocessorError::PathTooLong {
                max: MAX_PATH_LEN,
                line: line_no,
            }));
        }

        let resolved = resolve_import_path(raw_path, current_dir, &self.config.compiler_dir);
        let normalized = normalize_path(&resolved);

        if self.imported.contains(&normalized) {
            log::info!("skipping already-imported `{}`", normalized.display());
            return Ok(None);
        }

        if depth + 1 > MAX_IMPORT_DEPTH {
            return Err(UaError::Preprocessor(PreprocessorError::ImportTooDeep {
                max: MAX_IMPORT_DEPTH,
                line: line_no,
            }));
        }
        self.import_count += 1;
        if self.import_count > MAX_IMPORTED_FILES {
            return Err(UaError::Preprocessor(PreprocessorError::TooManyImports {
                max: MAX_IMPORTED_FILES as u32,
                line: line_no,
            }));
        }
        self.imported.insert(normalized.clone());

        let mut nested_deferred = Vec::new();
        let body = self.process_file(&normalized, depth + 1, &mut nested_deferred)?;
        // Anything the imported file itself deferred bubbles up unprefixed
        // namespace handling: it was already namespaced when it was
        // collected, so just append it as-is.
        let mut body_with_nested = body;
        for chunk in nested_deferred {
            body_with_nested.push('\n');
            body_with_nested.push_str(&chunk);
        }

        let prefix = normalized
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "import".to_string());
        let namespaced = apply_namespace_prefix(&body_with_nested, &prefix);

        if depth == 0 {
            deferred.push(namespaced);
            Ok(None)
        } else {
            Ok(Some(namespaced))
        }
    }
}

fn split_directive(rest: &str) -> (&str, &str) {
    match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
        None => (rest, ""),
    }
}

fn resolve_import_path(raw: &str, current_dir: &Path, compiler_dir: &Path) -> PathBuf {
    let is_lib_style = (raw.starts_with("std_") || raw.starts_with("hw_"))
        && !raw.contains('/')
        && !raw.contains('\\');
    if is_lib_style {
        compiler_dir.join("lib").join(format!("{raw}.ua"))
    } else {
        current_dir.join(raw)
    }
}

/// Lexical path normalization (no filesystem access, so imports can be
/// resolved against in-memory test fixtures as well as real disk paths).
fn normalize_path(path: &Path) -> PathBuf {
    let mut stack: Vec<std::ffi::OsString> = Vec::new();
    for comp in path.components() {
        use std::path::Component::*;
        match comp {
            CurDir => {}
            ParentDir => {
                stack.pop();
            }
            other => stack.push(other.as_os_str().to_os_string()),
        }
    }
    stack.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    struct MemLoader(RefCell<StdHashMap<PathBuf, String>>);

    impl SourceLoader for MemLoader {
        fn load(&self, path: &Path) -> std::io::Result<String> {
            self.0
                .borrow()
                .get(&normalize_path(path))
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
    }

    fn loader(files: &[(&str, &str)]) -> MemLoader {
        let mut map = StdHashMap::new();
        for (p, c) in files {
            map.insert(normalize_path(Path::new(p)), c.to_string());
        }
        MemLoader(RefCell::new(map))
    }

    fn cfg() -> PreprocessConfig {
        PreprocessConfig {
            arch: Arch::X86,
            sys: Sys::Linux,
            compiler_dir: PathBuf::from("/compiler"),
        }
    }

    #[test]
    fn conditional_inclusion_keeps_matching_branch() {
        let l = loader(&[(
            "/src/a.ua",
            "@IF_ARCH x86\nLDI R0, 1\n@ENDIF\n@IF_ARCH arm\nLDI R0, 2\n@ENDIF\n",
        )]);
        let out = preprocess(&l, Path::new("/src/a.ua"), &cfg()).unwrap();
        assert!(out.contains("LDI R0, 1"));
        assert!(!out.contains("LDI R0, 2"));
    }

    #[test]
    fn unterminated_if_is_fatal() {
        let l = loader(&[("/src/a.ua", "@IF_ARCH x86\nLDI R0, 1\n")]);
        let err = preprocess(&l, Path::new("/src/a.ua"), &cfg());
        assert!(matches!(
            err,
            Err(UaError::Preprocessor(PreprocessorError::UnterminatedIf { .. }))
        ));
    }

    #[test]
    fn define_substitutes_whole_tokens_only() {
        let l = loader(&[(
            "/src/a.ua",
            "@DEFINE WIDTH 40\nLDI R0, WIDTH\nLDI R1, WIDTHX\n",
        )]);
        let out = preprocess(&l, Path::new("/src/a.ua"), &cfg()).unwrap();
        assert!(out.contains("LDI R0, 40"));
        assert!(out.contains("LDI R1, WIDTHX"));
    }

    #[test]
    fn import_once_only_is_idempotent() {
        let l = loader(&[
            ("/src/main.ua", "@IMPORT math.ua\n@IMPORT math.ua\nHLT\n"),
            ("/src/math.ua", "add:\nRET\n"),
        ]);
        let once = preprocess(&l, Path::new("/src/main.ua"), &cfg()).unwrap();
        let l2 = loader(&[
            ("/src/main.ua", "@IMPORT math.ua\nHLT\n"),
            ("/src/math.ua", "add:\nRET\n"),
        ]);
        let single = preprocess(&l2, Path::new("/src/main.ua"), &cfg()).unwrap();
        assert_eq!(once, single);
    }

    #[test]
    fn self_import_is_a_no_op() {
        let l = loader(&[("/src/main.ua", "@IMPORT main.ua\nHLT\n")]);
        let with_self = preprocess(&l, Path::new("/src/main.ua"), &cfg()).unwrap();
        let l2 = loader(&[("/src/main.ua", "HLT\n")]);
        let without = preprocess(&l2, Path::new("/src/main.ua"), &cfg()).unwrap();
        assert_eq!(with_self.trim(), without.trim());
    }

    #[test]
    fn import_namespaces_labels_and_variables() {
        let l = loader(&[
            ("/src/main.ua", "@IMPORT math.ua\nCALL add\nGET R0, total\nCALL other.add\nHLT\n"),
            ("/src/math.ua", "add:\nVAR total, 0\nRET\n"),
        ]);
        let out = preprocess(&l, Path::new("/src/main.ua"), &cfg()).unwrap();
        assert!(out.contains("CALL math.add"));
        assert!(out.contains("GET R0, math.total"));
        assert!(out.contains("CALL other.add"));
    }

    #[test]
    fn depth_zero_imports_land_after_the_main_program() {
        let l = loader(&[
            ("/src/main.ua", "@IMPORT math.ua\nNOP\nHLT\n"),
            ("/src/math.ua", "add:\nRET\n"),
        ]);
        let out = preprocess(&l, Path::new("/src/main.ua"), &cfg()).unwrap();
        let nop_idx = out.find("NOP").unwrap();
        let add_idx = out.find("math.add").unwrap();
        assert!(nop_idx < add_idx, "main body must precede deferred imports");
    }

    #[test]
    fn org_lowers_to_pseudo_instruction() {
        let l = loader(&[("/src/a.ua", "@ORG 0x8000\nHLT\n")]);
        let out = preprocess(&l, Path::new("/src/a.ua"), &cfg()).unwrap();
        assert!(out.lines().any(|l| l.trim() == "ORG 0x8000"));
    }

    #[test]
    fn arch_only_mismatch_is_fatal() {
        let l = loader(&[("/src/a.ua", "@ARCH_ONLY arm,riscv\nHLT\n")]);
        let err = preprocess(&l, Path::new("/src/a.ua"), &cfg());
        assert!(matches!(
            err,
            Err(UaError::Preprocessor(PreprocessorError::ArchOnlyMismatch { .. }))
        ));
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let l = loader(&[(
            "/src/a.ua",
            "@IF_ARCH x86\n@DEFINE N 4\nLDI R0, N\n@ENDIF\n",
        )]);
        let once = preprocess(&l, Path::new("/src/a.ua"), &cfg()).unwrap();
        let l2 = loader(&[("/src/a.ua", once.as_str())]);
        let twice = preprocess(&l2, Path::new("/src/a.ua"), &cfg()).unwrap();
        assert_eq!(once, twice);
    }
}
