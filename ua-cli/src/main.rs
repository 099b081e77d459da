//! `ua`: the command-line front end (spec.md §6). Parses arguments, runs
//! the pipeline (preprocess -> parse -> compliance gate -> assemble), and
//! either JIT-executes the result (`-arch x86 --run`) or writes it out,
//! wrapped in a PE/ELF/Mach-O container when the target/system combination
//! calls for one.

mod cli;
mod hexdump;
mod wrap;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use ua_core::diag::UaError;
use ua_core::ir::{Arch, Sys};
use ua_core::preprocess::{self, PreprocessConfig, SourceLoader};
use ua_core::{compliance, parse};
use ua_targets::{Arm64Emitter, ArmEmitter, Mcs51Emitter, RiscvEmitter, X86Emitter, X86_32Emitter};

const TARGETS: &[&str] = &["mcs51", "x86", "x86_32", "arm", "arm64", "riscv"];

struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Where the bundled `std_*`/`hw_*` library files live: next to the `ua`
/// binary itself, under `lib/`, mirroring a standard toolchain layout.
fn compiler_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_version() {
    println!("ua {}", env!("CARGO_PKG_VERSION"));
    println!("targets: {}", TARGETS.join(", "));
}

/// Output mode selected per spec.md §6's arch x sys x --run table.
enum OutputMode {
    Jit,
    Raw,
    Elf,
    Macho,
    Pe,
}

fn output_mode(arch: Arch, sys: Sys, run: bool) -> OutputMode {
    if run {
        return OutputMode::Jit;
    }
    match (arch, sys) {
        (Arch::Mcs51, _) => OutputMode::Raw,
        (Arch::X86, Sys::Win32) => OutputMode::Pe,
        (Arch::X86, Sys::Linux) => OutputMode::Elf,
        (Arch::X86_32, Sys::Win32) => OutputMode::Pe,
        (Arch::X86_32, Sys::Linux) => OutputMode::Elf,
        (Arch::Arm, Sys::Linux) => OutputMode::Elf,
        (Arch::Arm64, Sys::Linux) => OutputMode::Elf,
        (Arch::Arm64, Sys::Macos) => OutputMode::Macho,
        (Arch::Riscv, Sys::Linux) => OutputMode::Elf,
        _ => OutputMode::Raw,
    }
}

fn default_extension(mode: &OutputMode) -> Option<&'static str> {
    match mode {
        OutputMode::Elf => Some("elf"),
        OutputMode::Macho => Some("macho"),
        OutputMode::Pe => Some("exe"),
        OutputMode::Raw | OutputMode::Jit => None,
    }
}

fn resolve_output_path(requested: Option<PathBuf>, mode: &OutputMode) -> PathBuf {
    match requested {
        Some(path) => path,
        None => match default_extension(mode) {
            Some(ext) => PathBuf::from("a.out").with_extension(ext),
            None => PathBuf::from("a.out"),
        },
    }
}

fn print_banners(err: &UaError, file: &str) {
    for banner in err.banners(file) {
        eprintln!("{banner}");
    }
}

fn run() -> Result<(), ()> {
    let args = cli::Cli::parse_from(cli::normalize_args(std::env::args()));

    if args.version {
        print_version();
        return Ok(());
    }

    let Some(input) = args.input.clone() else {
        eprintln!("error: missing required argument <input.ua>");
        return Err(());
    };
    let Some(arch_flag) = args.arch.as_deref() else {
        eprintln!("error: missing required argument -arch <target>");
        return Err(());
    };
    let Some(arch) = Arch::from_flag(arch_flag) else {
        eprintln!("error: unknown target architecture `{arch_flag}`");
        return Err(());
    };
    let sys = match args.sys.as_deref() {
        Some(flag) => match Sys::from_flag(flag) {
            Some(sys) => sys,
            None => {
                eprintln!("error: unknown target system `{flag}`");
                return Err(());
            }
        },
        None => Sys::Baremetal,
    };
    if args.run && arch != Arch::X86 {
        eprintln!("error: --run is only supported for -arch x86");
        return Err(());
    }

    let file_label = input.display().to_string();
    let config = PreprocessConfig {
        arch,
        sys,
        compiler_dir: compiler_dir(),
    };

    let text = match preprocess::preprocess(&FsLoader, &input, &config) {
        Ok(text) => text,
        Err(err) => {
            print_banners(&err, &file_label);
            return Err(());
        }
    };

    let ir = match parse::parse(&text) {
        Ok(ir) => ir,
        Err(err) => {
            print_banners(&err, &file_label);
            return Err(());
        }
    };

    if let Err(err) = compliance::gate(&ir, arch, sys) {
        print_banners(&err, &file_label);
        return Err(());
    }

    let emitter: Box<dyn ua_core::emitter::Emitter> = match arch {
        Arch::Mcs51 => Box::new(Mcs51Emitter),
        Arch::X86 => Box::new(X86Emitter::new()),
        Arch::X86_32 => Box::new(X86_32Emitter),
        Arch::Arm => Box::new(ArmEmitter),
        Arch::Arm64 => Box::new(Arm64Emitter),
        Arch::Riscv => Box::new(RiscvEmitter),
    };

    let image = match emitter.assemble(&ir) {
        Ok(image) => image,
        Err(err) => {
            print_banners(&err, &file_label);
            return Err(());
        }
    };

    let mode = output_mode(arch, sys, args.run);
    match mode {
        OutputMode::Jit => {
            let result = unsafe { ua_core::jit::run(image.code.as_slice()) };
            match result {
                Ok(value) => {
                    println!("{value}");
                    Ok(())
                }
                Err(err) => {
                    print_banners(&err, &file_label);
                    Err(())
                }
            }
        }
        other => {
            let out_path = resolve_output_path(args.output.clone(), &other);
            let result = match other {
                OutputMode::Raw => std::fs::write(&out_path, image.code.as_slice()).map_err(|source| {
                    UaError::Io(ua_core::diag::IoFailure::Write {
                        path: out_path.display().to_string(),
                        source,
                    })
                }),
                OutputMode::Elf => wrap::elf::write(&out_path, image.code.as_slice(), arch),
                OutputMode::Macho => wrap::macho::write(&out_path, image.code.as_slice()),
                OutputMode::Pe => wrap::pe::write(&out_path, image.code.as_slice(), arch),
                OutputMode::Jit => unreachable!(),
            };
            match result {
                Ok(()) => {
                    log::info!("wrote {}", out_path.display());
                    print!("{}", hexdump::dump(image.code.as_slice()));
                    Ok(())
                }
                Err(err) => {
                    print_banners(&err, &file_label);
                    Err(())
                }
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}
