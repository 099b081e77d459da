//! Command-line surface (spec.md §6):
//! `ua <input.ua> -arch <arch> [-o <output>] [-sys <system>] [--run] [-v|--version]`
//!
//! clap's derive `Parser` has no way to declare a single-dash,
//! multi-character flag: `short`/`long` only ever produce `-x`/`--xyz`.
//! `-arch`/`-sys` are declared below as ordinary `long` flags (so `--arch`/
//! `--sys` already work), and [`normalize_args`] rewrites the single-dash
//! spelling to the double-dash one before clap ever sees it.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ua", version, disable_version_flag = true)]
pub struct Cli {
    /// Source file to assemble.
    pub input: Option<PathBuf>,

    /// Target architecture: mcs51, x86, x86_32 (ia32), arm, arm64 (aarch64), riscv (rv64).
    #[arg(long = "arch")]
    pub arch: Option<String>,

    /// Target system: baremetal (default), win32, linux, macos.
    #[arg(long = "sys")]
    pub sys: Option<String>,

    /// Output path. Defaults to `a.out`, rewritten to a format-appropriate
    /// extension when the image is wrapped in an executable container.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// JIT-execute the assembled image instead of writing a file. Only
    /// valid for `-arch x86`.
    #[arg(long)]
    pub run: bool,

    /// Print the version and the list of supported targets, then exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Rewrites `-arch`/`-sys` to `--arch`/`--sys` so clap's derive parser,
/// which only understands single-char short flags and double-dash long
/// ones, accepts the single-dash multi-character spelling spec.md §6
/// mandates. Every other argument passes through untouched.
pub fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    args.into_iter()
        .map(|arg| match arg.as_str() {
            "-arch" => "--arch".to_string(),
            "-sys" => "--sys".to_string(),
            _ => arg,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dash_arch_parses_as_the_arch_flag() {
        let cli = Cli::try_parse_from(normalize_args(args(&["ua", "f.ua", "-arch", "x86"]))).unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("f.ua")));
        assert_eq!(cli.arch.as_deref(), Some("x86"));
    }

    #[test]
    fn dash_sys_parses_as_the_sys_flag() {
        let cli = Cli::try_parse_from(normalize_args(args(&[
            "ua", "f.ua", "-arch", "x86", "-sys", "linux",
        ])))
        .unwrap();
        assert_eq!(cli.sys.as_deref(), Some("linux"));
    }

    #[test]
    fn double_dash_long_forms_still_work() {
        let cli = Cli::try_parse_from(normalize_args(args(&["ua", "f.ua", "--arch", "arm"]))).unwrap();
        assert_eq!(cli.arch.as_deref(), Some("arm"));
    }

    #[test]
    fn short_output_and_version_flags_are_unaffected() {
        let cli = Cli::try_parse_from(normalize_args(args(&[
            "ua", "f.ua", "-arch", "x86", "-o", "out.bin",
        ])))
        .unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("out.bin")));

        let cli = Cli::try_parse_from(normalize_args(args(&["ua", "-v"]))).unwrap();
        assert!(cli.version);
    }
}
