//! Command-line interface definitions for sylph-build.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sylph_build::qemu::DEFAULT_TIMEOUT_SECS;

/// Sylphia-OS build tool.
#[derive(Parser)]
#[command(name = "sylph-build", version, about)]
pub(crate) struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Repository root (default: nearest ancestor containing project.json).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Show only errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Echo every external command before it runs.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Compile and link apps, bootloader and kernel.
    Build(BuildArgs),
    /// Remove the build directory.
    Clean,
    /// Disassemble the kernel image into build/kernel_dump.txt.
    Dump,
    /// Boot the built image in the emulator with an interactive monitor.
    Run(RunArgs),
    /// Boot the built image with serial output and a timeout.
    Test(TestArgs),
}

/// Arguments for the `build` subcommand.
#[derive(Parser)]
pub(crate) struct BuildArgs {
    /// Target architecture (x86_64|x64, aarch64|arm64, riscv64|riscv).
    #[arg(long, short = 't', default_value = "x86_64")]
    pub target: String,

    /// Comma-separated packages to build: app, bootloader, kernel (default: all).
    #[arg(long, short = 'p')]
    pub package: Option<String>,

    /// Comma-separated app names (default: every app).
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Comma-separated feature flags, each passed as -D<FLAG>.
    #[arg(long, short = 'f')]
    pub flags: Option<String>,

    /// Concurrent compiles per component (0 = one per CPU).
    #[arg(long, short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Skip the host tool check before building.
    #[arg(long)]
    pub skip_preflight: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Parser)]
pub(crate) struct RunArgs {
    /// Target architecture.
    #[arg(long, short = 't', default_value = "x86_64")]
    pub target: String,

    /// Recreate the NVMe image and resync the USB image before booting.
    #[arg(long)]
    pub clean: bool,
}

/// Arguments for the `test` subcommand.
#[derive(Parser)]
pub(crate) struct TestArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Seconds before the emulator is killed.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}
