//! Build orchestration for Sylphia-OS.
//!
//! Builds the three parts of the system for one target architecture and
//! boots the result under an emulator:
//!
//! - **Apps** - userspace programs, each linked against a shared startup stub
//! - **Bootloader** - a UEFI application (`EFI/BOOT/BOOT*.EFI`)
//! - **Kernel** - kernel and standard-library sources plus the delegated
//!   backend archive, linked into `kernel.elf`
//!
//! # Architecture
//!
//! ```text
//! sylph-build (binary)
//!     │
//!     └── build() ──> Pipeline ── apps → bootloader → kernel
//!                        │
//!                        ├── discover   (arch-sharded source trees)
//!                        ├── CompileDriver ─┐
//!                        └── LinkDriver   ──┴── ToolRunner (clang, ld.lld, lld-link, cargo)
//! ```
//!
//! Every external tool runs through a [`process::ToolRunner`], so the whole
//! pipeline can be driven by a scripted runner in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sylph_build::Package;
//!
//! let report = sylph_build::build(
//!     Path::new("."),
//!     "x86_64",
//!     &[Package::Kernel],
//!     &["DEBUG_BUILD".to_string()],
//!     &[],
//!     1,
//! )?;
//! for output in &report.outputs {
//!     println!("{}", output.path.display());
//! }
//! # Ok::<(), sylph_build::BuildError>(())
//! ```

pub mod arch;
pub mod commands;
pub mod compile;
pub mod config;
pub mod discover;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod qemu;
pub mod verbose;

use std::path::Path;

pub use arch::{profile_for, Arch, ArchitectureProfile};
pub use compile::{ArtifactKind, BuildArtifact};
pub use config::{BuildConfig, BuildLayout, ToolPaths};
pub use error::{BuildError, Result};
pub use pipeline::{BuildPlan, BuildReport, Package, Pipeline, PipelineState};
pub use process::HostRunner;

/// Build `components` (all of them when empty) for `arch_id` in the
/// repository at `repo_root`.
///
/// Tool paths come from `sylph.toml` when present. `app_filter` restricts the
/// apps build to the named apps; `jobs` is the number of concurrent compiles
/// per component (`0` for one per CPU).
pub fn build(
    repo_root: &Path,
    arch_id: &str,
    components: &[Package],
    features: &[String],
    app_filter: &[String],
    jobs: usize,
) -> Result<BuildReport> {
    let arch = Arch::parse(arch_id)?;
    let layout = BuildLayout::new(repo_root);
    let config = BuildConfig::load(&layout.config_file())?;
    let runner = HostRunner::new(repo_root);

    let plan = BuildPlan::new(arch)
        .with_packages(components.iter().copied())
        .with_features(features.iter().cloned())
        .with_apps(app_filter.iter().cloned());

    Pipeline::new(&layout, &config.tools, &runner)
        .with_jobs(jobs)
        .run(&plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_architecture_is_rejected_before_touching_the_tree() {
        let temp = tempfile::tempdir().unwrap();
        let err = build(temp.path(), "sparc64", &[], &[], &[], 1).unwrap_err();
        assert!(matches!(err, BuildError::UnknownArchitecture(ref id) if id == "sparc64"));
        assert!(!temp.path().join("build").exists());
    }
}
