//! Preflight checks for build validation.
//!
//! Confirms that every external tool a build or emulator session needs can
//! be resolved before anything runs, so a missing compiler is reported up
//! front together with every other missing tool.
//!
//! # Example
//!
//! ```rust,no_run
//! use sylph_build::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("ld.lld") {
//!     println!("lld not installed");
//! }
//!
//! let tools = &[("clang++", "C++ compiler"), ("ld.lld", "ELF linker")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::arch::Arch;
use crate::config::{BuildLayout, ToolPaths};
use crate::error::{BuildError, Result};
use crate::pipeline::{BuildPlan, Package};

/// Check if a command resolves on the host, either as a path or via `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools a plan will invoke, as `(program, role)` pairs without duplicates.
///
/// The delegated backend toolchain is only required when the kernel tree
/// actually contains a backend subproject. Unconfigured (empty) programs are
/// kept once per role so each one can be reported.
pub fn required_tools<'t>(
    tools: &'t ToolPaths,
    layout: &BuildLayout,
    plan: &BuildPlan,
) -> Vec<(&'t str, &'static str)> {
    let mut required: Vec<(&str, &str)> = Vec::new();
    let mut add = |program: &'t str, role: &'static str| {
        let unset = program.trim().is_empty();
        if !required
            .iter()
            .any(|(p, r)| *p == program && (!unset || *r == role))
        {
            required.push((program, role));
        }
    };

    for package in plan.packages() {
        match package {
            Package::Apps => {
                add(tools.cxx.as_str(), "C++ compiler");
                add(tools.assembler.as_str(), "assembler");
                add(tools.ld.as_str(), "ELF linker");
            }
            Package::Bootloader => {
                add(tools.cc.as_str(), "C compiler");
                add(tools.assembler.as_str(), "assembler");
                add(tools.efi_ld.as_str(), "PE/EFI linker");
            }
            Package::Kernel => {
                add(tools.cxx.as_str(), "C++ compiler");
                add(tools.assembler.as_str(), "assembler");
                add(tools.ld.as_str(), "ELF linker");
                if layout.delegated_dir().is_dir() {
                    add(tools.cargo.as_str(), "delegated backend toolchain");
                }
            }
        }
    }
    required
}

/// Fails with every role in `tools` whose program is empty.
pub fn check_configured(tools: &[(&str, &str)]) -> Result<()> {
    let unset: Vec<&str> = tools
        .iter()
        .filter(|(program, _)| program.trim().is_empty())
        .map(|(_, role)| *role)
        .collect();
    if unset.is_empty() {
        return Ok(());
    }
    Err(BuildError::config(format!(
        "no tool path configured for: {}",
        unset.join(", ")
    )))
}

/// Tools an emulator session for `arch` will invoke. A clean session also
/// runs the USB image sync script.
pub fn session_tools(tools: &ToolPaths, arch: Arch, clean: bool) -> Vec<(&str, &'static str)> {
    let mut required = vec![(tools.emulator(arch), "emulator")];
    if clean {
        required.push((tools.shell.as_str(), "script shell"));
    }
    required
}

/// Check that specific tools are available.
///
/// Each tuple is `(program, role)`. Every missing tool is listed in the
/// returned error.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(program, _)| !command_exists(program))
        .map(|(program, role)| format!("  {program} ({role})"))
        .collect();

    if !missing.is_empty() {
        return Err(BuildError::config(format!(
            "Missing required host tools (install them or set their paths in sylph.toml):\n{}",
            missing.join("\n")
        )));
    }
    Ok(())
}

/// Check every tool `plan` needs.
pub fn check_build_tools(tools: &ToolPaths, layout: &BuildLayout, plan: &BuildPlan) -> Result<()> {
    check_required_tools(&required_tools(tools, layout, plan))
}

/// Check the emulator binary for `arch`, plus the script shell for clean runs.
pub fn check_emulator(tools: &ToolPaths, arch: Arch, clean: bool) -> Result<()> {
    let required = session_tools(tools, arch, clean);
    check_configured(&required)?;
    check_required_tools(&required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_command_exists() {
        // 'ls' should exist on any Unix system
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_reports_every_missing_tool() {
        let tools = &[
            ("ls", "coreutils"),
            ("nonexistent_compiler_xyz", "C++ compiler"),
            ("nonexistent_linker_xyz", "ELF linker"),
        ];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_compiler_xyz (C++ compiler)"));
        assert!(err.contains("nonexistent_linker_xyz (ELF linker)"));
        assert!(!err.contains("ls (coreutils)"));
    }

    #[test]
    fn bootloader_only_plan_needs_efi_linker_not_elf_linker() {
        let temp = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(temp.path());
        let tools = ToolPaths::default();
        let plan = BuildPlan::new(Arch::X86_64).with_packages([Package::Bootloader]);

        let programs: Vec<&str> = required_tools(&tools, &layout, &plan)
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(programs, vec!["clang", "lld-link"]);
    }

    #[test]
    fn unset_roles_are_each_reported() {
        let temp = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(temp.path());
        let tools = ToolPaths {
            cxx: String::new(),
            ld: String::new(),
            ..ToolPaths::default()
        };
        let plan = BuildPlan::new(Arch::X86_64);

        let err = check_configured(&required_tools(&tools, &layout, &plan))
            .unwrap_err()
            .to_string();
        assert!(err.contains("C++ compiler, ELF linker"), "{err}");
        assert_eq!(err.matches("C++ compiler").count(), 1);
    }

    #[test]
    fn clean_session_also_needs_the_script_shell() {
        let tools = ToolPaths::default();
        let programs = |clean| {
            session_tools(&tools, Arch::AArch64, clean)
                .into_iter()
                .map(|(p, _)| p)
                .collect::<Vec<_>>()
        };
        assert_eq!(programs(false), vec!["qemu-system-aarch64"]);
        assert_eq!(programs(true), vec!["qemu-system-aarch64", "sh"]);
    }

    #[test]
    fn cargo_required_only_with_backend_subproject() {
        let temp = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(temp.path());
        let tools = ToolPaths::default();
        let plan = BuildPlan::new(Arch::AArch64).with_packages([Package::Kernel]);

        let has_cargo = |layout: &BuildLayout| {
            required_tools(&tools, layout, &plan)
                .iter()
                .any(|(p, _)| *p == "cargo")
        };
        assert!(!has_cargo(&layout));
        fs::create_dir_all(layout.delegated_dir()).unwrap();
        assert!(has_cargo(&layout));
    }
}
