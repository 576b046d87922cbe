//! Link driver.
//!
//! Aggregates a component's artifacts into its final image. The kernel and
//! apps are ELF images linked with `ld.lld`; the bootloader is a PE/COFF UEFI
//! application linked with `lld-link`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::arch::ArchitectureProfile;
use crate::compile::{ArtifactKind, BuildArtifact};
use crate::config::{BuildLayout, ToolPaths};
use crate::error::{BuildError, Result};
use crate::process::{Cmd, ToolRunner};
use crate::verbose::dprintln;

pub const KERNEL_ENTRY: &str = "KernelMain";
pub const BOOTLOADER_ENTRY: &str = "EfiMain";
pub const APP_ENTRY: &str = "_start";

/// Final image to produce.
#[derive(Debug, Clone, Copy)]
pub enum LinkTarget<'s> {
    Bootloader,
    Kernel,
    /// One app, linked against the shared startup stub objects.
    App {
        name: &'s str,
        stub: &'s [BuildArtifact],
    },
}

impl LinkTarget<'_> {
    /// Component name used in progress output and errors.
    pub fn label(&self) -> &str {
        match self {
            LinkTarget::Bootloader => "bootloader",
            LinkTarget::Kernel => "kernel",
            LinkTarget::App { name, .. } => *name,
        }
    }
}

/// Links artifacts with the configured linkers.
pub struct LinkDriver<'a> {
    tools: &'a ToolPaths,
    layout: &'a BuildLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> LinkDriver<'a> {
    pub fn new(tools: &'a ToolPaths, layout: &'a BuildLayout, runner: &'a dyn ToolRunner) -> Self {
        Self {
            tools,
            layout,
            runner,
        }
    }

    /// Link `artifacts` into the image for `target`. Not retried on failure.
    pub fn link(
        &self,
        target: LinkTarget<'_>,
        artifacts: &[BuildArtifact],
        profile: &ArchitectureProfile,
    ) -> Result<BuildArtifact> {
        let (cmd, output) = self.command(target, artifacts, profile)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        dprintln!("[{}] linking {}", target.label(), output.display());
        let result = self.runner.run(&cmd)?;
        if !result.success() {
            return Err(BuildError::LinkFailed {
                component: target.label().to_string(),
                output,
                exit_code: result.code(),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        Ok(BuildArtifact {
            path: output,
            kind: ArtifactKind::Binary,
        })
    }

    fn command(
        &self,
        target: LinkTarget<'_>,
        artifacts: &[BuildArtifact],
        profile: &ArchitectureProfile,
    ) -> Result<(Cmd, PathBuf)> {
        let objects = artifacts.iter().map(|a| a.path.as_path());

        match target {
            LinkTarget::Bootloader => {
                let output = self.layout.efi_boot_dir().join(profile.bootloader_output);
                let cmd = Cmd::new(&self.tools.efi_ld)
                    .args([
                        "/subsystem:efi_application",
                        &format!("/entry:{BOOTLOADER_ENTRY}"),
                        "/dll",
                    ])
                    .arg(prefixed("/out:", &output))
                    .args(objects);
                Ok((cmd, output))
            }
            LinkTarget::Kernel => {
                let output = self.layout.kernel_image();
                let mut cmd = Cmd::new(&self.tools.ld)
                    .args(["-entry", KERNEL_ENTRY, "-z", "norelro", "-T"])
                    .arg(self.layout.kernel_dir.join(profile.linker_script))
                    .arg("--static");
                if profile.relocatable_kernel {
                    cmd = cmd.arg("--pie");
                }
                let cmd = cmd.arg("-o").arg(&output).args(objects);
                Ok((cmd, output))
            }
            LinkTarget::App { name, stub } => {
                if stub.is_empty() {
                    return Err(BuildError::config(format!(
                        "no app startup stub was built for {}; expected sources under apps/_link/arch/{}",
                        profile.arch, profile.arch
                    )));
                }
                let output = self.layout.app_image(name);
                let cmd = Cmd::new(&self.tools.ld)
                    .arg("-T")
                    .arg(self.layout.app_linker_script())
                    .arg("-o")
                    .arg(&output)
                    .args(stub.iter().map(|a| a.path.as_path()))
                    .args(objects)
                    .args(["-entry", APP_ENTRY]);
                Ok((cmd, output))
            }
        }
    }
}

fn prefixed(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path);
    arg
}
