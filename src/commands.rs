//! Housekeeping commands around a build: removing outputs and disassembling
//! the kernel image.

use std::fs;
use std::path::PathBuf;

use crate::config::{BuildLayout, ToolPaths};
use crate::error::{BuildError, Result};
use crate::process::{Cmd, ToolRunner};
use crate::verbose::dprintln;

/// Remove the build directory. Returns whether there was anything to remove.
pub fn clean(layout: &BuildLayout) -> Result<bool> {
    if !layout.build_dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(&layout.build_dir).map_err(|e| BuildError::io(&layout.build_dir, e))?;
    dprintln!("[clean] removed {}", layout.build_dir.display());
    Ok(true)
}

/// Disassemble the kernel image, interleaved with source, into
/// `build/kernel_dump.txt`.
pub fn dump(layout: &BuildLayout, tools: &ToolPaths, runner: &dyn ToolRunner) -> Result<PathBuf> {
    let image = layout.kernel_image();
    if !image.is_file() {
        return Err(BuildError::config(format!(
            "no kernel image at '{}'; build the kernel first",
            image.display()
        )));
    }

    let cmd = Cmd::new(&tools.objdump).args(["-d", "-S", "-C"]).arg(&image);
    let output = runner.run(&cmd)?;
    if !output.success() {
        return Err(BuildError::config(format!(
            "{} failed with exit code {}:\n{}",
            tools.objdump,
            output.code(),
            output.stderr
        )));
    }

    let path = layout.kernel_dump();
    fs::write(&path, output.stdout).map_err(|e| BuildError::io(&path, e))?;
    dprintln!("[dump] wrote {}", path.display());
    Ok(path)
}
