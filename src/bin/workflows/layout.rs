use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sylph_build::config::layout::PROJECT_FILE;

/// The explicit root if given, else the nearest ancestor of the current
/// directory holding `project.json`.
pub(crate) fn locate_repo_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        if !root.join(PROJECT_FILE).is_file() {
            bail!("'{}' has no {PROJECT_FILE}", root.display());
        }
        return Ok(root.to_path_buf());
    }

    let cwd = env::current_dir().context("reading current directory")?;
    for candidate in cwd.ancestors() {
        if candidate.join(PROJECT_FILE).is_file() {
            return Ok(candidate.to_path_buf());
        }
    }
    bail!(
        "unable to locate repository root from '{}'; expected an ancestor containing {PROJECT_FILE} (or pass --root)",
        cwd.display()
    )
}
