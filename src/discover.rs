//! Source discovery.
//!
//! Walks a component's source tree, hides code that belongs to other
//! architectures, classifies what remains, and mirrors the directory layout
//! into the component's object tree so compile outputs have somewhere to land.
//!
//! Architecture sharding: a path segment named `arch` followed by a known
//! architecture name (`arch/aarch64/...`) is only visible to builds for that
//! architecture. Everything outside an `arch/<name>` segment is shared.

use std::fs;
use std::path::{Component as PathComponent, Path, PathBuf};

use walkdir::WalkDir;

use crate::arch::Arch;
use crate::config::layout::{BuildLayout, DELEGATED_DIR};
use crate::error::{BuildError, Result};

/// Top-level source trees a file can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Apps,
    Bootloader,
    Kernel,
    StandardLibrary,
}

impl Component {
    pub fn dir_name(self) -> &'static str {
        match self {
            Component::Apps => "apps",
            Component::Bootloader => "bootloader",
            Component::Kernel => "kernel",
            Component::StandardLibrary => "std",
        }
    }

    /// Extension of the component's systems-language sources.
    fn source_extension(self) -> &'static str {
        match self {
            Component::Bootloader => "c",
            Component::Apps | Component::Kernel | Component::StandardLibrary => "cpp",
        }
    }

    /// Suffix appended to the source file name to form its object name.
    pub fn object_suffix(self) -> &'static str {
        match self {
            Component::Kernel | Component::StandardLibrary => ".obj",
            Component::Apps | Component::Bootloader => ".o",
        }
    }

    /// Whether a `rust/` subdirectory is handed to the delegated backend.
    fn delegates_backend(self) -> bool {
        matches!(self, Component::Kernel)
    }
}

/// How a discovered source is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `.s`, compiled through the assembler front-end.
    GasAssembly,
    /// `.asm`, not part of this pipeline.
    NativeAssembly,
    /// `.cpp` (or `.c` for the bootloader).
    NativeSource,
    /// A subproject directory built by the secondary toolchain.
    DelegatedBackend,
    Unrecognized,
}

/// Classify a file by extension for the given component.
pub fn classify(path: &Path, component: Component) -> SourceKind {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("s") => SourceKind::GasAssembly,
        Some("asm") => SourceKind::NativeAssembly,
        Some(ext) if ext == component.source_extension() => SourceKind::NativeSource,
        _ => SourceKind::Unrecognized,
    }
}

/// A discovered source file or delegated subproject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the owning tree's source root.
    pub relative: PathBuf,
    pub kind: SourceKind,
    pub component: Component,
}

/// A component source root paired with its mirrored object root.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub component: Component,
    pub src: PathBuf,
    pub bin: PathBuf,
}

impl SourceTree {
    pub fn new(layout: &BuildLayout, component: Component) -> Self {
        Self {
            component,
            src: layout.component_src(component).to_path_buf(),
            bin: layout.component_bin(component),
        }
    }

    /// Object file produced for `file`: the mirrored path plus the object suffix.
    pub fn object_path(&self, file: &SourceFile) -> PathBuf {
        let mut name = self.bin.join(&file.relative).into_os_string();
        name.push(self.component.object_suffix());
        PathBuf::from(name)
    }
}

/// Whether `relative` is visible to a build for `arch`.
pub fn is_visible_for(relative: &Path, arch: Arch) -> bool {
    let segments: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            PathComponent::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    !segments.windows(2).any(|pair| {
        pair[0] == "arch" && Arch::from_dir_name(pair[1]).is_some_and(|other| other != arch)
    })
}

fn walk_error(root: &Path, err: walkdir::Error) -> BuildError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    BuildError::Io {
        path,
        source: err.into(),
    }
}

fn mirror_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))
}

/// Discover the sources under `root`, which must lie inside `tree.src`.
///
/// Files with unrecognized extensions are ignored; `.asm` files are returned
/// so the compile driver can count them. Every visible subdirectory under
/// `root`, and `root` itself, is mirrored below `tree.bin`.
pub fn discover(tree: &SourceTree, root: &Path, arch: Arch) -> Result<Vec<SourceFile>> {
    let root_rel = root.strip_prefix(&tree.src).map_err(|_| {
        BuildError::config(format!(
            "'{}' is not inside the {} tree '{}'",
            root.display(),
            tree.component.dir_name(),
            tree.src.display()
        ))
    })?;
    if !root.is_dir() {
        return Err(BuildError::config(format!(
            "{} source directory '{}' does not exist",
            tree.component.dir_name(),
            root.display()
        )));
    }
    if !is_visible_for(root_rel, arch) {
        return Ok(Vec::new());
    }
    mirror_dir(&tree.bin.join(root_rel))?;

    let relative_of = |path: &Path| -> PathBuf {
        path.strip_prefix(&tree.src)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut files = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| is_visible_for(&relative_of(entry.path()), arch));

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let relative = relative_of(entry.path());

        if entry.file_type().is_dir() {
            if tree.component.delegates_backend() && entry.file_name() == DELEGATED_DIR {
                files.push(SourceFile {
                    path: entry.path().to_path_buf(),
                    relative,
                    kind: SourceKind::DelegatedBackend,
                    component: tree.component,
                });
                walker.skip_current_dir();
                continue;
            }
            mirror_dir(&tree.bin.join(&relative))?;
            continue;
        }

        match classify(entry.path(), tree.component) {
            SourceKind::Unrecognized => {}
            kind => files.push(SourceFile {
                path: entry.path().to_path_buf(),
                relative,
                kind,
                component: tree.component,
            }),
        }
    }

    Ok(files)
}
