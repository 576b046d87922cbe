use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::error::{BuildError, Result};

#[derive(Debug, Deserialize)]
struct ProjectJson {
    project: ProjectSection,
}

#[derive(Debug, Deserialize)]
struct ProjectSection {
    version: [u32; 4],
}

/// Version and date compiled into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStamp {
    /// Major, minor, patch, revision.
    pub version: [u32; 4],
    pub date: Date,
}

impl BuildStamp {
    /// Read the version from `project.json` and stamp it with today's UTC date.
    pub fn load(project_file: &Path) -> Result<Self> {
        Ok(Self {
            version: read_project_version(project_file)?,
            date: OffsetDateTime::now_utc().date(),
        })
    }

    /// Preprocessor definitions, without the `-D` prefix.
    pub fn defines(&self) -> Vec<String> {
        let [major, minor, patch, revision] = self.version;
        vec![
            format!("SYLPH_VERSION_MAJOR={major}"),
            format!("SYLPH_VERSION_MINOR={minor}"),
            format!("SYLPH_VERSION_PATCH={patch}"),
            format!("SYLPH_VERSION_REVISION={revision}"),
            format!("SYLPH_BUILD_DATE_YEAR={}", self.date.year()),
            format!("SYLPH_BUILD_DATE_MONTH={}", u8::from(self.date.month())),
            format!("SYLPH_BUILD_DATE_DAY={}", self.date.day()),
        ]
    }
}

pub fn read_project_version(project_file: &Path) -> Result<[u32; 4]> {
    let bytes = fs::read(project_file).map_err(|e| BuildError::io(project_file, e))?;
    let parsed: ProjectJson = serde_json::from_slice(&bytes).map_err(|e| {
        BuildError::config(format!(
            "parsing project metadata '{}': {e} (expected project.version as four integers)",
            project_file.display()
        ))
    })?;
    Ok(parsed.project.version)
}

#[derive(Debug, Deserialize)]
struct BackendManifest {
    package: Option<BackendPackage>,
    lib: Option<BackendLib>,
}

#[derive(Debug, Deserialize)]
struct BackendPackage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BackendLib {
    name: Option<String>,
}

/// Static archive the delegated backend produces for `triple`.
///
/// Follows Cargo's output convention:
/// `<dir>/target/<triple>/release/lib<crate>.a`, where the crate name comes
/// from `[lib].name` or else `[package].name` with dashes replaced.
pub fn backend_archive(backend_dir: &Path, triple: &str) -> Result<PathBuf> {
    let manifest_path = backend_dir.join("Cargo.toml");
    let text =
        fs::read_to_string(&manifest_path).map_err(|e| BuildError::io(&manifest_path, e))?;
    let manifest: BackendManifest = toml::from_str(&text).map_err(|e| {
        BuildError::config(format!("parsing '{}': {e}", manifest_path.display()))
    })?;

    let lib_name = manifest
        .lib
        .and_then(|lib| lib.name)
        .or_else(|| manifest.package.map(|pkg| pkg.name.replace('-', "_")))
        .ok_or_else(|| {
            BuildError::config(format!(
                "'{}' declares neither [lib].name nor [package].name",
                manifest_path.display()
            ))
        })?;

    Ok(backend_dir
        .join("target")
        .join(triple)
        .join("release")
        .join(format!("lib{lib_name}.a")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn stamp_defines_cover_version_and_date() {
        let stamp = BuildStamp {
            version: [1, 2, 3, 4],
            date: Date::from_calendar_date(2025, Month::March, 7).unwrap(),
        };
        assert_eq!(
            stamp.defines(),
            vec![
                "SYLPH_VERSION_MAJOR=1",
                "SYLPH_VERSION_MINOR=2",
                "SYLPH_VERSION_PATCH=3",
                "SYLPH_VERSION_REVISION=4",
                "SYLPH_BUILD_DATE_YEAR=2025",
                "SYLPH_BUILD_DATE_MONTH=3",
                "SYLPH_BUILD_DATE_DAY=7",
            ]
        );
    }

    #[test]
    fn project_version_is_read_from_json() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("project.json");
        fs::write(&path, r#"{"project": {"name": "Sylphia-OS", "version": [0, 3, 1, 12]}}"#)
            .unwrap();
        assert_eq!(read_project_version(&path).unwrap(), [0, 3, 1, 12]);
    }

    #[test]
    fn short_version_array_is_configuration_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("project.json");
        fs::write(&path, r#"{"project": {"version": [0, 3]}}"#).unwrap();
        assert!(matches!(
            read_project_version(&path),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn missing_project_file_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_project_version(&temp.path().join("project.json")),
            Err(BuildError::Io { .. })
        ));
    }

    #[test]
    fn backend_archive_uses_package_name() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"sylphia-rust\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        let archive = backend_archive(temp.path(), "x86_64-unknown-none").unwrap();
        assert_eq!(
            archive,
            temp.path()
                .join("target/x86_64-unknown-none/release/libsylphia_rust.a")
        );
    }

    #[test]
    fn backend_archive_prefers_lib_name() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"kernel-ffi\"\n\n[lib]\nname = \"kffi\"\ncrate-type = [\"staticlib\"]\n",
        )
        .unwrap();
        let archive = backend_archive(temp.path(), "aarch64-unknown-none").unwrap();
        assert!(archive.ends_with("target/aarch64-unknown-none/release/libkffi.a"));
    }
}
