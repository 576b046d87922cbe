//! Error types for the build engine.
//!
//! Every variant is fatal to the `build()` call that produced it. Nothing is
//! retried and nothing is downgraded to a warning.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while planning, compiling or linking.
#[derive(Debug)]
pub enum BuildError {
    /// The architecture identifier is not one of the supported set.
    UnknownArchitecture(String),
    /// A compiler, assembler or delegated backend exited non-zero.
    CompilationFailed {
        component: String,
        file: PathBuf,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The linker exited non-zero.
    LinkFailed {
        component: String,
        output: PathBuf,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// A required tool, profile field or project setting is missing or invalid.
    Configuration(String),
    /// Filesystem access failed.
    Io { path: PathBuf, source: io::Error },
}

impl BuildError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Name of the component the failure is attributed to, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::CompilationFailed { component, .. } | Self::LinkFailed { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }
}

fn write_captured(f: &mut fmt::Formatter<'_>, stdout: &str, stderr: &str) -> fmt::Result {
    write!(f, "\n\nCommand output:\n{stdout}")?;
    if !stdout.ends_with('\n') && !stdout.is_empty() {
        writeln!(f)?;
    }
    write!(f, "{stderr}")
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArchitecture(arch) => write!(
                f,
                "unknown architecture '{arch}'; supported: x86_64, aarch64, riscv64"
            ),
            Self::CompilationFailed {
                component,
                file,
                exit_code,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "[ERROR] Build failed in: {component}\n  {} exited with code {exit_code}",
                    file.display()
                )?;
                write_captured(f, stdout, stderr)
            }
            Self::LinkFailed {
                component,
                output,
                exit_code,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "[ERROR] Build failed in: {component}\n  linking {} exited with code {exit_code}",
                    output.display()
                )?;
                write_captured(f, stdout, stderr)
            }
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Io { path, source } => write!(f, "I/O error on '{}': {source}", path.display()),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compilation_failure_surfaces_output_verbatim() {
        let err = BuildError::CompilationFailed {
            component: "kernel".into(),
            file: PathBuf::from("kernel/main.cpp"),
            exit_code: 1,
            stdout: "main.cpp:3: note".into(),
            stderr: "main.cpp:4: error: expected ';'\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Build failed in: kernel"));
        assert!(msg.contains("main.cpp:3: note\n"));
        assert!(msg.contains("main.cpp:4: error: expected ';'"));
        assert_eq!(err.component(), Some("kernel"));
    }

    #[test]
    fn unknown_architecture_names_supported_set() {
        let msg = BuildError::UnknownArchitecture("mips".into()).to_string();
        assert!(msg.contains("'mips'"));
        assert!(msg.contains("riscv64"));
    }
}
