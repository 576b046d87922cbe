//! External tool invocation.
//!
//! Every compiler, assembler, linker and backend call goes through a [`Cmd`]
//! (an argument vector, never a shell string) and a [`ToolRunner`]. The
//! host runner resolves the program through `PATH`, runs it from the
//! repository root unless the command names another directory, and captures
//! both output streams.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{BuildError, Result};
use crate::verbose::vprintln;

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run from `dir` instead of the repository root.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Arguments as UTF-8, lossily converted.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Whether `first` is immediately followed by `second`.
    pub fn has_arg_pair(&self, first: &str, second: &str) -> bool {
        self.args
            .windows(2)
            .any(|pair| pair[0] == OsStr::new(first) && pair[1] == OsStr::new(second))
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == OsStr::new(arg))
    }

    /// A host process for this invocation, run from `default_dir` unless the
    /// command names its own directory.
    pub fn to_command(&self, default_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(self.current_dir.as_deref().unwrap_or(default_dir));
        command
    }

    /// Command line for display purposes.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured outcome of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Exit code 0 is the only success signal.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit code for reporting; `-1` if the process had none.
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Executes tool invocations and blocks until they exit.
///
/// `Err` means the tool could not be started at all; a tool that ran and
/// failed is an `Ok` with a non-zero exit code.
pub trait ToolRunner: Sync {
    fn run(&self, cmd: &Cmd) -> Result<ToolOutput>;
}

/// Runs tools on the host.
#[derive(Debug, Clone)]
pub struct HostRunner {
    root: PathBuf,
}

impl HostRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ToolRunner for HostRunner {
    fn run(&self, cmd: &Cmd) -> Result<ToolOutput> {
        let dir = cmd.get_current_dir().unwrap_or(&self.root);
        vprintln!("  $ {}", cmd.display());

        let output = cmd
            .to_command(&self.root)
            .output()
            .map_err(|e| launch_error(cmd, dir, e))?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn launch_error(cmd: &Cmd, dir: &Path, err: io::Error) -> BuildError {
    if err.kind() == io::ErrorKind::NotFound && dir.is_dir() {
        return BuildError::config(format!(
            "tool '{}' not found; install it or set its path in sylph.toml",
            cmd.program()
        ));
    }
    BuildError::config(format!(
        "failed to launch '{}' in '{}': {err}",
        cmd.program(),
        dir.display()
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    type FailWhen = Box<dyn Fn(&Cmd) -> bool + Send + Sync>;

    /// Records every invocation and fails the ones matching a predicate.
    pub(crate) struct ScriptedRunner {
        calls: Mutex<Vec<Cmd>>,
        fail_when: FailWhen,
    }

    impl ScriptedRunner {
        pub(crate) fn succeeding() -> Self {
            Self::failing_when(|_| false)
        }

        pub(crate) fn failing_when(pred: impl Fn(&Cmd) -> bool + Send + Sync + 'static) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_when: Box::new(pred),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Cmd> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn calls_to(&self, program: &str) -> Vec<Cmd> {
            self.calls()
                .into_iter()
                .filter(|c| c.program() == program)
                .collect()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, cmd: &Cmd) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(cmd.clone());
            if (self.fail_when)(cmd) {
                return Ok(ToolOutput {
                    exit_code: Some(1),
                    stdout: format!("{} output", cmd.program()),
                    stderr: "error: scripted failure".into(),
                });
            }
            Ok(ToolOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }
}
