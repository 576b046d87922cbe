//! Compilation driver.
//!
//! Turns discovered sources into object files (or, for the delegated
//! backend, a static archive) by dispatching each one to the matching
//! external tool. The first tool that exits non-zero aborts the whole call.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::arch::ArchitectureProfile;
use crate::config::project::backend_archive;
use crate::config::{BuildLayout, BuildStamp, ToolPaths};
use crate::discover::{Component, SourceFile, SourceKind, SourceTree};
use crate::error::{BuildError, Result};
use crate::process::{Cmd, ToolOutput, ToolRunner};
use crate::verbose::{vprintln, Progress};

const FREESTANDING_FLAGS: &[&str] = &["-ffreestanding", "-fno-rtti", "-fno-exceptions"];
const BOOTLOADER_FLAGS: &[&str] = &["-fno-stack-protector", "-fshort-wchar"];
const OPT_FLAGS: &[&str] = &["-O2", "-Wall"];

/// What a build step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Object,
    StaticArchive,
    /// A linked image: kernel, bootloader or app.
    Binary,
}

/// A file produced by compiling, delegating or linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl BuildArtifact {
    pub fn object(path: PathBuf) -> Self {
        Self {
            path,
            kind: ArtifactKind::Object,
        }
    }
}

/// Per-build inputs shared by every file of a compile run.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub profile: &'a ArchitectureProfile,
    /// Feature flags, each passed as `-D<flag>`.
    pub features: &'a [String],
    /// Version/date definitions; required when compiling kernel sources.
    pub stamp: Option<&'a BuildStamp>,
}

enum Step {
    Skip,
    Run { cmd: Cmd, artifact: BuildArtifact },
}

/// Compiles sources with the configured toolchain.
pub struct CompileDriver<'a> {
    tools: &'a ToolPaths,
    layout: &'a BuildLayout,
    runner: &'a dyn ToolRunner,
    jobs: usize,
}

impl<'a> CompileDriver<'a> {
    pub fn new(tools: &'a ToolPaths, layout: &'a BuildLayout, runner: &'a dyn ToolRunner) -> Self {
        Self {
            tools,
            layout,
            runner,
            jobs: 1,
        }
    }

    /// Number of concurrent tool invocations; `0` means one per CPU.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = if jobs == 0 { default_jobs() } else { jobs };
        self
    }

    /// Compile `files`, returning one artifact per built file in input order.
    ///
    /// `label` names the component in progress output and errors. With a
    /// single worker (the default) files after the first failing one are
    /// never started.
    pub fn compile(
        &self,
        label: &str,
        files: &[SourceFile],
        ctx: &CompileContext<'_>,
    ) -> Result<Vec<BuildArtifact>> {
        let steps = files
            .iter()
            .map(|file| self.plan(file, ctx))
            .collect::<Result<Vec<_>>>()?;

        if self.jobs > 1 && files.len() > 1 {
            return self.run_parallel(label, files, &steps);
        }

        let mut progress = Progress::new(label, files.len());
        let mut artifacts = Vec::new();
        for (file, step) in files.iter().zip(steps) {
            match step {
                Step::Skip => progress.advance(&file.path, true),
                Step::Run { cmd, artifact } => {
                    let output = self.runner.run(&cmd)?;
                    if !output.success() {
                        return Err(compile_failed(label, file, output));
                    }
                    artifacts.push(artifact);
                    progress.advance(&file.path, false);
                }
            }
        }
        Ok(artifacts)
    }

    /// Work-sharing variant of [`Self::compile`].
    ///
    /// Files are handed out in input order and no new file starts once a
    /// failure has been seen, so every file before a started one was started
    /// too and the lowest-index failure is the earliest one.
    fn run_parallel(
        &self,
        label: &str,
        files: &[SourceFile],
        steps: &[Step],
    ) -> Result<Vec<BuildArtifact>> {
        let workers = self.jobs.min(files.len());
        vprintln!("[{label}] compiling with {workers} workers");

        let progress = Mutex::new(Progress::new(label, files.len()));
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let outcomes: Mutex<Vec<Option<Result<Option<BuildArtifact>>>>> =
            Mutex::new((0..files.len()).map(|_| None).collect());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    if idx >= files.len() {
                        break;
                    }
                    let file = &files[idx];
                    let outcome = match &steps[idx] {
                        Step::Skip => Ok(None),
                        Step::Run { cmd, artifact } => match self.runner.run(cmd) {
                            Ok(output) if output.success() => Ok(Some(artifact.clone())),
                            Ok(output) => Err(compile_failed(label, file, output)),
                            Err(e) => Err(e),
                        },
                    };
                    match &outcome {
                        Ok(built) => progress
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .advance(&file.path, built.is_none()),
                        Err(_) => stop.store(true, Ordering::SeqCst),
                    }
                    outcomes.lock().unwrap_or_else(PoisonError::into_inner)[idx] = Some(outcome);
                });
            }
        });

        let mut artifacts = Vec::new();
        for outcome in outcomes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
        {
            if let Some(artifact) = outcome? {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    fn plan(&self, file: &SourceFile, ctx: &CompileContext<'_>) -> Result<Step> {
        let profile = ctx.profile;
        let object = || SourceTree::new(self.layout, file.component).object_path(file);

        let step = match file.kind {
            SourceKind::NativeAssembly | SourceKind::Unrecognized => Step::Skip,
            SourceKind::GasAssembly => {
                let obj = object();
                let triple = match file.component {
                    Component::Bootloader => profile.bootloader_triple,
                    _ => profile.kernel_triple,
                };
                let cmd = Cmd::new(&self.tools.assembler)
                    .args(["-target", triple, "-c"])
                    .arg(&file.path)
                    .arg("-o")
                    .arg(&obj);
                Step::Run {
                    cmd,
                    artifact: BuildArtifact::object(obj),
                }
            }
            SourceKind::NativeSource => {
                let obj = object();
                let cmd = self
                    .native_command(file, ctx)?
                    .arg("-c")
                    .arg(&file.path)
                    .arg("-o")
                    .arg(&obj);
                Step::Run {
                    cmd,
                    artifact: BuildArtifact::object(obj),
                }
            }
            SourceKind::DelegatedBackend => {
                let archive = backend_archive(&file.path, profile.backend_triple)?;
                let cmd = Cmd::new(&self.tools.cargo)
                    .args(["build", "--release", "--target", profile.backend_triple])
                    .current_dir(&file.path);
                Step::Run {
                    cmd,
                    artifact: BuildArtifact {
                        path: archive,
                        kind: ArtifactKind::StaticArchive,
                    },
                }
            }
        };
        Ok(step)
    }

    /// Compiler, target and flags for a systems-language source, up to but
    /// excluding the input and output arguments.
    fn native_command(&self, file: &SourceFile, ctx: &CompileContext<'_>) -> Result<Cmd> {
        let profile = ctx.profile;
        let defines = ctx.features.iter().map(|flag| format!("-D{flag}"));

        let cmd = match file.component {
            Component::Bootloader => {
                let mut cmd =
                    Cmd::new(&self.tools.cc).args(["-target", profile.bootloader_triple]);
                if profile.bootloader_no_red_zone {
                    cmd = cmd.arg("-mno-red-zone");
                }
                cmd.args(BOOTLOADER_FLAGS).args(defines)
            }
            Component::Apps => Cmd::new(&self.tools.cxx)
                .args(["-target", profile.kernel_triple])
                .args(FREESTANDING_FLAGS)
                .arg(include_flag(&self.layout.apps_dir))
                .args(OPT_FLAGS)
                .args(profile.extra_cflags)
                .args(defines),
            Component::Kernel | Component::StandardLibrary => {
                let stamp = match (file.component, ctx.stamp) {
                    (_, Some(stamp)) => stamp.defines(),
                    (Component::Kernel, None) => {
                        return Err(BuildError::config(
                            "kernel sources need version and build-date definitions",
                        ))
                    }
                    (_, None) => Vec::new(),
                };
                Cmd::new(&self.tools.cxx)
                    .args(["-target", profile.kernel_triple])
                    .args(FREESTANDING_FLAGS)
                    .arg("-I.")
                    .arg(include_flag(&self.layout.kernel_dir))
                    .args(OPT_FLAGS)
                    .args(stamp.iter().map(|d| format!("-D{d}")))
                    .args(profile.extra_cflags)
                    .args(defines)
            }
        };
        Ok(cmd)
    }
}

fn include_flag(dir: &Path) -> OsString {
    let mut flag = OsString::from("-I");
    flag.push(dir);
    flag
}

fn compile_failed(label: &str, file: &SourceFile, output: ToolOutput) -> BuildError {
    BuildError::CompilationFailed {
        component: label.to_string(),
        file: file.path.clone(),
        exit_code: output.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

fn default_jobs() -> usize {
    match thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            eprintln!("  [WARN] Could not detect CPU count ({e}), using 4 workers");
            4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::discover::discover;
    use crate::process::testing::ScriptedRunner;
    use std::fs;
    use time::{Date, Month};

    fn stamp() -> BuildStamp {
        BuildStamp {
            version: [0, 1, 0, 0],
            date: Date::from_calendar_date(2025, Month::January, 2).unwrap(),
        }
    }

    fn source(layout: &BuildLayout, component: Component, rel: &str, kind: SourceKind) -> SourceFile {
        SourceFile {
            path: layout.component_src(component).join(rel),
            relative: PathBuf::from(rel),
            kind,
            component,
        }
    }

    fn kernel_sources(layout: &BuildLayout, n: usize) -> Vec<SourceFile> {
        (1..=n)
            .map(|i| {
                source(
                    layout,
                    Component::Kernel,
                    &format!("file{i}.cpp"),
                    SourceKind::NativeSource,
                )
            })
            .collect()
    }

    fn source_arg(cmd: &Cmd) -> String {
        cmd.args_lossy()
            .into_iter()
            .find(|a| a.ends_with(".cpp"))
            .unwrap_or_default()
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = kernel_sources(&layout, 6);
        let runner = ScriptedRunner::failing_when(|cmd| source_arg(cmd).ends_with("file3.cpp"));
        let stamp = stamp();
        let ctx = CompileContext {
            profile: Arch::X86_64.profile(),
            features: &[],
            stamp: Some(&stamp),
        };

        let err = CompileDriver::new(&tools, &layout, &runner)
            .compile("kernel", &files, &ctx)
            .unwrap_err();

        match err {
            BuildError::CompilationFailed {
                component,
                file,
                exit_code,
                stderr,
                ..
            } => {
                assert_eq!(component, "kernel");
                assert_eq!(file, files[2].path);
                assert_eq!(exit_code, 1);
                assert!(stderr.contains("scripted failure"));
            }
            other => panic!("expected CompilationFailed, got {other:?}"),
        }
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| !source_arg(c).ends_with("file4.cpp")));
    }

    #[test]
    fn parallel_run_reports_earliest_failure_and_no_artifacts() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = kernel_sources(&layout, 12);
        let runner = ScriptedRunner::failing_when(|cmd| {
            let f = source_arg(cmd);
            f.ends_with("file5.cpp") || f.ends_with("file9.cpp")
        });
        let stamp = stamp();
        let ctx = CompileContext {
            profile: Arch::X86_64.profile(),
            features: &[],
            stamp: Some(&stamp),
        };

        let err = CompileDriver::new(&tools, &layout, &runner)
            .with_jobs(4)
            .compile("kernel", &files, &ctx)
            .unwrap_err();
        match err {
            BuildError::CompilationFailed { file, .. } => assert_eq!(file, files[4].path),
            other => panic!("expected CompilationFailed, got {other:?}"),
        }
        for i in 0..5 {
            let name = format!("file{}.cpp", i + 1);
            assert!(runner
                .calls()
                .iter()
                .any(|c| source_arg(c).ends_with(&name)));
        }
    }

    #[test]
    fn parallel_run_keeps_input_order() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = kernel_sources(&layout, 8);
        let runner = ScriptedRunner::succeeding();
        let stamp = stamp();
        let ctx = CompileContext {
            profile: Arch::X86_64.profile(),
            features: &[],
            stamp: Some(&stamp),
        };

        let artifacts = CompileDriver::new(&tools, &layout, &runner)
            .with_jobs(3)
            .compile("kernel", &files, &ctx)
            .unwrap();
        let expected: Vec<PathBuf> = (1..=8)
            .map(|i| PathBuf::from(format!("/repo/build/bin/kernel/file{i}.cpp.obj")))
            .collect();
        assert_eq!(
            artifacts.into_iter().map(|a| a.path).collect::<Vec<_>>(),
            expected
        );
    }

    #[test]
    fn skipped_files_produce_no_artifact_and_no_invocation() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = vec![
            source(&layout, Component::Kernel, "boot.asm", SourceKind::NativeAssembly),
            source(&layout, Component::Kernel, "entry.s", SourceKind::GasAssembly),
            source(&layout, Component::Kernel, "notes.txt", SourceKind::Unrecognized),
        ];
        let runner = ScriptedRunner::succeeding();
        let stamp = stamp();
        let ctx = CompileContext {
            profile: Arch::X86_64.profile(),
            features: &[],
            stamp: Some(&stamp),
        };

        let artifacts = CompileDriver::new(&tools, &layout, &runner)
            .compile("kernel", &files, &ctx)
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(
            artifacts[0].path,
            Path::new("/repo/build/bin/kernel/entry.s.obj")
        );

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program(), "clang");
        assert_eq!(
            calls[0].args_lossy(),
            vec![
                "-target",
                "x86_64-elf",
                "-c",
                "/repo/kernel/entry.s",
                "-o",
                "/repo/build/bin/kernel/entry.s.obj"
            ]
        );
    }

    #[test]
    fn kernel_source_gets_stamp_extra_flags_and_features() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = vec![source(&layout, Component::Kernel, "main.cpp", SourceKind::NativeSource)];
        let runner = ScriptedRunner::succeeding();
        let stamp = stamp();
        let features = vec!["DEBUG_BUILD".to_string(), "FEATURE_X".to_string()];
        let ctx = CompileContext {
            profile: Arch::RiscV64.profile(),
            features: &features,
            stamp: Some(&stamp),
        };

        CompileDriver::new(&tools, &layout, &runner)
            .compile("kernel", &files, &ctx)
            .unwrap();

        let cmd = &runner.calls()[0];
        assert_eq!(cmd.program(), "clang++");
        assert!(cmd.has_arg_pair("-target", "riscv64-unknown-elf"));
        for flag in [
            "-ffreestanding",
            "-fno-rtti",
            "-fno-exceptions",
            "-I.",
            "-I/repo/kernel",
            "-O2",
            "-Wall",
            "-march=rv64gc",
            "-mabi=lp64d",
            "-DSYLPH_VERSION_MINOR=1",
            "-DSYLPH_BUILD_DATE_YEAR=2025",
            "-DDEBUG_BUILD",
            "-DFEATURE_X",
        ] {
            assert!(cmd.has_arg(flag), "missing {flag} in {}", cmd.display());
        }
    }

    #[test]
    fn kernel_source_without_stamp_is_configuration_error() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = vec![source(&layout, Component::Kernel, "main.cpp", SourceKind::NativeSource)];
        let runner = ScriptedRunner::succeeding();
        let ctx = CompileContext {
            profile: Arch::X86_64.profile(),
            features: &[],
            stamp: None,
        };

        let err = CompileDriver::new(&tools, &layout, &runner)
            .compile("kernel", &files, &ctx)
            .unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn bootloader_red_zone_flag_only_on_x86_64() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = vec![source(&layout, Component::Bootloader, "main.c", SourceKind::NativeSource)];

        for arch in Arch::ALL {
            let runner = ScriptedRunner::succeeding();
            let ctx = CompileContext {
                profile: arch.profile(),
                features: &[],
                stamp: None,
            };
            let artifacts = CompileDriver::new(&tools, &layout, &runner)
                .compile("bootloader", &files, &ctx)
                .unwrap();
            assert_eq!(
                artifacts[0].path,
                Path::new("/repo/build/bin/bootloader/main.c.o")
            );

            let cmd = &runner.calls()[0];
            assert_eq!(cmd.program(), "clang");
            assert!(cmd.has_arg_pair("-target", arch.profile().bootloader_triple));
            assert!(cmd.has_arg("-fshort-wchar"));
            assert_eq!(cmd.has_arg("-mno-red-zone"), arch == Arch::X86_64);
            assert!(!cmd.has_arg("-mgeneral-regs-only"));
        }
    }

    #[test]
    fn app_source_uses_app_include_root() {
        let layout = BuildLayout::new("/repo");
        let tools = ToolPaths::default();
        let files = vec![source(&layout, Component::Apps, "shell/main.cpp", SourceKind::NativeSource)];
        let runner = ScriptedRunner::succeeding();
        let ctx = CompileContext {
            profile: Arch::AArch64.profile(),
            features: &[],
            stamp: None,
        };

        let artifacts = CompileDriver::new(&tools, &layout, &runner)
            .compile("shell", &files, &ctx)
            .unwrap();
        assert_eq!(
            artifacts[0].path,
            Path::new("/repo/build/bin/apps/shell/main.cpp.o")
        );
        let cmd = &runner.calls()[0];
        assert!(cmd.has_arg("-I/repo/apps"));
        assert!(!cmd.has_arg("-I/repo/kernel"));
        assert!(!cmd.args_lossy().iter().any(|a| a.starts_with("-DSYLPH_")));
    }

    #[test]
    fn delegated_backend_builds_archive_in_its_directory() {
        let temp = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(temp.path());
        let backend = layout.delegated_dir();
        fs::create_dir_all(&backend).unwrap();
        fs::write(backend.join("Cargo.toml"), "[package]\nname = \"sylphia-rust\"\n").unwrap();
        fs::create_dir_all(&layout.kernel_dir).unwrap();

        let tools = ToolPaths::default();
        let tree = SourceTree::new(&layout, Component::Kernel);
        let files = discover(&tree, &tree.src, Arch::AArch64).unwrap();
        let runner = ScriptedRunner::succeeding();
        let stamp = stamp();
        let ctx = CompileContext {
            profile: Arch::AArch64.profile(),
            features: &[],
            stamp: Some(&stamp),
        };

        let artifacts = CompileDriver::new(&tools, &layout, &runner)
            .compile("kernel", &files, &ctx)
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::StaticArchive);
        assert_eq!(
            artifacts[0].path,
            backend.join("target/aarch64-unknown-none/release/libsylphia_rust.a")
        );

        let cmd = &runner.calls()[0];
        assert_eq!(cmd.program(), "cargo");
        assert_eq!(
            cmd.args_lossy(),
            vec!["build", "--release", "--target", "aarch64-unknown-none"]
        );
        assert_eq!(cmd.get_current_dir(), Some(backend.as_path()));
    }
}
