//! Build pipeline coordinator.
//!
//! Runs the requested packages in their declared order (apps, bootloader,
//! kernel), each as discover, compile, link. The first error ends the run;
//! nothing built before it is removed.

use std::fmt;
use std::path::{self, Path};

use walkdir::WalkDir;

use crate::arch::Arch;
use crate::compile::{BuildArtifact, CompileContext, CompileDriver};
use crate::config::layout::{APP_HEADER_DIR, APP_LINK_DIR};
use crate::config::{BuildLayout, BuildStamp, ToolPaths};
use crate::discover::{discover, Component, SourceTree};
use crate::error::{BuildError, Result};
use crate::link::{LinkDriver, LinkTarget};
use crate::preflight;
use crate::process::ToolRunner;
use crate::verbose::{dprintln, vprintln};

/// A buildable top-level package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Package {
    Apps,
    Bootloader,
    Kernel,
}

impl Package {
    /// Every package, in build order.
    pub const ALL: [Package; 3] = [Package::Apps, Package::Bootloader, Package::Kernel];

    pub fn as_str(self) -> &'static str {
        match self {
            Package::Apps => "app",
            Package::Bootloader => "bootloader",
            Package::Kernel => "kernel",
        }
    }

    /// Parse a package name as given on the command line.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "app" | "apps" => Ok(Package::Apps),
            "bootloader" => Ok(Package::Bootloader),
            "kernel" => Ok(Package::Kernel),
            other => Err(BuildError::config(format!(
                "unknown package '{other}' (expected app, bootloader or kernel)"
            ))),
        }
    }

    fn state(self) -> PipelineState {
        match self {
            Package::Apps => PipelineState::BuildingApps,
            Package::Bootloader => PipelineState::BuildingBootloader,
            Package::Kernel => PipelineState::BuildingKernel,
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to build and for which architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub arch: Arch,
    packages: Vec<Package>,
    /// Preprocessor definitions passed to every native compile.
    pub features: Vec<String>,
    /// Apps to build; empty means every app directory.
    pub apps: Vec<String>,
}

impl BuildPlan {
    /// A plan building every package with no features.
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            packages: Package::ALL.to_vec(),
            features: Vec::new(),
            apps: Vec::new(),
        }
    }

    /// Restrict the plan to `packages`. An empty set keeps all of them.
    pub fn with_packages(mut self, packages: impl IntoIterator<Item = Package>) -> Self {
        let mut packages: Vec<Package> = packages.into_iter().collect();
        packages.sort();
        packages.dedup();
        if packages.is_empty() {
            packages = Package::ALL.to_vec();
        }
        self.packages = packages;
        self
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = String>) -> Self {
        self.features = features.into_iter().collect();
        self
    }

    pub fn with_apps(mut self, apps: impl IntoIterator<Item = String>) -> Self {
        self.apps = apps.into_iter().collect();
        self
    }

    /// Packages in the order they will be built.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn includes(&self, package: Package) -> bool {
        self.packages.contains(&package)
    }
}

/// Where a pipeline run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    BuildingApps,
    BuildingBootloader,
    BuildingKernel,
    Succeeded,
    Failed,
}

/// Final images produced by a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub arch: Arch,
    pub outputs: Vec<BuildArtifact>,
}

/// Sequences discovery, compilation and linking for a [`BuildPlan`].
pub struct Pipeline<'a> {
    layout: &'a BuildLayout,
    tools: &'a ToolPaths,
    runner: &'a dyn ToolRunner,
    jobs: usize,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(layout: &'a BuildLayout, tools: &'a ToolPaths, runner: &'a dyn ToolRunner) -> Self {
        Self {
            layout,
            tools,
            runner,
            jobs: 1,
            state: PipelineState::Pending,
        }
    }

    /// Compile workers per package; see [`CompileDriver::with_jobs`].
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Build every package in `plan`, stopping at the first failure.
    pub fn run(&mut self, plan: &BuildPlan) -> Result<BuildReport> {
        self.state = PipelineState::Pending;
        match self.run_packages(plan) {
            Ok(report) => {
                self.state = PipelineState::Succeeded;
                Ok(report)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn run_packages(&mut self, plan: &BuildPlan) -> Result<BuildReport> {
        preflight::check_configured(&preflight::required_tools(self.tools, self.layout, plan))?;
        let profile = plan.arch.profile();
        let stamp = if plan.includes(Package::Kernel) {
            Some(BuildStamp::load(&self.layout.project_file())?)
        } else {
            None
        };
        let ctx = CompileContext {
            profile,
            features: &plan.features,
            stamp: stamp.as_ref(),
        };

        let mut outputs = Vec::new();
        for &package in plan.packages() {
            self.state = package.state();
            dprintln!("[{package}] building for {}", plan.arch);
            let built = match package {
                Package::Apps => self.build_apps(plan, &ctx)?,
                Package::Bootloader => vec![self.build_bootloader(&ctx)?],
                Package::Kernel => vec![self.build_kernel(&ctx)?],
            };
            outputs.extend(built);
        }

        Ok(BuildReport {
            arch: plan.arch,
            outputs,
        })
    }

    fn compiler(&self) -> CompileDriver<'_> {
        CompileDriver::new(self.tools, self.layout, self.runner).with_jobs(self.jobs)
    }

    fn linker(&self) -> LinkDriver<'_> {
        LinkDriver::new(self.tools, self.layout, self.runner)
    }

    fn build_apps(&self, plan: &BuildPlan, ctx: &CompileContext<'_>) -> Result<Vec<BuildArtifact>> {
        let tree = SourceTree::new(self.layout, Component::Apps);
        let apps = select_apps(&tree.src, &plan.apps)?;

        let stub_files = discover(&tree, &tree.src.join(APP_LINK_DIR), plan.arch)?;
        let stub = self.compiler().compile(APP_LINK_DIR, &stub_files, ctx)?;

        let mut images = Vec::with_capacity(apps.len());
        for app in &apps {
            let files = discover(&tree, &tree.src.join(app), plan.arch)?;
            let objects = self.compiler().compile(app, &files, ctx)?;
            let image = self.linker().link(
                LinkTarget::App {
                    name: app,
                    stub: &stub,
                },
                &objects,
                ctx.profile,
            )?;
            images.push(image);
        }
        Ok(images)
    }

    fn build_bootloader(&self, ctx: &CompileContext<'_>) -> Result<BuildArtifact> {
        let tree = SourceTree::new(self.layout, Component::Bootloader);
        let files = discover(&tree, &tree.src, ctx.profile.arch)?;
        let objects = self.compiler().compile("bootloader", &files, ctx)?;
        self.linker().link(LinkTarget::Bootloader, &objects, ctx.profile)
    }

    /// Kernel sources plus the standard library, linked into one image.
    fn build_kernel(&self, ctx: &CompileContext<'_>) -> Result<BuildArtifact> {
        let arch = ctx.profile.arch;
        let kernel = SourceTree::new(self.layout, Component::Kernel);
        let mut files = discover(&kernel, &kernel.src, arch)?;

        let std = SourceTree::new(self.layout, Component::StandardLibrary);
        if std.src.is_dir() {
            files.extend(discover(&std, &std.src, arch)?);
        } else {
            vprintln!("[kernel] no standard library at {}", std.src.display());
        }

        let objects = self.compiler().compile("kernel", &files, ctx)?;
        self.linker().link(LinkTarget::Kernel, &objects, ctx.profile)
    }
}

/// App directories under `apps_dir`, sorted, excluding build-internal ones.
pub fn discover_apps(apps_dir: &Path) -> Result<Vec<String>> {
    if !apps_dir.is_dir() {
        return Err(BuildError::config(format!(
            "apps directory '{}' does not exist",
            apps_dir.display()
        )));
    }

    let mut apps = Vec::new();
    for entry in WalkDir::new(apps_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| BuildError::Io {
            path: apps_dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_internal_app_dir(name) {
            apps.push(name.to_string());
        }
    }
    Ok(apps)
}

fn is_internal_app_dir(name: &str) -> bool {
    name == APP_HEADER_DIR || name == APP_LINK_DIR
}

/// A bare directory name: one normal path component, spelled exactly as given.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(path::Component::Normal(first)), None) => first.to_str() == Some(name),
        _ => false,
    }
}

/// Apps to build: the filter if given (each entry must name an app
/// directory directly under `apps_dir`), otherwise every discovered app.
fn select_apps(apps_dir: &Path, filter: &[String]) -> Result<Vec<String>> {
    if filter.is_empty() {
        return discover_apps(apps_dir);
    }
    for name in filter {
        if !is_plain_name(name) || is_internal_app_dir(name) || !apps_dir.join(name).is_dir() {
            return Err(BuildError::config(format!(
                "no app named '{name}' under '{}'",
                apps_dir.display()
            )));
        }
    }
    Ok(filter.to_vec())
}
