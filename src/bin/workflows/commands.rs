use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sylph_build::qemu::{self, Console, SessionOutcome};
use sylph_build::{commands, preflight, Arch, BuildConfig, BuildLayout, BuildPlan, HostRunner, Pipeline};

use crate::workflows::cli::{BuildArgs, RunArgs, TestArgs};
use crate::workflows::{parse_list, parse_packages};

const DEBUG_FEATURE: &str = "DEBUG_BUILD";

fn load_config(layout: &BuildLayout) -> Result<BuildConfig> {
    let path = layout.config_file();
    BuildConfig::load(&path).with_context(|| format!("loading '{}'", path.display()))
}

pub(crate) fn cmd_build(root: &Path, args: &BuildArgs) -> Result<()> {
    let arch = Arch::parse(&args.target)?;
    let layout = BuildLayout::new(root);
    let config = load_config(&layout)?;

    let features = parse_list(args.flags.as_deref());
    let plan = BuildPlan::new(arch)
        .with_packages(parse_packages(args.package.as_deref())?)
        .with_features(features)
        .with_apps(parse_list(args.name.as_deref()));

    let packages: Vec<&str> = plan.packages().iter().map(|p| p.as_str()).collect();
    println!("[build] target: {arch}  packages: {}", packages.join(", "));
    if !plan.features.is_empty() {
        println!("[build] features: {}", plan.features.join(", "));
    }
    if plan.features.iter().any(|f| f == DEBUG_FEATURE) {
        println!("[build] *** {DEBUG_FEATURE} enabled ***");
    }

    if !args.skip_preflight {
        preflight::check_build_tools(&config.tools, &layout, &plan)
            .context("preflight check failed")?;
    }

    let runner = HostRunner::new(root);
    let report = Pipeline::new(&layout, &config.tools, &runner)
        .with_jobs(args.jobs)
        .run(&plan)
        .with_context(|| format!("building {} for {arch}", packages.join(", ")))?;

    for output in &report.outputs {
        println!("[build] {}", output.path.display());
    }
    Ok(())
}

pub(crate) fn cmd_clean(root: &Path) -> Result<()> {
    let layout = BuildLayout::new(root);
    if !commands::clean(&layout).context("cleaning build directory")? {
        println!("[clean] nothing to remove");
    }
    Ok(())
}

pub(crate) fn cmd_dump(root: &Path) -> Result<()> {
    let layout = BuildLayout::new(root);
    let config = load_config(&layout)?;
    let runner = HostRunner::new(root);
    commands::dump(&layout, &config.tools, &runner).context("disassembling kernel image")?;
    Ok(())
}

fn prepare(root: &Path, args: &RunArgs, console: Console) -> Result<sylph_build::process::Cmd> {
    let arch = Arch::parse(&args.target)?;
    let layout = BuildLayout::new(root);
    let config = load_config(&layout)?;
    preflight::check_emulator(&config.tools, arch, args.clean).context("preflight check failed")?;

    let runner = HostRunner::new(root);
    qemu::prepare_session(&layout, &config, arch, args.clean, console, &runner)
        .with_context(|| format!("preparing {arch} emulator session"))
}

pub(crate) fn cmd_run(root: &Path, args: &RunArgs) -> Result<()> {
    let cmd = prepare(root, args, Console::Monitor)?;
    println!("[emulator] starting {}", cmd.program());
    match qemu::run_interactive(&cmd, root)? {
        SessionOutcome::Exited(0) | SessionOutcome::TimedOut => Ok(()),
        SessionOutcome::Exited(code) => bail!("{} exited with code {code}", cmd.program()),
    }
}

pub(crate) fn cmd_test(root: &Path, args: &TestArgs) -> Result<()> {
    let cmd = prepare(root, &args.run, Console::Serial)?;
    println!("[emulator] starting {} (timeout {}s)", cmd.program(), args.timeout);
    match qemu::run_with_timeout(&cmd, root, Duration::from_secs(args.timeout))? {
        SessionOutcome::TimedOut => {
            println!("[emulator] timed out after {}s", args.timeout);
            Ok(())
        }
        SessionOutcome::Exited(0) => Ok(()),
        SessionOutcome::Exited(code) => bail!("{} exited with code {code}", cmd.program()),
    }
}
