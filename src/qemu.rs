//! Emulator sessions for built images.
//!
//! Provides `QemuBuilder` for constructing emulator command lines,
//! `prepare_session()` for firmware and disk image setup, and
//! `run_with_timeout()` for automated test boots that stream serial output.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::arch::{Arch, ArchitectureProfile};
use crate::config::{BuildConfig, BuildLayout};
use crate::error::{BuildError, Result};
use crate::process::{launch_error, Cmd, ToolRunner};
use crate::verbose::{dprintln, vprintln};

/// Default limit for a test boot.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the emulator's stdio is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Console {
    /// Interactive monitor on stdio.
    #[default]
    Monitor,
    /// Guest serial port on stdio.
    Serial,
}

/// Builder for emulator commands.
#[derive(Debug, Default)]
pub struct QemuBuilder {
    program: String,
    memory: String,
    machine: Option<String>,
    cpu: Option<String>,
    firmware_code: Option<PathBuf>,
    firmware_vars: Option<PathBuf>,
    nvme: Option<PathBuf>,
    usb_stick: Option<PathBuf>,
    log: Option<PathBuf>,
    console: Console,
}

impl QemuBuilder {
    pub fn new(program: &str, memory: &str) -> Self {
        Self {
            program: program.to_string(),
            memory: memory.to_string(),
            ..Default::default()
        }
    }

    /// Machine and CPU overrides from an architecture profile.
    pub fn profile(mut self, profile: &ArchitectureProfile) -> Self {
        self.machine = profile.emulator_machine.map(str::to_string);
        self.cpu = profile.emulator_cpu.map(str::to_string);
        self
    }

    pub fn firmware(mut self, code: PathBuf) -> Self {
        self.firmware_code = Some(code);
        self
    }

    /// Writable variable store; pass the per-run copy, never the pristine image.
    pub fn firmware_vars(mut self, vars: PathBuf) -> Self {
        self.firmware_vars = Some(vars);
        self
    }

    pub fn nvme(mut self, image: PathBuf) -> Self {
        self.nvme = Some(image);
        self
    }

    /// Attach a VHD image as the first boot device.
    pub fn usb_stick(mut self, image: PathBuf) -> Self {
        self.usb_stick = Some(image);
        self
    }

    /// Interrupt log destination.
    pub fn log(mut self, path: PathBuf) -> Self {
        self.log = Some(path);
        self
    }

    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn build(self) -> Cmd {
        let mut cmd = Cmd::new(&self.program).args(["-m", &self.memory]);

        if let Some(machine) = &self.machine {
            cmd = cmd.args(["-machine", machine]);
        }
        if let Some(cpu) = &self.cpu {
            cmd = cmd.args(["-cpu", cpu]);
        }

        // UEFI firmware
        if let Some(code) = &self.firmware_code {
            cmd = cmd.args([
                "-drive",
                &format!("if=pflash,format=raw,readonly=on,file={}", code.display()),
            ]);
        }
        if let Some(vars) = &self.firmware_vars {
            cmd = cmd.args(["-drive", &format!("if=pflash,format=raw,file={}", vars.display())]);
        }

        if let Some(nvme) = &self.nvme {
            cmd = cmd.args([
                "-drive",
                &format!("file={},if=none,id=nvm", nvme.display()),
                "-device",
                "nvme,serial=deadbeef,drive=nvm",
            ]);
        }

        cmd = cmd.args([
            "-device",
            "qemu-xhci,id=xhci",
            "-device",
            "usb-kbd",
            "-net",
            "none",
        ]);

        if let Some(log) = &self.log {
            cmd = cmd.args(["-d", "int", "-D"]).arg(log);
        }

        if let Some(usb) = &self.usb_stick {
            cmd = cmd.args([
                "-drive",
                &format!("file={},format=vpc,if=none,id=usbstick", usb.display()),
                "-device",
                "usb-storage,bus=xhci.0,drive=usbstick,bootindex=1",
            ]);
        }

        match self.console {
            Console::Monitor => cmd.args(["-monitor", "stdio"]),
            Console::Serial => cmd.args(["-serial", "stdio"]),
        }
    }
}

/// Per-run copy of a firmware variable store: `NAME.fd` becomes `NAME_TMP.fd`.
pub fn vars_copy_path(vars: &Path) -> PathBuf {
    let stem = vars
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = vars
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    vars.with_file_name(format!("{stem}_TMP{ext}"))
}

/// (Re)create the NVMe backing image as a sparse file of `size_mib` MiB.
pub fn create_nvme_image(path: &Path, size_mib: u64) -> Result<()> {
    let len = size_mib.checked_mul(1024 * 1024).ok_or_else(|| {
        BuildError::config(format!(
            "emulator.nvme_image_size_mib = {size_mib} is too large"
        ))
    })?;
    let file = File::create(path).map_err(|e| BuildError::io(path, e))?;
    file.set_len(len).map_err(|e| BuildError::io(path, e))
}

/// Set up firmware and disk images for `arch` and return the emulator command.
///
/// With `clean` the NVMe image is recreated and the USB image is rebuilt by
/// the sync script, then attached as the first boot device.
pub fn prepare_session(
    layout: &BuildLayout,
    config: &BuildConfig,
    arch: Arch,
    clean: bool,
    console: Console,
    runner: &dyn ToolRunner,
) -> Result<Cmd> {
    let profile = arch.profile();
    let code = layout.scripts_dir.join(profile.firmware_code);
    if !code.is_file() {
        return Err(BuildError::config(format!(
            "firmware image for {arch} not found at '{}'",
            code.display()
        )));
    }

    let mut builder = QemuBuilder::new(config.tools.emulator(arch), &config.emulator.memory)
        .profile(profile)
        .firmware(code)
        .console(console);

    if let Some(vars) = profile.firmware_vars {
        let pristine = layout.scripts_dir.join(vars);
        let copy = vars_copy_path(&pristine);
        fs::copy(&pristine, &copy).map_err(|e| BuildError::io(&pristine, e))?;
        builder = builder.firmware_vars(copy);
    }

    let nvme = layout.nvme_image();
    if clean || !nvme.exists() {
        dprintln!(
            "[emulator] creating {} ({} MiB)",
            nvme.display(),
            config.emulator.nvme_image_size_mib
        );
        create_nvme_image(&nvme, config.emulator.nvme_image_size_mib)?;
    }
    builder = builder.nvme(nvme);

    if clean {
        sync_usb_image(layout, &config.tools.shell, runner)?;
        builder = builder.usb_stick(layout.usb_image());
    }

    fs::create_dir_all(&layout.build_dir).map_err(|e| BuildError::io(&layout.build_dir, e))?;
    Ok(builder.log(layout.emulator_log()).build())
}

/// Rebuild `usb.vhd` from the build outputs with the sync script.
fn sync_usb_image(layout: &BuildLayout, shell: &str, runner: &dyn ToolRunner) -> Result<()> {
    let usb = layout.usb_image();
    if usb.exists() {
        fs::remove_file(&usb).map_err(|e| BuildError::io(&usb, e))?;
    }
    let script = layout.usb_sync_script();
    if !script.is_file() {
        return Err(BuildError::config(format!(
            "USB image sync script not found at '{}'",
            script.display()
        )));
    }

    dprintln!("[emulator] syncing {}", usb.display());
    let output = runner.run(&Cmd::new(shell).arg(&script))?;
    if !output.success() {
        return Err(BuildError::config(format!(
            "USB image sync failed (exit code {}):\n{}{}",
            output.code(),
            output.stdout,
            output.stderr
        )));
    }
    Ok(())
}

/// How an emulator session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `-1` when the emulator was killed by a signal.
    Exited(i32),
    TimedOut,
}

/// Run an interactive session with inherited stdio until the emulator exits.
pub fn run_interactive(cmd: &Cmd, root: &Path) -> Result<SessionOutcome> {
    vprintln!("  $ {}", cmd.display());
    let status = cmd
        .to_command(root)
        .status()
        .map_err(|e| launch_error(cmd, root, e))?;
    Ok(SessionOutcome::Exited(status.code().unwrap_or(-1)))
}

/// Run a session, echoing each stdout line, and kill it after `timeout`.
pub fn run_with_timeout(cmd: &Cmd, root: &Path, timeout: Duration) -> Result<SessionOutcome> {
    watch_session(cmd, root, timeout, |line| println!("  {line}"))
}

/// Run a session, handing each stdout line to `on_line`, and kill it after
/// `timeout`. Every line written before the emulator exits is delivered.
pub fn watch_session(
    cmd: &Cmd,
    root: &Path,
    timeout: Duration,
    mut on_line: impl FnMut(&str),
) -> Result<SessionOutcome> {
    vprintln!("  $ {}", cmd.display());
    let mut child = cmd
        .to_command(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| launch_error(cmd, root, e))?;

    let (tx, rx) = mpsc::channel();
    let reader = child.stdout.take().map(|stdout| {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(std::result::Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
    });

    let start = Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => on_line(&line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(100)),
        }

        if let Some(status) = child.try_wait().map_err(|e| BuildError::io(root, e))? {
            // The reader stops at EOF; join it so the tail of the pipe is not lost.
            if let Some(reader) = reader {
                let _ = reader.join();
            }
            for line in rx.iter() {
                on_line(&line);
            }
            return Ok(SessionOutcome::Exited(status.code().unwrap_or(-1)));
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(SessionOutcome::TimedOut);
        }
    }
}
