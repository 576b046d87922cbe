use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::arch::Arch;
use crate::error::{BuildError, Result};

/// External tool binaries, one entry per role.
///
/// Entries are names resolved through `PATH` or absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    /// C compiler (bootloader sources).
    pub cc: String,
    /// C++ compiler (kernel, std and app sources).
    pub cxx: String,
    /// Front-end used for GAS-syntax assembly.
    pub assembler: String,
    /// Delegated backend toolchain.
    pub cargo: String,
    /// ELF linker (kernel, apps).
    pub ld: String,
    /// PE/COFF linker (UEFI bootloader).
    pub efi_ld: String,
    pub objdump: String,
    /// Interpreter for helper scripts (USB image sync).
    pub shell: String,
    pub qemu_x86_64: String,
    pub qemu_aarch64: String,
    pub qemu_riscv64: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            cc: "clang".into(),
            cxx: "clang++".into(),
            assembler: "clang".into(),
            cargo: "cargo".into(),
            ld: "ld.lld".into(),
            efi_ld: "lld-link".into(),
            objdump: "objdump".into(),
            shell: "sh".into(),
            qemu_x86_64: "qemu-system-x86_64".into(),
            qemu_aarch64: "qemu-system-aarch64".into(),
            qemu_riscv64: "qemu-system-riscv64".into(),
        }
    }
}

impl ToolPaths {
    pub fn emulator(&self, arch: Arch) -> &str {
        match arch {
            Arch::X86_64 => &self.qemu_x86_64,
            Arch::AArch64 => &self.qemu_aarch64,
            Arch::RiscV64 => &self.qemu_riscv64,
        }
    }

    fn entries(&self) -> [(&'static str, &str); 11] {
        [
            ("cc", &self.cc),
            ("cxx", &self.cxx),
            ("assembler", &self.assembler),
            ("cargo", &self.cargo),
            ("ld", &self.ld),
            ("efi_ld", &self.efi_ld),
            ("objdump", &self.objdump),
            ("shell", &self.shell),
            ("qemu_x86_64", &self.qemu_x86_64),
            ("qemu_aarch64", &self.qemu_aarch64),
            ("qemu_riscv64", &self.qemu_riscv64),
        ]
    }

    /// Fails if any role has an empty path.
    pub fn validate(&self) -> Result<()> {
        let empty: Vec<&str> = self
            .entries()
            .into_iter()
            .filter(|(_, path)| path.trim().is_empty())
            .map(|(role, _)| role)
            .collect();
        if empty.is_empty() {
            return Ok(());
        }
        Err(BuildError::config(format!(
            "no tool path configured for: {}",
            empty.join(", ")
        )))
    }
}

/// Emulator session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmulatorSettings {
    /// Guest memory, in emulator syntax (`512M`).
    pub memory: String,
    pub nvme_image_size_mib: u64,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            memory: "512M".into(),
            nvme_image_size_mib: 2 * 1024,
        }
    }
}

/// Contents of the optional `sylph.toml` at the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub tools: ToolPaths,
    pub emulator: EmulatorSettings,
}

impl BuildConfig {
    /// Load `path`, or the built-in defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::parse(&text).map_err(|e| match e {
            BuildError::Configuration(msg) => {
                BuildError::config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: BuildConfig =
            toml::from_str(text).map_err(|e| BuildError::config(e.to_string()))?;
        config.tools.validate()?;
        if config.emulator.memory.trim().is_empty() {
            return Err(BuildError::config("emulator.memory must not be empty"));
        }
        Ok(config)
    }
}
