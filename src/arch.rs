//! Architecture profile registry.
//!
//! Maps each supported target architecture to the toolchain parameters needed
//! to build for it. Profiles are static data; the mapping is total over
//! [`Arch`], so there is no fallback profile.

use std::fmt;
use std::str::FromStr;

use crate::error::{BuildError, Result};

/// Supported target architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    AArch64,
    RiscV64,
}

impl Arch {
    /// Every supported architecture, in declaration order.
    pub const ALL: [Arch; 3] = [Arch::X86_64, Arch::AArch64, Arch::RiscV64];

    /// Canonical identifier, also used as the `arch/<name>` directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::AArch64 => "aarch64",
            Arch::RiscV64 => "riscv64",
        }
    }

    /// Parse an identifier or one of its aliases (`x64`, `arm64`, `riscv`).
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "x86_64" | "x64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::AArch64),
            "riscv64" | "riscv" => Ok(Arch::RiscV64),
            other => Err(BuildError::UnknownArchitecture(other.to_string())),
        }
    }

    /// Returns the architecture whose directory name is exactly `segment`.
    ///
    /// Aliases are not directory names, so only canonical names match.
    pub fn from_dir_name(segment: &str) -> Option<Self> {
        Arch::ALL.into_iter().find(|arch| arch.as_str() == segment)
    }

    pub fn profile(self) -> &'static ArchitectureProfile {
        match self {
            Arch::X86_64 => &X86_64_PROFILE,
            Arch::AArch64 => &AARCH64_PROFILE,
            Arch::RiscV64 => &RISCV64_PROFILE,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Arch::parse(s)
    }
}

/// Toolchain parameters for one architecture.
#[derive(Debug, PartialEq, Eq)]
pub struct ArchitectureProfile {
    pub arch: Arch,
    /// Compiler target triple for kernel, std and app code.
    pub kernel_triple: &'static str,
    /// Compiler target triple for the UEFI bootloader (PE/COFF where needed).
    pub bootloader_triple: &'static str,
    /// Extra compiler flags for kernel, std and app code.
    pub extra_cflags: &'static [&'static str],
    /// Linker script, relative to the kernel source root.
    pub linker_script: &'static str,
    /// Target triple for the delegated backend (`cargo build --target`).
    pub backend_triple: &'static str,
    /// File name of the bootloader under `EFI/BOOT/`.
    pub bootloader_output: &'static str,
    /// Firmware code image, relative to the firmware directory.
    pub firmware_code: &'static str,
    /// Firmware variable store, relative to the firmware directory.
    pub firmware_vars: Option<&'static str>,
    pub emulator_machine: Option<&'static str>,
    pub emulator_cpu: Option<&'static str>,
    /// Whether the kernel is linked position-independent so it can relocate itself.
    pub relocatable_kernel: bool,
    /// Whether the bootloader is compiled without the red zone.
    pub bootloader_no_red_zone: bool,
}

static X86_64_PROFILE: ArchitectureProfile = ArchitectureProfile {
    arch: Arch::X86_64,
    kernel_triple: "x86_64-elf",
    bootloader_triple: "x86_64-pc-win32-coff",
    extra_cflags: &["-mno-red-zone", "-mgeneral-regs-only"],
    linker_script: "kernel.ld",
    backend_triple: "x86_64-unknown-none",
    bootloader_output: "BOOTX64.EFI",
    firmware_code: "x86_64/OVMF_CODE.fd",
    firmware_vars: Some("x86_64/OVMF_VARS.fd"),
    emulator_machine: None,
    emulator_cpu: None,
    relocatable_kernel: false,
    bootloader_no_red_zone: true,
};

static AARCH64_PROFILE: ArchitectureProfile = ArchitectureProfile {
    arch: Arch::AArch64,
    kernel_triple: "aarch64-unknown-elf",
    bootloader_triple: "aarch64-unknown-windows",
    extra_cflags: &[],
    linker_script: "kernel_aarch64.ld",
    backend_triple: "aarch64-unknown-none",
    bootloader_output: "BOOTAA64.EFI",
    firmware_code: "aarch64/AARCH64_QEMU_EFI.fd",
    firmware_vars: Some("aarch64/AARCH64_QEMU_VARS.fd"),
    emulator_machine: Some("virt"),
    emulator_cpu: Some("cortex-a72"),
    relocatable_kernel: true,
    bootloader_no_red_zone: false,
};

static RISCV64_PROFILE: ArchitectureProfile = ArchitectureProfile {
    arch: Arch::RiscV64,
    kernel_triple: "riscv64-unknown-elf",
    bootloader_triple: "riscv64-unknown-elf",
    extra_cflags: &["-march=rv64gc", "-mabi=lp64d"],
    linker_script: "kernel.ld",
    backend_triple: "riscv64gc-unknown-none-elf",
    bootloader_output: "BOOTRISCV64.EFI",
    firmware_code: "risc-v/RISCV64_VIRT.fd",
    firmware_vars: None,
    emulator_machine: Some("virt"),
    emulator_cpu: None,
    relocatable_kernel: false,
    bootloader_no_red_zone: false,
};

/// Look up the profile for an architecture identifier.
///
/// Unknown identifiers fail with [`BuildError::UnknownArchitecture`]; this
/// function touches neither the filesystem nor any process.
pub fn profile_for(arch_id: &str) -> Result<&'static ArchitectureProfile> {
    Arch::parse(arch_id).map(Arch::profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_arch_has_its_own_profile() {
        for arch in Arch::ALL {
            assert_eq!(arch.profile().arch, arch);
            assert_eq!(profile_for(arch.as_str()).unwrap().arch, arch);
        }
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(Arch::parse("x64").unwrap(), Arch::X86_64);
        assert_eq!(Arch::parse("arm64").unwrap(), Arch::AArch64);
        assert_eq!(Arch::parse("riscv").unwrap(), Arch::RiscV64);
    }

    #[test]
    fn unknown_arch_is_rejected_without_fallback() {
        for id in ["", "x86", "i386", "arm", "X86_64", "mips64"] {
            match profile_for(id) {
                Err(BuildError::UnknownArchitecture(got)) => assert_eq!(got, id),
                other => panic!("expected UnknownArchitecture for '{id}', got {other:?}"),
            }
        }
    }

    #[test]
    fn only_aarch64_links_relocatable_kernel() {
        assert!(!Arch::X86_64.profile().relocatable_kernel);
        assert!(Arch::AArch64.profile().relocatable_kernel);
        assert!(!Arch::RiscV64.profile().relocatable_kernel);
    }

    #[test]
    fn dir_names_do_not_accept_aliases() {
        assert_eq!(Arch::from_dir_name("aarch64"), Some(Arch::AArch64));
        assert_eq!(Arch::from_dir_name("arm64"), None);
        assert_eq!(Arch::from_dir_name("common"), None);
    }
}
