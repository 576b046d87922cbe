use std::path::{Path, PathBuf};

use crate::discover::Component;

/// Directory holding app sources, one subdirectory per app.
pub const APPS_DIR: &str = "apps";
/// Build-internal app directories that are never apps themselves.
pub const APP_HEADER_DIR: &str = "_header";
pub const APP_LINK_DIR: &str = "_link";
/// Subdirectory of the kernel tree built by the delegated backend.
pub const DELEGATED_DIR: &str = "rust";
pub const PROJECT_FILE: &str = "project.json";
pub const CONFIG_FILE: &str = "sylph.toml";

/// Filesystem locations, all derived from the repository root.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub output_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub bootloader_dir: PathBuf,
    pub kernel_dir: PathBuf,
    pub std_dir: PathBuf,
    /// Firmware images and image-sync scripts.
    pub scripts_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let build_dir = root.join("build");
        Self {
            bin_dir: build_dir.join("bin"),
            output_dir: build_dir.join("output"),
            apps_dir: root.join(APPS_DIR),
            bootloader_dir: root.join("bootloader"),
            kernel_dir: root.join("kernel"),
            std_dir: root.join("std"),
            scripts_dir: root.join("build_scripts"),
            build_dir,
            root,
        }
    }

    /// Source root of a component.
    pub fn component_src(&self, component: Component) -> &Path {
        match component {
            Component::Apps => &self.apps_dir,
            Component::Bootloader => &self.bootloader_dir,
            Component::Kernel => &self.kernel_dir,
            Component::StandardLibrary => &self.std_dir,
        }
    }

    /// Object tree mirroring a component's source root.
    pub fn component_bin(&self, component: Component) -> PathBuf {
        self.bin_dir.join(component.dir_name())
    }

    pub fn delegated_dir(&self) -> PathBuf {
        self.kernel_dir.join(DELEGATED_DIR)
    }

    pub fn kernel_image(&self) -> PathBuf {
        self.output_dir.join("kernel.elf")
    }

    pub fn efi_boot_dir(&self) -> PathBuf {
        self.output_dir.join("EFI").join("BOOT")
    }

    pub fn apps_output_dir(&self) -> PathBuf {
        self.output_dir.join(APPS_DIR)
    }

    pub fn app_image(&self, app: &str) -> PathBuf {
        self.apps_output_dir().join(format!("{app}.elf"))
    }

    pub fn app_linker_script(&self) -> PathBuf {
        self.apps_dir.join(APP_LINK_DIR).join("linker.ld")
    }

    pub fn project_file(&self) -> PathBuf {
        self.root.join(PROJECT_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn kernel_dump(&self) -> PathBuf {
        self.build_dir.join("kernel_dump.txt")
    }

    pub fn emulator_log(&self) -> PathBuf {
        self.build_dir.join("qemu.log")
    }

    pub fn nvme_image(&self) -> PathBuf {
        self.root.join("nvme.img")
    }

    pub fn usb_image(&self) -> PathBuf {
        self.root.join("usb.vhd")
    }

    pub fn usb_sync_script(&self) -> PathBuf {
        self.scripts_dir.join("sync_usb_vhd.sh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_follow_fixed_layout() {
        let layout = BuildLayout::new("/repo");
        assert_eq!(layout.kernel_image(), Path::new("/repo/build/output/kernel.elf"));
        assert_eq!(layout.app_image("shell"), Path::new("/repo/build/output/apps/shell.elf"));
        assert_eq!(layout.efi_boot_dir(), Path::new("/repo/build/output/EFI/BOOT"));
        assert_eq!(
            layout.component_bin(Component::StandardLibrary),
            Path::new("/repo/build/bin/std")
        );
        assert_eq!(layout.delegated_dir(), Path::new("/repo/kernel/rust"));
    }
}
