//! Build configuration: filesystem layout, tool paths and project metadata.
//!
//! - [`layout`] - where sources, objects and outputs live
//! - [`tools`] - external tool binaries and emulator settings (`sylph.toml`)
//! - [`project`] - `project.json` version stamping and delegated backend output

pub mod layout;
pub mod project;
pub mod tools;

pub use layout::BuildLayout;
pub use project::BuildStamp;
pub use tools::{BuildConfig, EmulatorSettings, ToolPaths};
