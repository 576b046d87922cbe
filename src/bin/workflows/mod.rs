pub(crate) mod cli;
mod commands;
mod layout;
mod parse;

pub(crate) use commands::{cmd_build, cmd_clean, cmd_dump, cmd_run, cmd_test};
pub(crate) use layout::locate_repo_root;
pub(crate) use parse::{parse_list, parse_packages};
