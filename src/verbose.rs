//! Output verbosity and progress reporting.
//!
//! Three output levels controlled by CLI flags:
//! - **Quiet** (`-q`): errors only
//! - **Default** (no flag): component banners and per-file progress
//! - **Verbose** (`-v`): everything, including each external command line

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// Output verbosity level. Levels are ordered, so `>=` means "at least".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Default,
    Verbose,
}

static LEVEL: AtomicU8 = AtomicU8::new(Verbosity::Default as u8);

impl Verbosity {
    /// Level selected by the `-q`/`-v` flags; `-q` wins when both are given.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Default,
        }
    }

    /// Process-wide level used by the print macros.
    pub fn current() -> Self {
        match LEVEL.load(Ordering::Relaxed) {
            0 => Verbosity::Quiet,
            2 => Verbosity::Verbose,
            _ => Verbosity::Default,
        }
    }

    pub fn install(self) {
        LEVEL.store(self as u8, Ordering::Relaxed);
    }
}

/// Print each external command line; only at `Verbose`.
macro_rules! vprintln {
    ($($arg:tt)*) => {
        if $crate::verbose::Verbosity::current() >= $crate::verbose::Verbosity::Verbose {
            println!($($arg)*);
        }
    };
}

pub(crate) use vprintln;

/// Print banners and progress; silenced at `Quiet`.
macro_rules! dprintln {
    ($($arg:tt)*) => {
        if $crate::verbose::Verbosity::current() >= $crate::verbose::Verbosity::Default {
            println!($($arg)*);
        }
    };
}

pub(crate) use dprintln;

/// Per-file progress counter for one compile run.
///
/// Skipped files count as processed, so a finished run always reads
/// `total/total`.
#[derive(Debug)]
pub struct Progress {
    label: String,
    total: usize,
    done: usize,
}

impl Progress {
    pub fn new(label: &str, total: usize) -> Self {
        dprintln!("[{label}] {total} file(s)");
        Self {
            label: label.to_string(),
            total,
            done: 0,
        }
    }

    /// Record one processed file.
    pub fn advance(&mut self, path: &Path, skipped: bool) {
        self.done += 1;
        let note = if skipped { " (skipped)" } else { "" };
        dprintln!(
            "[{} {}/{}] {}{note}",
            self.label,
            self.done,
            self.total,
            path.display()
        );
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
