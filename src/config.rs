//! Configuration module.
//!
//! `LoaderConfig` tunes a single load. `Config` is the command-line interface of the `peload`
//! driver, parsed with `clap`, and converts into a `LoaderConfig`.

use clap::Parser;
use std::path::PathBuf;

/// Default window for module and symbol name scans.
pub const DEFAULT_MAX_NAME_LEN: usize = 0x100;

/// Options for [`crate::loader::Loader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Longest name (terminator included) read for a module or symbol. A longer name fails the
    /// load with `DecodeTruncated`.
    pub max_name_len: usize,
    /// Unmap everything a failed load mapped before returning the error.
    pub rollback_on_failure: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            rollback_on_failure: true,
        }
    }
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s}: {e}"))
}

/// Loads a 32-bit PE image into an emulated workspace and reports what was mapped and imported.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Image to load
    pub input: PathBuf,

    /// Module name (defaults to the input's file name)
    #[arg(long)]
    pub name: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,

    /// Longest module or symbol name to scan for
    #[arg(long, default_value_t = DEFAULT_MAX_NAME_LEN)]
    pub max_name_len: usize,

    /// Leave partially mapped sections in place when a load fails
    #[arg(long)]
    pub no_rollback: bool,

    /// Replace import thunks with emulator call-stubs
    #[arg(long)]
    pub hooks: bool,

    /// Address of the import dispatcher the stubs jump to
    #[arg(long, value_parser = parse_hex, default_value = "0xFEE00000")]
    pub dispatch_address: u32,

    /// Hex dump the start of every mapped region
    #[arg(long)]
    pub dump: bool,
}

impl Config {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_name_len: self.max_name_len,
            rollback_on_failure: !self.no_rollback,
        }
    }

    pub fn module_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string())
        })
    }
}
