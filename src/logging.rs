//! Logging setup for the binary.
use crate::core::{FundError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

pub const DEFAULT_VERBOSITY: u8 = 1;
pub const MAX_VERBOSITY: u8 = 4;

/// Maximum level shown at a verbosity between 0 (quiet) and 4.
pub fn level_for(verbose: u8) -> Level {
    match verbose {
        0 | 1 => Level::ERROR,
        2 => Level::WARN,
        3 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Installs the global subscriber, writing to stderr or appending to `file`.
pub fn init(verbose: u8, file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level_for(verbose))
        .with_target(false);

    let installed = match file {
        Some(path) => {
            let log = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(log)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| FundError::Config(format!("Cannot initialise logging: {}", e)))
}
