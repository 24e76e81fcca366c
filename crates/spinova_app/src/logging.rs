//! Logging setup for the spinova binary.

use std::path::Path;

use engine_logging::LogDestination;
use log::LevelFilter;

/// Installs the terminal logger, plus a file logger when `log_file` is set.
pub fn initialize(verbose: bool, log_file: Option<&Path>) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match log_file {
        Some(path) => LogDestination::Both(path.to_path_buf()),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(destination, level);
}
