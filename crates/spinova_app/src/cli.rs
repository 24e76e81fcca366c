use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Download media with yt-dlp, one URL or a whole list at a time.
#[derive(Parser, Debug)]
#[command(name = "spinova", author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = "config/settings.json")]
    pub config: PathBuf,

    /// Plugin directory holding plugin_*.json and formats_*.json files
    #[arg(long, global = true, default_value = "plugins")]
    pub plugins: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write the log to a file (spinova.log when no path is given)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "spinova.log")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a single URL
    Download {
        url: String,
        /// Format display name, see `spinova formats`
        #[arg(short, long)]
        format: Option<String>,
        /// Output directory, overriding the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download every URL listed in the first column of a CSV file
    Batch {
        csv: PathBuf,
        #[arg(short, long)]
        format: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the available formats
    Formats,
    /// Inspect and toggle format plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Set and save the default output directory
    SetOutput { dir: PathBuf },
    /// Set and save the ffmpeg binary location
    SetFfmpeg { path: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum PluginAction {
    List,
    Enable { name: String },
    Disable { name: String },
}
