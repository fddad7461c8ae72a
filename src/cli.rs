use clap::Parser;
use std::path::PathBuf;

/// Terminal manga reader backed by the MangaDex catalog
#[derive(Debug, Default, Parser)]
#[command(name = "mangaview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a config.toml (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Chapter language filter, e.g. "en"
    #[arg(short, long)]
    pub language: Option<String>,

    /// Read pages from the lower-resolution data-saver set
    #[arg(long)]
    pub data_saver: bool,

    /// Where to write the log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
