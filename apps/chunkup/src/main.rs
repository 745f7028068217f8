//! chunkup command-line entry point.

mod app;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chunkup", version)]
#[command(about = "Upload a file in blocks and merge it server-side by content digest")]
pub struct Cli {
    /// File to upload
    pub file: PathBuf,

    /// Suffix of the merged object; defaults to the file's extension
    #[arg(short, long)]
    pub suffix: Option<String>,

    /// Base address of the upload service, e.g. http://127.0.0.1:8095
    #[arg(long)]
    pub server: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Block size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Per-request deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Maximum blocks in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Total attempts per block
    #[arg(long)]
    pub retries: Option<u32>,

    /// Only ask whether the merged object already exists
    #[arg(long)]
    pub check: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries the server's JSON answer.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = config::AppConfig::load(cli.config.as_deref())?.with_overrides(&cli);
    tracing::debug!(?config, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(&cli, config))
}
