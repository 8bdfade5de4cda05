//! upqueue command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Upload files in resumable chunks.
///
/// Queued files survive restarts: running again without arguments resumes
/// whatever is still in the queue.
#[derive(Debug, Parser)]
#[command(version)]
struct Opts {
    /// Configuration file [default: platform config directory].
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upload endpoint, overriding the configuration file.
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Remove every queued upload and exit.
    #[arg(long)]
    clear: bool,

    /// Files to add to the queue.
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting upqueue");

    let mut config = config::Config::load(opts.config.as_deref())?;
    if let Some(endpoint) = opts.endpoint {
        config.engine.endpoint = endpoint;
    }
    tracing::info!(
        endpoint = %config.engine.endpoint,
        store = %config.store_dir.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, opts.files, opts.clear))?;

    Ok(())
}
