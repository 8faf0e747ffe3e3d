mod app;
mod commands;
mod config;
mod console;
mod feed;
mod logging;
mod output;

use anyhow::{bail, Result};
use app::{AppContext, HostShell};
use clap::Parser;
use config::ScannerConfig;
use feed::PolisFeed;
use output::{Renderer, StdoutSink, RENDER_WORKER};
use scanner_core::{LifecycleState, LogBuffer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Poll, store, search and rank police events.
///
/// Without a command an interactive console starts; otherwise the single
/// command runs and the program exits once background work has drained.
#[derive(Parser, Debug)]
#[command(name = "polis-scanner", version, about)]
struct Cli {
    /// Config file path
    #[arg(long, env = "POLIS_SCANNER_CONFIG", default_value = "polis-scanner.toml")]
    config: PathBuf,

    /// Override the data directory
    #[arg(long, env = "POLIS_SCANNER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Console command to run once, e.g. `search --text brand --limit 3`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScannerConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let problems = config.validate();
    if !problems.is_empty() {
        bail!("Invalid config {}:\n  {}", cli.config.display(), problems.join("\n  "));
    }

    let buffer = Arc::new(LogBuffer::new(config.console.max_lines));
    logging::init(&config, buffer.clone())?;

    // One worker thread: commands and background tasks take turns.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("polis-scanner")
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();

    let shell = Arc::new(HostShell::default());
    let feed = Arc::new(PolisFeed::new(&config)?);
    let interactive = cli.command.is_empty();

    info!("{} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    let ctx = Arc::new(AppContext::new(
        config,
        cli.config,
        buffer,
        handle.clone(),
        feed,
        shell.clone(),
        interactive,
    ));

    if interactive {
        return console::run(&handle, ctx, shell);
    }

    let renderer = Renderer::new(ctx.buffer.clone(), ctx.force_scroll.clone());
    let worker = renderer.clone();
    let period = ctx.config.refresh_interval();
    ctx.scheduler.spawn(RENDER_WORKER, move |token| {
        worker.run(Box::new(StdoutSink), period, token)
    })?;

    console::dispatch(&handle, &ctx, cli.command);

    if ctx.lifecycle.state() == LifecycleState::Idle {
        let grace = ctx.config.grace_period();
        if let Err(e) = runtime.block_on(ctx.lifecycle.shutdown(false, grace)) {
            error!("Shutdown failed: {}", e);
        }
    }

    renderer.render(&mut StdoutSink)?;
    Ok(())
}
