//! Interactive console: a readline prompt on the host thread, with every
//! command and worker running on the tokio runtime.

use crate::app::{AppContext, HostShell};
use crate::commands;
use crate::output::{PrinterSink, Renderer, StdoutSink, RENDER_WORKER};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

const PROMPT: &str = "> ";

/// Run one command on the runtime and block the host until it finishes.
pub fn dispatch(runtime: &Handle, ctx: &Arc<AppContext>, words: Vec<String>) {
    let task_ctx = ctx.clone();
    let handle = runtime.spawn(async move { commands::handle_words(&task_ctx, words).await });
    if let Err(e) = runtime.block_on(handle) {
        error!("Command task failed: {}", e);
    }
}

pub fn run(runtime: &Handle, ctx: Arc<AppContext>, shell: Arc<HostShell>) -> Result<()> {
    let config = Config::builder()
        .max_history_size(ctx.config.console.history_len)?
        .history_ignore_dups(true)?
        .build();
    let mut rl = DefaultEditor::with_config(config)?;

    let history = ctx.config.history_file();
    if history.exists() {
        if let Err(e) = rl.load_history(&history) {
            warn!("Could not load history from {}: {}", history.display(), e);
        }
    }

    let renderer = Renderer::new(ctx.buffer.clone(), ctx.force_scroll.clone());
    let sink = PrinterSink::new(rl.create_external_printer()?);
    let period = ctx.config.refresh_interval();
    let worker = renderer.clone();
    ctx.scheduler.spawn(RENDER_WORKER, move |token| {
        worker.run(Box::new(sink), period, token)
    })?;

    info!("Starting console, feed {}", ctx.config.feed.url);
    info!("Data directory: {}", ctx.config.data_dir.display());
    info!("Type 'help' for available commands, 'exit' to quit");

    while !shell.is_closed() {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                dispatch(runtime, &ctx, commands::shell_split(line));
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                dispatch(runtime, &ctx, vec!["exit".to_string()]);
            }
            Err(e) => {
                error!("Console input failed: {}", e);
                dispatch(runtime, &ctx, vec!["exit".to_string()]);
                break;
            }
        }
    }

    save_history(&mut rl, &history);

    // The render worker is gone by now; flush what it did not get to.
    renderer.render(&mut StdoutSink)?;
    debug!("Console closed");
    Ok(())
}

fn save_history(rl: &mut DefaultEditor, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Could not create {}: {}", parent.display(), e);
            return;
        }
    }
    if let Err(e) = rl.save_history(path) {
        warn!("Could not save history to {}: {}", path.display(), e);
    }
}
