//! Line grammar and dispatch for console commands.
//!
//! Every command reports through the shared log buffer, either as log
//! lines or as result lines written directly.

pub mod events;
pub mod poll;
pub mod query_args;

use crate::app::AppContext;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use query_args::{QueryArgs, RankArgs};
use scanner_core::ScannerError;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "polis-scanner", no_binary_name = true, disable_help_subcommand = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Show the command reference
    Help,
    /// Fetch the latest events from the feed
    Refresh,
    /// Repeatedly refresh at a fixed interval
    Poll {
        #[command(subcommand)]
        action: Option<PollAction>,
    },
    /// Display stored events
    Load,
    /// Show every field of one event
    More { id: Option<String> },
    /// Quick strict search over the default fields
    Find { words: Vec<String> },
    /// Search with filtering, sorting and limit
    Search(QueryArgs),
    /// Group events by a field and show statistics
    Rank(RankArgs),
    /// Clear the output
    Clear,
    /// Print the effective configuration
    Config,
    /// Quit the program
    #[command(alias = "quit")]
    Exit {
        #[arg(value_enum)]
        mode: Option<ExitMode>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PollAction {
    /// Start polling; interval as <int>[s|m|h|d]
    Start { interval: Option<String> },
    /// Stop polling
    Stop,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum ExitMode {
    /// Do not wait for background tasks
    Now,
}

pub const HELP: &str = "\
Commands:
    refresh
        Fetch the latest events from the feed.

    poll [start [INTERVAL] | stop]
        Repeatedly refresh events at a fixed interval.
        Without arguments, show whether polling is running.

        Interval format: <int>[s|m|h|d] (seconds, minutes, hours, days).
        Examples: 30s, 5m, 1h, 2d. Use low values with care to avoid
        rate limiting.

    load
        Display events stored locally.

    more <id>
        Show full details for one event.

    find <words...>
        Quick strict search. Only events matching all words are returned.

    search [options]
        Search with filtering, sorting and limit. Strict by default;
        use --strict false for relevance ranking.

    rank --group <field> [options]
        Group events by a field and display count and average score.
        Text and filters are applied before grouping.
        Default order: avg_score, count, then group name.

Search options:
    --text <words...>           Match all words in the searched fields.
    --fields <field...>         Fields used for text matching.
                                Default: name summary type location.name
    --filters <field value...>  Field/value pairs; the field must contain
                                the value.
    --sort <key...>             Sort keys in priority order, e.g. score,
                                datetime, name, type, location.name.
                                For rank: count, avg_score, group.
    --limit <n>                 Limit the number of results.
    --strict <true|false>       true (default): hard filtering only.
                                false: relevance scoring and ranking.

Other:
    help            Display this help message.
    clear           Clear the output.
    config          Print the effective configuration.
    exit | quit [now]
                    Quit. 'now' does not wait for background tasks.

Examples:
    search --text polis --filters type brand location.name stockholm --limit 3
    find brand stockholm
    rank --group location.name --filters type brand";

/// Split a command line into words, honouring single and double quotes.
pub fn shell_split(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}

/// Parse words into a command. The command name is case-insensitive.
pub fn parse(mut words: Vec<String>) -> Result<Command, clap::Error> {
    if let Some(first) = words.first_mut() {
        *first = first.to_lowercase();
    }
    ShellLine::try_parse_from(words).map(|line| line.command)
}

/// Run one line of user input. Errors are reported, never returned.
pub async fn handle_line(ctx: &AppContext, line: &str) {
    handle_words(ctx, shell_split(line)).await
}

/// Run an already split command line.
pub async fn handle_words(ctx: &AppContext, words: Vec<String>) {
    let Some(name) = words.first().map(|w| w.to_lowercase()) else {
        return;
    };
    let args = words[1..].join(" ");

    match parse(words) {
        Ok(command) => {
            info!("cmd='{}', args='{}'", name, args);
            if let Err(e) = run(ctx, command).await {
                report(&e);
            }
        }
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            warn!("Unknown command '{}', type 'help' for a list", name);
        }
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            ctx.buffer.write(&e.to_string());
        }
        Err(e) => warn!("{}", e.to_string().trim_end()),
    }

    ctx.force_scroll.store(true, Ordering::Release);
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<ScannerError>() {
        Some(err) if err.is_user_error() => warn!("{}", err),
        _ => error!("Command failed: {:#}", e),
    }
}

pub async fn run(ctx: &AppContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Help => ctx.buffer.write(HELP),
        Command::Refresh => events::refresh(ctx).await?,
        Command::Poll { action } => poll::run(ctx, action).await?,
        Command::Load => events::load(ctx)?,
        Command::More { id } => events::more(ctx, id.as_deref())?,
        Command::Find { words } => events::find(ctx, &words)?,
        Command::Search(args) => events::search(ctx, &args)?,
        Command::Rank(args) => events::rank(ctx, &args)?,
        Command::Clear => {
            info!("Clearing screen...");
            ctx.buffer.clear();
        }
        Command::Config => {
            let text = toml::to_string_pretty(&ctx.config)?;
            ctx.buffer
                .write(&format!("# {}\n{}", ctx.config_path.display(), text));
        }
        Command::Exit { mode } => {
            let force = mode == Some(ExitMode::Now);
            match ctx.lifecycle.shutdown(force, ctx.config.grace_period()).await {
                Ok(report) if report.timed_out => {
                    warn!("{} task(s) had to be aborted", report.aborted)
                }
                Ok(_) => {}
                Err(ScannerError::ShutdownInProgress) => {
                    warn!("Shutdown already in progress")
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}
