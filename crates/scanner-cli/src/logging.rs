//! Tracing setup: INFO and above go to the console buffer with a short
//! level prefix, everything from DEBUG goes to a size-rotated log file.
//! `log` records from scanner-core are bridged into the same subscriber.

use crate::config::ScannerConfig;
use scanner_core::LogBuffer;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_FILTER: &str = "warn,polis_scanner=debug,scanner_core=debug";

pub fn level_prefix(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "[!]",
        Level::WARN => "[-]",
        Level::INFO => "[+]",
        Level::DEBUG | Level::TRACE => "[i]",
    }
}

/// Line layout shared by both sinks.
///
/// Console: `12:04:05 [+] message`.
/// File: `2025-01-30 12:04:05 - INFO - scanner_core::store - message`.
#[derive(Debug, Clone, Copy)]
pub struct PrefixFormat {
    detailed: bool,
}

impl PrefixFormat {
    pub fn console() -> Self {
        Self { detailed: false }
    }

    pub fn file() -> Self {
        Self { detailed: true }
    }
}

impl<S, N> FormatEvent<S, N> for PrefixFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = event.metadata().level();
        let now = chrono::Local::now();

        if self.detailed {
            write!(
                writer,
                "{} - {} - {} - ",
                now.format("%Y-%m-%d %H:%M:%S"),
                level,
                event.metadata().target()
            )?;
        } else {
            write!(writer, "{} {} ", now.format("%H:%M:%S"), level_prefix(level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Routes formatted events into the shared [`LogBuffer`].
#[derive(Clone)]
pub struct BufferMakeWriter {
    buffer: Arc<LogBuffer>,
}

impl BufferMakeWriter {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

impl<'a> MakeWriter<'a> for BufferMakeWriter {
    type Writer = BufferLine;

    fn make_writer(&'a self) -> Self::Writer {
        BufferLine {
            buffer: self.buffer.clone(),
            pending: Vec::new(),
        }
    }
}

/// Collects one formatted event and hands it to the buffer on drop, so a
/// multi-line message lands in one atomic write.
pub struct BufferLine {
    buffer: Arc<LogBuffer>,
    pending: Vec<u8>,
}

impl Write for BufferLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BufferLine {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.buffer.write(&String::from_utf8_lossy(&self.pending));
        }
    }
}

/// Install the global subscriber. `RUST_LOG` replaces the default filter.
pub fn init(config: &ScannerConfig, buffer: Arc<LogBuffer>) -> anyhow::Result<()> {
    let log_file = config.log_file();
    rotate(&log_file, config.logging.max_log_bytes, config.logging.log_backups)?;
    let file = open_log_file(&log_file)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(PrefixFormat::console())
        .with_writer(BufferMakeWriter::new(buffer))
        .with_filter(LevelFilter::INFO);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(PrefixFormat::file())
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// Shift `path` to `path.1`, `path.1` to `path.2` and so on once it has
/// grown past `max_bytes`. At most `backups` old files are kept.
pub fn rotate(path: &Path, max_bytes: u64, backups: usize) -> io::Result<()> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(());
    }

    if backups == 0 {
        return fs::remove_file(path);
    }

    let oldest = backup_path(path, backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            fs::rename(&from, backup_path(path, n + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
}
