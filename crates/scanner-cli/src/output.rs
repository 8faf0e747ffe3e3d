use scanner_core::{CancelToken, LogBuffer, Redraw, RenderTracker};
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const RENDER_WORKER: &str = "render";

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Where rendered frames go.
pub trait Sink: Send + 'static {
    fn emit(&mut self, redraw: &Redraw) -> io::Result<()>;
}

/// Plain stdout, used when running a single command.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn emit(&mut self, redraw: &Redraw) -> io::Result<()> {
        let mut out = io::stdout().lock();
        match redraw {
            Redraw::Append(lines) => {
                for line in lines {
                    writeln!(out, "{}", line)?;
                }
            }
            Redraw::Replace(text) if text.is_empty() => {}
            Redraw::Replace(text) => writeln!(out, "{}", text)?,
        }
        out.flush()
    }
}

/// Prints above the active prompt without corrupting the line being edited.
pub struct PrinterSink<P> {
    printer: P,
}

impl<P> PrinterSink<P> {
    pub fn new(printer: P) -> Self {
        Self { printer }
    }
}

impl<P> Sink for PrinterSink<P>
where
    P: rustyline::ExternalPrinter + Send + 'static,
{
    fn emit(&mut self, redraw: &Redraw) -> io::Result<()> {
        let msg = match redraw {
            Redraw::Append(lines) if lines.is_empty() => return Ok(()),
            Redraw::Append(lines) => lines.join("\n"),
            Redraw::Replace(text) => format!("{}{}", CLEAR_SCREEN, text),
        };
        self.printer
            .print(msg)
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Change tracker shared by the render worker and the host, which renders
/// whatever is left once the worker has stopped.
#[derive(Clone)]
pub struct Renderer {
    buffer: Arc<LogBuffer>,
    force_scroll: Arc<AtomicBool>,
    tracker: Arc<Mutex<(RenderTracker, usize)>>,
}

impl Renderer {
    pub fn new(buffer: Arc<LogBuffer>, force_scroll: Arc<AtomicBool>) -> Self {
        Self {
            buffer,
            force_scroll,
            tracker: Arc::new(Mutex::new((RenderTracker::new(), 0))),
        }
    }

    /// Emit the next frame if the buffer changed.
    pub fn render(&self, sink: &mut dyn Sink) -> io::Result<bool> {
        let frame = {
            let mut guard = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            let (tracker, cursor) = &mut *guard;
            let Some(frame) = tracker.poll(&self.buffer, *cursor, &self.force_scroll) else {
                return Ok(false);
            };
            *cursor = frame.cursor;
            frame
        };

        sink.emit(&frame.redraw)?;
        Ok(true)
    }

    /// Render every `period` until cancelled.
    pub async fn run(
        self,
        mut sink: Box<dyn Sink>,
        period: Duration,
        token: CancelToken,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.render(sink.as_mut()) {
                        tracing::debug!("Render failed: {}", e);
                    }
                }
            }
        }

        Ok(())
    }
}
