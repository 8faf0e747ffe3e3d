//! Change detection for the periodic render loop.

use crate::log_buffer::LogBuffer;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cursor this close to the end of the previous text counts as pinned.
pub const BOTTOM_SLACK: usize = 5;

/// How a shell should bring its view up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redraw {
    /// Lines appended since the last frame, nothing else changed.
    Append(Vec<String>),
    /// Contents were cleared or evicted past the last frame; redraw fully.
    Replace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Full buffer text at the time of the frame.
    pub text: String,
    pub redraw: Redraw,
    /// New cursor byte offset into `text`.
    pub cursor: usize,
}

/// Remembers what was last rendered and decides when and how to redraw.
#[derive(Debug, Default)]
pub struct RenderTracker {
    last_text: String,
    last_epoch: u64,
    last_next_seq: u64,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    /// Compare the buffer with the last frame.
    ///
    /// Returns `None` when nothing changed. Otherwise the cursor jumps to
    /// the new end if `force_scroll` was raised or the reader sat at the
    /// bottom; it stays put (clamped) when the reader had scrolled up.
    /// A forced scroll lowers the flag.
    pub fn poll(&mut self, buffer: &LogBuffer, cursor: usize, force_scroll: &AtomicBool) -> Option<Frame> {
        let snapshot = buffer.snapshot_lines();
        let text = snapshot.text();
        let next_seq = snapshot.next_seq();

        if text == self.last_text
            && snapshot.epoch == self.last_epoch
            && next_seq == self.last_next_seq
        {
            return None;
        }

        let redraw = if snapshot.epoch == self.last_epoch && self.last_next_seq >= snapshot.first_seq {
            let skip = (self.last_next_seq - snapshot.first_seq) as usize;
            Redraw::Append(snapshot.lines.iter().skip(skip).cloned().collect())
        } else {
            Redraw::Replace(text.clone())
        };

        let at_bottom = cursor >= self.last_text.len().saturating_sub(BOTTOM_SLACK);
        let forced = force_scroll.swap(false, Ordering::AcqRel);
        let cursor = if forced || at_bottom {
            text.len()
        } else {
            cursor.min(text.len())
        };

        self.last_text = text.clone();
        self.last_epoch = snapshot.epoch;
        self.last_next_seq = next_seq;

        Some(Frame { text, redraw, cursor })
    }
}
