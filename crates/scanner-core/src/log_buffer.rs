use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default line capacity of the shared output buffer.
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// Bounded, thread-safe ring of output lines.
///
/// Any number of producers may write; a single render loop reads snapshots.
/// A multi-line write is appended under one lock, so readers never observe
/// half of it.
#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<Lines>,
    max_lines: usize,
}

#[derive(Debug, Default)]
struct Lines {
    lines: VecDeque<String>,
    /// Sequence number of `lines[0]`.
    first_seq: u64,
    /// Bumped by `clear()`.
    epoch: u64,
}

/// Consistent copy of the buffer at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub epoch: u64,
    pub first_seq: u64,
    pub lines: Vec<String>,
}

impl Snapshot {
    /// Sequence number the next appended line will get.
    pub fn next_seq(&self) -> u64 {
        self.first_seq + self.lines.len() as u64
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            inner: Mutex::new(Lines::default()),
            max_lines: max_lines.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lines> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Append `text` split into lines with trailing whitespace removed.
    /// Oldest lines are evicted once the buffer is full.
    pub fn write(&self, text: &str) {
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }

        let mut inner = self.lock();
        for line in text.lines() {
            inner.lines.push_back(line.trim_end().to_string());
            if inner.lines.len() > self.max_lines {
                inner.lines.pop_front();
                inner.first_seq += 1;
            }
        }
    }

    /// Current contents joined by newlines.
    pub fn snapshot(&self) -> String {
        let inner = self.lock();
        inner
            .lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Current contents with the positions a reader needs to compute deltas.
    pub fn snapshot_lines(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            epoch: inner.epoch,
            first_seq: inner.first_seq,
            lines: inner.lines.iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.first_seq += inner.lines.len() as u64;
        inner.lines.clear();
        inner.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}
