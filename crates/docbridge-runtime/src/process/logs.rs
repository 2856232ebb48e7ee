//! Server output buffering for diagnostics views.
//!
//! `OutputLog` keeps the most recent lines in memory and rebroadcasts each
//! new line to live subscribers.

use docbridge_core::{OutputChunk, OutputSinkPort, OutputStream};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Default number of lines kept in the ring buffer.
pub const DEFAULT_MAX_LOG_LINES: usize = 2000;

const BROADCAST_CAPACITY: usize = 256;

/// A single captured line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLogEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    pub stream: OutputStream,
    pub chunk: OutputChunk,
}

impl OutputLogEntry {
    fn now(stream: OutputStream, chunk: OutputChunk) -> Self {
        let timestamp = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            timestamp,
            stream,
            chunk,
        }
    }
}

/// Bounded in-memory log of server output.
pub struct OutputLog {
    lines: RwLock<VecDeque<OutputLogEntry>>,
    capacity: usize,
    broadcast_tx: broadcast::Sender<OutputLogEntry>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOG_LINES)
    }

    /// Keep at most `capacity` lines (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            lines: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            broadcast_tx,
        }
    }

    /// All buffered lines, oldest first.
    pub fn snapshot(&self) -> Vec<OutputLogEntry> {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }

    /// The last `n` text lines, for error reports.
    pub fn tail_text(&self, n: usize) -> Vec<String> {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        let mut tail: Vec<String> = lines
            .iter()
            .rev()
            .filter_map(|entry| match &entry.chunk {
                OutputChunk::Text { line } => Some(line.clone()),
                OutputChunk::Binary { .. } => None,
            })
            .take(n)
            .collect();
        tail.reverse();
        tail
    }

    pub fn len(&self) -> usize {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop buffered lines (e.g. before a fresh launch).
    pub fn clear(&self) {
        self.lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Live feed of new lines.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputLogEntry> {
        self.broadcast_tx.subscribe()
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSinkPort for OutputLog {
    fn append(&self, stream: OutputStream, chunk: OutputChunk) {
        let entry = OutputLogEntry::now(stream, chunk);

        {
            let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
            if lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(entry.clone());
        }

        // No receivers is fine
        let _ = self.broadcast_tx.send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &str) -> OutputChunk {
        OutputChunk::Text {
            line: line.to_string(),
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let log = OutputLog::with_capacity(2);
        log.append(OutputStream::Stdout, text("one"));
        log.append(OutputStream::Stdout, text("two"));
        log.append(OutputStream::Stderr, text("three"));

        let lines = log.snapshot();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].chunk, text("two"));
        assert_eq!(lines[1].stream, OutputStream::Stderr);
    }

    #[test]
    fn tail_text_skips_binary() {
        let log = OutputLog::new();
        log.append(OutputStream::Stdout, text("a"));
        log.append(OutputStream::Stdout, OutputChunk::Binary { len: 3 });
        log.append(OutputStream::Stderr, text("b"));
        log.append(OutputStream::Stderr, text("c"));

        assert_eq!(log.tail_text(2), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(log.tail_text(10).len(), 3);

        log.clear();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_new_lines() {
        let log = OutputLog::new();
        let mut rx = log.subscribe();
        log.append(OutputStream::Stdout, text("ready"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.chunk, text("ready"));
    }
}
