//! Output sink port for the server's stdout/stderr.
//!
//! The drain tasks in the runtime forward every chunk they read here. The
//! sink decides whether to buffer, stream, or drop it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line read from the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputChunk {
    /// Valid UTF-8, trailing newline removed.
    Text { line: String },
    /// Bytes that did not decode; only the length is kept.
    Binary { len: usize },
}

impl OutputChunk {
    /// Decode raw bytes, falling back to a byte count.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Text {
                line: text.to_string(),
            },
            Err(_) => Self::Binary { len: bytes.len() },
        }
    }
}

impl fmt::Display for OutputChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { line } => f.write_str(line),
            Self::Binary { len } => write!(f, "<{len} bytes of non-UTF-8 output>"),
        }
    }
}

/// Port for receiving server output.
///
/// Implementations must be thread-safe and must not block: the drain tasks
/// call this inline and a slow sink would back-pressure the child's pipes.
pub trait OutputSinkPort: Send + Sync {
    /// Append one chunk from `stream`.
    fn append(&self, stream: OutputStream, chunk: OutputChunk);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutputSink;

impl OutputSinkPort for NoopOutputSink {
    fn append(&self, _stream: OutputStream, _chunk: OutputChunk) {}
}
