//! Output drain for the server's stdout/stderr (non-UTF8-safe).
//!
//! The backend can emit non-UTF8 bytes (native extensions, progress bars).
//! `BufReader::lines()` would end the reader on the first invalid byte and
//! leave the pipe undrained, eventually blocking the child on a full pipe.
//! Reading raw bytes keeps the drain alive for the lifetime of the pipe.

use docbridge_core::{OutputChunk, OutputSinkPort, OutputStream};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Target for child output in the tracing stream.
pub const BACKEND_LOG_TARGET: &str = "docbridge::backend";

/// Spawn a task that drains `stream` until EOF.
///
/// Each line is decoded (or reduced to a byte count), logged under
/// [`BACKEND_LOG_TARGET`] and forwarded to `sink`.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pid: u32,
    origin: OutputStream,
    sink: Arc<dyn OutputSinkPort>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let chunk = OutputChunk::from_bytes(&buf);
                    debug!(target: BACKEND_LOG_TARGET, pid = %pid, stream = %origin, "{}", chunk);
                    sink.append(origin, chunk);
                }
                Err(e) => {
                    debug!(pid = %pid, stream = %origin, error = %e, "output drain exiting due to read error");
                    break;
                }
            }
        }

        debug!(pid = %pid, stream = %origin, "output drain task exiting");
    })
}
