//! Docker log-frame codec and self-resynchronizing decoder.
//!
//! The daemon writes one frame per log line to the container's FIFO:
//!
//! ```text
//!   ┌────────────────┬──────────────────────────────┐
//!   │ u32 length (BE)│ protobuf LogEntry (length B) │
//!   └────────────────┴──────────────────────────────┘
//! ```
//!
//! # Decode resilience
//!
//! A single corrupt frame must not kill an otherwise-healthy long-lived
//! stream. On a malformed prefix or corrupt body the decoder discards its
//! current state and re-enters decoding at the next prefix boundary:
//!
//! ```text
//!   decoding ──corrupt frame──> resynchronizing ──delay──> decoding
//! ```
//!
//! Each resynchronization waits [`RESYNC_DELAY`] so a persistently broken
//! stream cannot spin the task hot; the delay is the only bound, the
//! stream itself is never given up on.
//!
//! Clean end-of-stream (including a read cut short because the writer
//! vanished) ends decoding normally. The decoder is not restartable after
//! that.

use std::io;
use std::time::Duration;

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Largest accepted frame body, matching the daemon-side writer limit.
/// Larger prefixes are treated as corruption so memory stays bounded.
pub const MAX_FRAME_LEN: usize = 1_000_000;

/// Pause after each resynchronization. Bounds the retry rate on a stream
/// that is persistently malformed.
pub const RESYNC_DELAY: Duration = Duration::from_millis(50);

/// One log line as the daemon encodes it (Docker's `LogEntry` message).
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct LogEntry {
    /// Origin stream: `stdout` or `stderr`.
    #[prost(string, tag = "1")]
    pub source: String,
    /// Emission time, nanoseconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    /// Raw line bytes, no trailing newline.
    #[prost(bytes = "vec", tag = "3")]
    pub line: Vec<u8>,
    /// Set when the daemon split an oversized line. Frames are forwarded
    /// as-is, split or not.
    #[prost(bool, tag = "4")]
    pub partial: bool,
}

/// Encodes one entry into its length-prefixed wire form.
#[must_use]
pub fn encode_frame(entry: &LogEntry) -> Vec<u8> {
    let body = entry.encode_to_vec();
    let len = u32::try_from(body.len()).expect("frame body exceeds u32 range");
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Streaming decoder over one container FIFO.
///
/// Yields frames in arrival order until the stream ends. The payload
/// buffer is reused across frames, so a high-volume stream holds at most
/// [`MAX_FRAME_LEN`] bytes between lines.
pub struct FrameDecoder<R> {
    stream: R,
    buf: Vec<u8>,
    resyncs: u64,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            resyncs: 0,
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `None` on clean end-of-stream; transient decode errors are
    /// recovered internally and never surface here.
    pub async fn next_frame(&mut self) -> Option<LogEntry> {
        loop {
            let len = match self.stream.read_u32().await {
                Ok(len) => len as usize,
                Err(e) if is_stream_end(&e) => return None,
                Err(e) => {
                    self.resynchronize(format!("read frame prefix: {e}")).await;
                    continue;
                }
            };

            if len > MAX_FRAME_LEN {
                self.resynchronize(format!("frame length {len} exceeds {MAX_FRAME_LEN}"))
                    .await;
                continue;
            }

            self.buf.clear();
            self.buf.resize(len, 0);
            match self.stream.read_exact(&mut self.buf).await {
                Ok(_) => {}
                Err(e) if is_stream_end(&e) => return None,
                Err(e) => {
                    self.resynchronize(format!("read frame body: {e}")).await;
                    continue;
                }
            }

            match LogEntry::decode(self.buf.as_slice()) {
                Ok(entry) => return Some(entry),
                Err(e) => {
                    self.resynchronize(format!("decode frame body: {e}")).await;
                }
            }
        }
    }

    /// Number of decode→resynchronize transitions taken so far.
    #[must_use]
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    async fn resynchronize(&mut self, reason: String) {
        self.resyncs += 1;
        debug!(resyncs = self.resyncs, reason, "resynchronizing frame decoder");
        tokio::time::sleep(RESYNC_DELAY).await;
    }
}

/// A read cut short can only mean the writer is gone: the FIFO read blocks
/// while a writer exists, so short reads never happen mid-stream.
fn is_stream_end(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
    )
}
