//! Ingestion of SSE-style generation streams.
//!
//! The backend streams AI output as newline-delimited `data: <payload>`
//! lines, ends with `data: [DONE]` and may interleave `data: [TOKENS:n]`
//! usage lines. [`StreamIngestor`] reduces those deliveries into one growing
//! text; [`StreamSession`] ties an ingestor to a target so a newer request
//! for the same target silences an older one.

pub mod decoder;
pub mod ingestor;
pub mod session;

pub use decoder::{decode_chunks, Utf8ChunkDecoder};
pub use ingestor::{recompute_from_buffer, DeliveryMode, IngestStatus, StreamIngestor, StreamUpdate};
pub use session::{pump, SessionRegistry, SessionTicket, StreamEnd, StreamSession, StreamTarget};

use futures_util::stream::{BoxStream, StreamExt};
use lingxi_core::ApiResult;

/// Prefix that marks a line as a data event.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that terminates a session.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Payload prefix of usage metadata lines.
pub const METADATA_PREFIX: &str = "[TOKENS:";

/// Incremental text chunks as they come off the wire.
pub type TextStream = BoxStream<'static, ApiResult<String>>;

/// What a single line contributes to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent<'a> {
    Payload(&'a str),
    Metadata(&'a str),
    Done,
    Ignored,
}

/// Classify one line (without its trailing newline).
pub fn classify_line(line: &str) -> LineEvent<'_> {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };
    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        LineEvent::Done
    } else if payload.starts_with(METADATA_PREFIX) {
        LineEvent::Metadata(payload)
    } else if payload.is_empty() {
        LineEvent::Ignored
    } else {
        LineEvent::Payload(payload)
    }
}

/// Turn incremental chunks into cumulative deliveries: each item is the
/// whole response received so far.
pub fn cumulative(stream: TextStream) -> TextStream {
    stream
        .scan(String::new(), |buffer, item| {
            let next = item.map(|chunk| {
                buffer.push_str(&chunk);
                buffer.clone()
            });
            futures_util::future::ready(Some(next))
        })
        .boxed()
}
