//! UTF-8 decoding across chunk boundaries.

use super::TextStream;
use futures_util::stream::{self, Stream, StreamExt};
use lingxi_core::ApiError;

/// Decodes a byte stream chunk by chunk, holding back an incomplete
/// trailing multi-byte sequence until the bytes that finish it arrive.
/// Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back at end of stream.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Decode a byte stream into text chunks. Whatever the decoder still holds
/// when the bytes run out is flushed as one last chunk.
pub fn decode_chunks<S, B, E, F>(bytes: S, map_err: F) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
    F: Fn(E) -> ApiError + Send + 'static,
{
    let state = (bytes.boxed(), Utf8ChunkDecoder::new(), map_err, false);
    stream::unfold(state, |(mut bytes, mut decoder, map_err, flushed)| async move {
        if flushed {
            return None;
        }
        match bytes.next().await {
            Some(Ok(chunk)) => {
                let text = decoder.decode(chunk.as_ref());
                Some((Ok(text), (bytes, decoder, map_err, false)))
            }
            Some(Err(err)) => Some((Err(map_err(err)), (bytes, decoder, map_err, false))),
            None if decoder.has_pending() => {
                let tail = decoder.finish();
                Some((Ok(tail), (bytes, decoder, map_err, true)))
            }
            None => None,
        }
    })
    .boxed()
}
