//! Text decoding pipeline between a raw read channel and the reader loop.
//!
//! Bytes are decoded as UTF-8 in streaming fashion: a multi-byte sequence
//! split across two raw reads is held back until it completes, invalid
//! sequences become U+FFFD.  No line reassembly happens here.

use crate::link::error::TransportError;
use crate::link::transport::ReadChannel;

const REPLACEMENT: char = '\u{FFFD}';

/// Streaming, non-fatal UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, keeping an incomplete trailing sequence for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut input: &[u8] = &buf;
        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            input = &rest[len..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream.  A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// A decoded text chunk plus the number of raw bytes behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub raw_len: usize,
}

/// Readable text stream built on top of a raw read channel.
///
/// Owning a `TextChunkReader` means holding the port's read lock;
/// dropping it releases the lock.
pub struct TextChunkReader {
    channel: Box<dyn ReadChannel>,
    decoder: Utf8StreamDecoder,
    ended: bool,
}

impl TextChunkReader {
    pub fn new(channel: Box<dyn ReadChannel>) -> Self {
        Self {
            channel,
            decoder: Utf8StreamDecoder::new(),
            ended: false,
        }
    }

    /// Next decoded chunk, `Ok(None)` at end of stream.
    ///
    /// Raw reads that only carry the first half of a character produce no
    /// chunk; the call keeps waiting.
    pub async fn read(&mut self) -> Result<Option<TextChunk>, TransportError> {
        let mut raw_len = 0;
        loop {
            if self.ended {
                return Ok(None);
            }
            match self.channel.read().await? {
                Some(bytes) => {
                    raw_len += bytes.len();
                    let text = self.decoder.decode(&bytes);
                    if !text.is_empty() {
                        return Ok(Some(TextChunk { text, raw_len }));
                    }
                }
                None => {
                    self.ended = true;
                    let tail = self.decoder.finish();
                    if tail.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(TextChunk { text: tail, raw_len }));
                }
            }
        }
    }
}
