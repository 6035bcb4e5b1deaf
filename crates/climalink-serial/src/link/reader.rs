//! Telemetry reader loop.
//!
//! One task per session.  It keeps pulling decoded chunks from the port
//! and hands every non-blank chunk to the parser until the session token
//! is cancelled, the port runs out of readable streams, or a read fails.

use crate::link::capture::{DataDirection, TrafficCapture};
use crate::link::decoder::{TextChunk, TextChunkReader};
use crate::link::display::{DisplayEvent, DisplaySink, Status};
use crate::link::error::LinkError;
use crate::link::parser;
use crate::link::transport::SerialTransport;
use crate::link::types::LinkCounters;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why the reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The session token was cancelled.
    Cancelled,
    /// The port offered no further readable stream.
    Exhausted,
    /// A read failed and was reported to the display.
    Failed,
}

/// Everything the reader task needs; it shares no state with the controller.
pub struct ReaderContext {
    pub session_id: String,
    pub port: Arc<dyn SerialTransport>,
    pub token: CancellationToken,
    pub sink: Arc<dyn DisplaySink>,
    pub counters: Arc<LinkCounters>,
    pub capture: Option<Arc<TrafficCapture>>,
}

impl ReaderContext {
    fn fail(&self, err: LinkError) -> ReaderExit {
        log::error!("[link:{}] {}", self.session_id, err);
        self.sink
            .emit(DisplayEvent::Status(Status::ReadFailed(err.detail().to_string())));
        ReaderExit::Failed
    }

    fn handle_chunk(&self, chunk: TextChunk) {
        self.counters.record_rx(chunk.raw_len);
        let text = chunk.text.trim();
        if text.is_empty() {
            return;
        }
        log::trace!("[link:{}] rx {:?}", self.session_id, text);
        if let Some(capture) = &self.capture {
            capture.record(DataDirection::Rx, text);
        }
        parser::report(&parser::parse_chunk(text), self.sink.as_ref());
    }
}

/// Run the reader until cancellation, exhaustion or failure.
///
/// The text reader (and with it the port's read lock) is always dropped
/// before this future completes.
pub async fn run_reader(ctx: ReaderContext) -> ReaderExit {
    log::debug!("[link:{}] reader started", ctx.session_id);
    loop {
        if ctx.token.is_cancelled() {
            return ReaderExit::Cancelled;
        }
        let channel = match ctx.port.readable() {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                log::info!(
                    "[link:{}] {} has no further readable stream",
                    ctx.session_id,
                    ctx.port.port_name()
                );
                ctx.sink.emit(DisplayEvent::Status(Status::StreamEnded(
                    ctx.port.port_name().to_string(),
                )));
                return ReaderExit::Exhausted;
            }
            Err(e) => return ctx.fail(LinkError::read(e)),
        };

        let mut reader = TextChunkReader::new(channel);
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => {
                    log::debug!("[link:{}] reader cancelled", ctx.session_id);
                    return ReaderExit::Cancelled;
                }
                next = reader.read() => next,
            };
            match next {
                Ok(Some(chunk)) => ctx.handle_chunk(chunk),
                Ok(None) => {
                    log::debug!("[link:{}] end of stream", ctx.session_id);
                    break;
                }
                Err(_) if ctx.token.is_cancelled() => return ReaderExit::Cancelled,
                Err(e) => return ctx.fail(LinkError::read(e)),
            }
        }
    }
}
