use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::chunk::ChunkBuffer;
use super::decoder::{DecoderStats, DeltaBatch, EventDecoder};
use super::message::{AssembledMessage, FreezeReason};
use super::Delta;
use crate::config::StreamConfig;
use crate::error::EngineError;
use crate::observability::stats::log_engine_error;
use crate::segment::Segment;

/// Out-of-band cancellation flag for one stream.
///
/// Cheap to clone and safe to trigger from any thread; the pipeline checks it
/// before every chunk and before every delta.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// What one pushed chunk did to the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub lines: usize,
    pub deltas_applied: usize,
    /// Request id announced while processing this chunk.
    pub announced_request_id: Option<String>,
    /// The message froze while processing this chunk.
    pub froze: bool,
}

/// Counters over the whole stream, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub bytes: u64,
    pub chunks: u64,
    pub lines: u64,
    pub deltas: u64,
    pub discarded_tail_bytes: u64,
    pub decoder: DecoderStats,
}

/// Chunk buffer, event decoder and assembled message for one request.
///
/// Push-driven: the transport hands it chunks in order, each chunk is run
/// through all three stages synchronously before the call returns.
pub struct StreamPipeline {
    lines: ChunkBuffer,
    decoder: EventDecoder,
    message: AssembledMessage,
    cancel: CancelHandle,
    utf8_remainder: Vec<u8>,
    line_scratch: Vec<String>,
    stats: PipelineStats,
}

impl StreamPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&StreamConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &StreamConfig) -> Self {
        Self {
            lines: ChunkBuffer::with_max_line_bytes(config.max_line_bytes),
            decoder: EventDecoder::with_suppression(config.suppress_leaked_json),
            message: AssembledMessage::new(),
            cancel: CancelHandle::new(),
            utf8_remainder: Vec::new(),
            line_scratch: Vec::with_capacity(8),
            stats: PipelineStats::default(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &AssembledMessage {
        &self.message
    }

    #[must_use]
    pub fn into_message(self) -> AssembledMessage {
        self.message
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            decoder: self.decoder.stats(),
            ..self.stats
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.message.is_frozen()
    }

    /// Current segment list (streaming until the message freezes).
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        self.message.segments()
    }

    /// Push one text chunk through the pipeline.
    pub fn push_chunk(&mut self, chunk: &str) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        if self.observe_cancel() {
            outcome.froze = true;
            return outcome;
        }
        if self.message.is_frozen() {
            return outcome;
        }
        self.stats.bytes += chunk.len() as u64;
        self.stats.chunks += 1;

        let mut lines = std::mem::take(&mut self.line_scratch);
        self.lines.feed_into(chunk, &mut lines);
        outcome.lines = lines.len();
        self.stats.lines += lines.len() as u64;

        let mut batch = DeltaBatch::new();
        'lines: for line in lines.drain(..) {
            batch.clear();
            self.decoder.decode_line_into(&line, &mut batch);
            for delta in batch.drain(..) {
                if self.observe_cancel() {
                    outcome.froze = true;
                    break 'lines;
                }
                if let Delta::RequestIdAnnounced(id) = &delta {
                    outcome.announced_request_id = Some(id.clone());
                }
                if !self.message.apply(delta) {
                    break 'lines;
                }
                outcome.deltas_applied += 1;
                self.stats.deltas += 1;
                if self.message.is_frozen() {
                    outcome.froze = true;
                    break 'lines;
                }
            }
        }
        lines.clear();
        self.line_scratch = lines;
        outcome
    }

    /// Push raw bytes, carrying an incomplete trailing UTF-8 sequence over to
    /// the next call. Invalid sequences become U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> ChunkOutcome {
        if self.utf8_remainder.is_empty() {
            if let Ok(text) = std::str::from_utf8(bytes) {
                return self.push_chunk(text);
            }
        }

        let mut pending = std::mem::take(&mut self.utf8_remainder);
        pending.extend_from_slice(bytes);
        let mut text = String::with_capacity(pending.len());
        let mut rest = pending.as_slice();
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad_len..];
                        }
                        None => {
                            self.utf8_remainder.extend_from_slice(after);
                            rest = &[];
                        }
                    }
                }
            }
        }
        self.push_chunk(&text)
    }

    /// Transport signalled a clean end of stream.
    ///
    /// The trailing partial line (no newline) is discarded, then the message
    /// freezes as completed unless it already froze.
    pub fn finish(&mut self) {
        let discarded = self.lines.finish();
        self.stats.discarded_tail_bytes += discarded as u64;
        self.utf8_remainder.clear();
        self.message.freeze(FreezeReason::Completed);
    }

    /// Transport failed: stop accepting deltas for this message.
    pub fn fail(&mut self, err: &EngineError) {
        log_engine_error(err);
        self.lines.finish();
        self.message.fail(err.to_string());
    }

    /// Cancel right now (equivalent to triggering the handle and pushing).
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.observe_cancel();
    }

    fn observe_cancel(&mut self) -> bool {
        if self.cancel.is_cancelled() && !self.message.is_frozen() {
            self.lines.finish();
            self.message.freeze(FreezeReason::Cancelled);
            return true;
        }
        false
    }
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::new()
    }
}
