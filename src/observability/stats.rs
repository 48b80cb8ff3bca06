use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::segment::Segment;
use crate::stream::{AssembledMessage, FreezeReason, PipelineStats};

/// Log a one-line summary for a stream that has frozen.
pub fn log_stream_complete(message: &AssembledMessage, stats: &PipelineStats, elapsed: Duration) {
    let request_id = message.request_id().unwrap_or("-");
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let reason = freeze_reason_label(message.freeze_reason());

    if let Some(error) = message.error() {
        warn!(
            request_id,
            reason,
            error,
            bytes = stats.bytes,
            deltas = stats.deltas,
            elapsed_ms,
            "stream ended with error"
        );
        return;
    }

    info!(
        request_id,
        reason,
        bytes = stats.bytes,
        chunks = stats.chunks,
        lines = stats.lines,
        deltas = stats.deltas,
        dropped_lines = stats.decoder.dropped_lines,
        suppressed_payloads = stats.decoder.suppressed_payloads,
        discarded_tail_bytes = stats.discarded_tail_bytes,
        reasoning_bytes = message.reasoning_bytes(),
        content_bytes = message.content_bytes(),
        elapsed_ms,
        "stream complete"
    );
}

/// Log one pipeline error with its category. Fatal errors log at warn.
pub fn log_engine_error(err: &EngineError) {
    let category = err.category().as_str();
    if err.is_fatal() {
        warn!(category, error = %err, "stream error");
    } else {
        debug!(category, error = %err, "recoverable stream error");
    }
}

/// Log every invocation whose parameters could not be parsed.
///
/// Returns how many were found.
pub fn log_markup_errors(segments: &[Segment]) -> usize {
    let mut count = 0;
    for segment in segments {
        let Segment::ToolCallGroup(group) = segment else {
            continue;
        };
        for invocation in &group.invocations {
            if let Err(err) = invocation.params() {
                count += 1;
                log_engine_error(&EngineError::from(err.clone()));
            }
        }
    }
    count
}

#[must_use]
pub fn freeze_reason_label(reason: Option<FreezeReason>) -> &'static str {
    match reason {
        None => "streaming",
        Some(FreezeReason::Completed) => "completed",
        Some(FreezeReason::Cancelled) => "cancelled",
        Some(FreezeReason::Failed) => "failed",
    }
}
