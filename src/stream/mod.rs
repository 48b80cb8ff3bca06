pub mod chunk;
pub mod decoder;
pub mod message;
pub mod pipeline;

pub use chunk::ChunkBuffer;
pub use decoder::{DecoderStats, DeltaBatch, EventDecoder};
pub use message::{AssembledMessage, FreezeReason, MessagePhase};
pub use pipeline::{CancelHandle, ChunkOutcome, PipelineStats, StreamPipeline};

use std::time::Instant;

use futures_util::{Stream, StreamExt};

use crate::error::EngineError;
use crate::observability::stats::log_stream_complete;

/// One unit of newly arrived stream content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    ReasoningFragment(String),
    ContentFragment(String),
    RequestIdAnnounced(String),
    StreamEnd,
    StreamError(String),
}

/// Drive a pipeline from an async byte stream until the message freezes.
///
/// `on_chunk` runs after every chunk, which is where a caller re-renders
/// (`pipeline.segments()`) or registers an announced request id. A stream
/// item error is treated as a transport failure; the stream running dry
/// without `[DONE]` finishes the message normally.
pub async fn consume_byte_stream<S, E, F>(byte_stream: S, pipeline: &mut StreamPipeline, mut on_chunk: F)
where
    S: Stream<Item = Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(&StreamPipeline, &ChunkOutcome),
{
    let started = Instant::now();
    let mut byte_stream = std::pin::pin!(byte_stream);

    while let Some(item) = byte_stream.next().await {
        match item {
            Ok(bytes) => {
                let outcome = pipeline.push_bytes(&bytes);
                on_chunk(pipeline, &outcome);
            }
            Err(err) => {
                pipeline.fail(&EngineError::Transport(err.to_string()));
                on_chunk(
                    pipeline,
                    &ChunkOutcome {
                        froze: true,
                        ..ChunkOutcome::default()
                    },
                );
            }
        }
        if pipeline.is_frozen() {
            break;
        }
    }

    if !pipeline.is_frozen() {
        pipeline.finish();
        on_chunk(
            pipeline,
            &ChunkOutcome {
                froze: true,
                ..ChunkOutcome::default()
            },
        );
    }

    log_stream_complete(pipeline.message(), &pipeline.stats(), started.elapsed());
}
