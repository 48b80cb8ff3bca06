use std::io::Write;

use bytes::Bytes;
use futures_util::stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, info_span, warn, Instrument};

use streamdoc::config::{load_config_or_default, AppConfig};
use streamdoc::observability::init_tracing;
use streamdoc::observability::stats::log_markup_errors;
use streamdoc::segment::Segment;
use streamdoc::state::StreamRegistry;
use streamdoc::stream::{consume_byte_stream, StreamPipeline};

const CONFIG_ENV: &str = "STREAMDOC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "streamdoc.yaml";
const USAGE: &str = "usage: streamdoc <capture.sse | ->";

fn main() {
    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{config_path}': {e}");
        eprintln!("See 'streamdoc.example.yaml' for the expected layout.");
        std::process::exit(1);
    });

    let Some(input) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    init_tracing(&config.features.log_level, &config.features.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let code = runtime.block_on(run(config, input));
    std::process::exit(code);
}

async fn run(config: AppConfig, input: String) -> i32 {
    let reader: Box<dyn AsyncRead + Unpin> = if input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        match tokio::fs::File::open(&input).await {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("Failed to open '{input}': {e}");
                return 1;
            }
        }
    };

    let registry = StreamRegistry::new();
    let mut pipeline = StreamPipeline::with_config(&config.stream);
    let message_id = registry.register(pipeline.cancel_handle());
    let replay = config.replay.clone();
    let span = info_span!("replay", message_id = %message_id, input = %input);

    async {
        info!(chunk_size = replay.chunk_size, "replay started");
        let mut stdout = std::io::stdout();
        consume_byte_stream(
            read_chunks(reader, replay.chunk_size),
            &mut pipeline,
            |pipeline, outcome| {
                if let Some(request_id) = &outcome.announced_request_id {
                    registry.announce_request_id(&message_id, request_id);
                }
                if replay.emit_snapshots && outcome.deltas_applied > 0 && !outcome.froze {
                    let snapshot = pipeline.segments();
                    if let Err(e) = write_segments(&mut stdout, &snapshot, false) {
                        warn!(error = %e, "failed to write snapshot");
                    }
                }
            },
        )
        .await;

        finish_replay(&registry, &message_id, &pipeline, &mut stdout, replay.pretty)
    }
    .instrument(span)
    .await
}

/// Drop the stream from `registry`, then write the final segments.
fn finish_replay(
    registry: &StreamRegistry,
    message_id: &str,
    pipeline: &StreamPipeline,
    out: &mut impl Write,
    pretty: bool,
) -> i32 {
    registry.remove(message_id);
    let segments = pipeline.segments();
    log_markup_errors(&segments);
    if let Err(e) = write_segments(out, &segments, pretty) {
        eprintln!("Failed to write segments: {e}");
        return 1;
    }
    i32::from(pipeline.message().error().is_some())
}

/// Read `reader` as a stream of chunks of at most `chunk_size` bytes.
fn read_chunks<R>(
    reader: R,
    chunk_size: usize,
) -> impl futures_util::Stream<Item = std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(reader, move |mut reader| async move {
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), reader))
            }
            Err(e) => Some((Err(e), reader)),
        }
    })
}

fn write_segments(
    out: &mut impl Write,
    segments: &[Segment],
    pretty: bool,
) -> std::io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, segments)?;
    } else {
        serde_json::to_writer(&mut *out, segments)?;
    }
    out.write_all(b"\n")?;
    out.flush()
}
