//! Bridges a raw upstream byte stream into the gateway's `ChunkStream`,
//! sharing one idle-timeout-guarded reader loop across every SSE-speaking
//! adapter. Each provider supplies only `parse_line`, the translation from
//! one `data: ...` payload to zero or one `ParsedEvent`.

use std::time::Duration;

use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{ChunkStream, StreamChunk, Usage};
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::sse::SseLineReader;

pub enum ParsedEvent {
    Delta(String),
    /// Terminal frame. `text` is any trailing delta carried on the same
    /// frame as the finish signal (some providers, e.g. Gemini, fold the
    /// last bit of text and the finish reason into one frame); empty when
    /// the provider signals completion on a separate, textless frame.
    Done { text: String, usage: Option<Usage> },
    /// Line was recognized but carries nothing actionable (e.g. a role-only
    /// delta frame); skipped without emitting a chunk.
    Skip,
}

/// Reads `body` (the raw upstream byte stream) through an SSE line reader,
/// calling `parse_line` on each `data: ...` payload, and emits `StreamChunk`s
/// on the returned stream. If no bytes arrive for `idle_timeout`, the stream
/// ends with a `Timeout` error, matching the "idle connection" failure mode
/// adapters must surface rather than hang on forever.
pub fn bridge<S, E, F>(
    mut body: S,
    provider: ProviderId,
    model_id: String,
    idle_timeout: Duration,
    mut parse_line: F,
) -> ChunkStream
where
    S: futures_util::Stream<Item = Result<bytes::Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnMut(&str) -> Option<ParsedEvent> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamChunk, GatewayError>>(16);

    tokio::spawn(async move {
        let mut reader = SseLineReader::new();
        loop {
            let next = tokio::time::timeout(idle_timeout, body.next()).await;
            let item = match next {
                Ok(item) => item,
                Err(_) => {
                    let _ = tx
                        .send(Err(GatewayError::Timeout {
                            provider,
                            elapsed_ms: idle_timeout.as_millis() as u64,
                        }))
                        .await;
                    return;
                }
            };
            let Some(item) = item else {
                if let Some(line) = reader.finish() {
                    emit(&tx, provider, &model_id, &mut parse_line, &line).await;
                }
                return;
            };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = tx
                        .send(Err(GatewayError::Network {
                            provider,
                            message: err.to_string(),
                        }))
                        .await;
                    return;
                }
            };
            for line in reader.push(&chunk) {
                if line == "[DONE]" {
                    let _ = tx
                        .send(Ok(StreamChunk::done(provider, model_id.clone(), None)))
                        .await;
                    return;
                }
                if !emit(&tx, provider, &model_id, &mut parse_line, &line).await {
                    return;
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

async fn emit<F>(
    tx: &tokio::sync::mpsc::Sender<Result<StreamChunk, GatewayError>>,
    provider: ProviderId,
    model_id: &str,
    parse_line: &mut F,
    line: &str,
) -> bool
where
    F: FnMut(&str) -> Option<ParsedEvent>,
{
    match parse_line(line) {
        Some(ParsedEvent::Delta(text)) => tx
            .send(Ok(StreamChunk::delta(provider, model_id.to_string(), text)))
            .await
            .is_ok(),
        Some(ParsedEvent::Done { text, usage }) => {
            let mut chunk = StreamChunk::done(provider, model_id.to_string(), usage);
            chunk.delta = text;
            let _ = tx.send(Ok(chunk)).await;
            false
        }
        Some(ParsedEvent::Skip) => true,
        None => {
            tracing::warn!(
                event = "sse_frame_skipped",
                provider = %provider,
                "skipping malformed SSE frame"
            );
            true
        }
    }
}
