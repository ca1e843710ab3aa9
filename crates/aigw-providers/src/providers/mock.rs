use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{
    capability, ChunkStream, FinishReason, ModelInfo, Provider, RateLimitStatus, Request,
    Response, ResponseMetadata, StreamChunk, Usage,
};

/// One programmed outcome for the mock provider's next call.
pub enum MockResponse {
    Text(String),
    StreamText(Vec<String>),
    Error(GatewayError),
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        MockResponse::Text(text.into())
    }

    pub fn stream_text(chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MockResponse::StreamText(chunks.into_iter().map(Into::into).collect())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        MockResponse::Delay(delay, Box::new(inner))
    }
}

/// In-process adapter with no HTTP calls, used by orchestrator/router tests
/// and local development. A first-class provider, not test-only scaffolding:
/// it is addressable as `ProviderId::Mock` like any other.
pub struct MockProvider {
    id: ProviderId,
    queue: Mutex<VecDeque<MockResponse>>,
    default_text: String,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            id: ProviderId::Mock,
            queue: Mutex::new(VecDeque::new()),
            default_text: "mock response".to_string(),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_default_text(text: impl Into<String>) -> Self {
        Self {
            default_text: text.into(),
            ..Self::new()
        }
    }

    /// Reports as a provider other than `Mock`. Lets orchestrator-level
    /// tests exercise multi-provider failover without real upstream
    /// adapters, since each `ProviderId` otherwise maps to exactly one
    /// adapter instance.
    pub fn with_id(id: ProviderId) -> Self {
        Self { id, ..Self::new() }
    }

    pub fn push_response(&self, response: MockResponse) {
        self.queue.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn next_response(&self) -> MockResponse {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::Text(self.default_text.clone()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn get_models(&self) -> Vec<ModelInfo> {
        capability::models_for_provider(self.id).copied().collect()
    }

    async fn request(&self, request: &Request) -> Result<Response, GatewayError> {
        request.validate()?;
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let model_id = request
            .model
            .clone()
            .unwrap_or_else(|| "mock-model".to_string());

        let mut outcome = self.next_response();
        loop {
            match outcome {
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
                MockResponse::Text(content) => {
                    return Ok(Response {
                        content,
                        model_id,
                        provider: self.id,
                        usage: Usage::new(5, 5),
                        metadata: ResponseMetadata {
                            duration_ms: 0,
                            timestamp_unix_ms: 0,
                            finish_reason: FinishReason::Stop,
                            function_call: None,
                        },
                    });
                }
                MockResponse::StreamText(chunks) => {
                    return Ok(Response {
                        content: chunks.join(""),
                        model_id,
                        provider: self.id,
                        usage: Usage::new(5, 5),
                        metadata: ResponseMetadata {
                            duration_ms: 0,
                            timestamp_unix_ms: 0,
                            finish_reason: FinishReason::Stop,
                            function_call: None,
                        },
                    });
                }
                MockResponse::Error(err) => return Err(err),
            }
        }
    }

    async fn stream_request(&self, request: &Request) -> Result<ChunkStream, GatewayError> {
        request.validate()?;
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let model_id = request
            .model
            .clone()
            .unwrap_or_else(|| "mock-model".to_string());

        let mut outcome = self.next_response();
        let delay = loop {
            match outcome {
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                    continue;
                }
                other => break other,
            }
        };

        match delay {
            MockResponse::Error(err) => Err(err),
            MockResponse::Text(text) => Ok(single_chunk_stream(self.id, model_id, vec![text])),
            MockResponse::StreamText(chunks) => Ok(single_chunk_stream(self.id, model_id, chunks)),
            MockResponse::Delay(..) => unreachable!("delays are unwrapped above"),
        }
    }

    async fn get_rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            remaining: 1000,
            limit: 1000,
            reset_unix_ms: 0,
        }
    }
}

fn single_chunk_stream(provider: ProviderId, model_id: String, deltas: Vec<String>) -> ChunkStream {
    let items: Vec<Result<StreamChunk, GatewayError>> = deltas
        .into_iter()
        .map(|d| Ok(StreamChunk::delta(provider, model_id.clone(), d)))
        .chain(std::iter::once(Ok(StreamChunk::done(
            provider,
            model_id,
            Some(Usage::new(5, 5)),
        ))))
        .collect();
    Box::pin(futures_util::stream::iter(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigw_provider_core::ChatMessage;
    use futures_util::StreamExt;

    fn request() -> Request {
        Request {
            messages: vec![ChatMessage::user("hi")],
            model: Some("mock-model".to_string()),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let response = provider.request(&request()).await.unwrap();
        assert_eq!(response.content, "mock response");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn programmed_error_is_returned() {
        let provider = MockProvider::new();
        provider.push_response(MockResponse::Error(GatewayError::Network {
            provider: ProviderId::Mock,
            message: "boom".into(),
        }));
        let err = provider.request(&request()).await.unwrap_err();
        assert_eq!(err.code(), "NETWORK");
    }

    #[tokio::test]
    async fn stream_emits_deltas_then_done() {
        let provider = MockProvider::new();
        provider.push_response(MockResponse::stream_text(["a", "b", "c"]));
        let mut req = request();
        req.stream = true;
        let mut stream = provider.stream_request(&req).await.unwrap();
        let mut deltas = Vec::new();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if chunk.done {
                saw_done = true;
                assert!(chunk.usage.is_some());
            } else {
                deltas.push(chunk.delta);
            }
        }
        assert_eq!(deltas, vec!["a", "b", "c"]);
        assert!(saw_done);
    }
}
