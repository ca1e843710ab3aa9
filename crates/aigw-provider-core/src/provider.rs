use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use aigw_common::{GatewayError, ProviderId};

use crate::capability::ModelInfo;
use crate::request::Request;
use crate::response::{Response, StreamChunk};

#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub limit: u32,
    pub reset_unix_ms: i64,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>;

/// The contract every upstream provider adapter implements. Shared validation
/// (capability checks, deadline derivation) lives in free functions the
/// adapters call, not in this trait, so the trait itself stays a thin
/// seam between the orchestrator and provider-specific wire protocols.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Validates configuration and performs a minimal upstream probe,
    /// caching whatever model list the upstream returns (or the compiled-in
    /// fallback list when it does not expose one).
    async fn initialize(&self) -> Result<(), GatewayError>;

    /// Cheap liveness check with a short deadline. Never returns an error to
    /// the caller; a failed probe simply reports `false`.
    async fn health_check(&self) -> bool;

    fn get_models(&self) -> Vec<ModelInfo>;

    async fn request(&self, request: &Request) -> Result<Response, GatewayError>;

    async fn stream_request(&self, request: &Request) -> Result<ChunkStream, GatewayError>;

    async fn get_rate_limit_status(&self) -> RateLimitStatus;
}
