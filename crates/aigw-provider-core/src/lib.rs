//! Provider-agnostic request/response model and the `Provider` trait.
//!
//! This crate intentionally does not depend on any concrete HTTP client.
//! Provider implementations (in `aigw-providers`) construct and execute real
//! HTTP calls; this crate only defines the shapes they translate to and from.

pub mod capability;
pub mod config;
pub mod provider;
pub mod request;
pub mod response;

pub use capability::{resolve_model, validate_request_against, ModelCapability, ModelInfo, RequiredCapabilities};
pub use config::{ProviderConfig, ProviderSettings};
pub use provider::{ChunkStream, Provider, RateLimitStatus};
pub use request::{ChatMessage, FunctionCall, FunctionSpec, MessageRole, Request};
pub use response::{FinishReason, Response, ResponseMetadata, StreamChunk, Usage};
