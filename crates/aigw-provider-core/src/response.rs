use serde::{Deserialize, Serialize};

use aigw_common::ProviderId;

use crate::request::FunctionCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub duration_ms: u64,
    pub timestamp_unix_ms: i64,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub model_id: String,
    pub provider: ProviderId,
    pub usage: Usage,
    pub metadata: ResponseMetadata,
}

/// One increment of a streamed response. Exactly one chunk in a stream has
/// `done == true`, and it is always the last; `usage` is populated on that
/// final chunk only, when the upstream reported it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
    pub model_id: String,
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn delta(provider: ProviderId, model_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            done: false,
            model_id: model_id.into(),
            provider,
            usage: None,
        }
    }

    pub fn done(provider: ProviderId, model_id: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            delta: String::new(),
            done: true,
            model_id: model_id.into(),
            provider,
            usage,
        }
    }
}
